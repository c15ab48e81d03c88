//! Handler props and their bindings onto native event targets
//!
//! A [`HandlerSet`] is the declarative side: event name to handler. An
//! [`EventBindings`] remembers which handler is currently bound to which native
//! listener, and rebinds only the names whose handler identity changed.

use crate::prelude::{Arc, HashMap};
use crate::sdk::native::{EventTarget, ListenerId, NativeEvent, NativeListener};

/// Declarative event handler, compared by identity
pub struct Handler<E>(Arc<dyn Fn(&E) + Send + Sync>);

impl<E> Handler<E> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, event: &E) {
        (self.0)(event)
    }

    /// Two handlers are the same when they share the same allocation
    pub fn same_as(&self, other: &Handler<E>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> std::fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0))
    }
}

/// Handler props keyed by event name
pub struct HandlerSet<E> {
    handlers: HashMap<String, Handler<E>>,
}

impl<E> HandlerSet<E> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::default(),
        }
    }

    pub fn on(mut self, event: impl Into<String>, handler: Handler<E>) -> Self {
        self.handlers.insert(event.into(), handler);
        self
    }

    pub fn insert(&mut self, event: impl Into<String>, handler: Handler<E>) {
        self.handlers.insert(event.into(), handler);
    }

    pub fn remove(&mut self, event: &str) -> Option<Handler<E>> {
        self.handlers.remove(event)
    }

    pub fn get(&self, event: &str) -> Option<&Handler<E>> {
        self.handlers.get(event)
    }

    /// Copy holding only the names `keep` accepts; handler identities are kept
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            handlers: self
                .handlers
                .iter()
                .filter(|(name, _)| keep(name))
                .map(|(name, handler)| (name.clone(), handler.clone()))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> Default for HandlerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for HandlerSet<E> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<E> std::fmt::Debug for HandlerSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.handlers.iter()).finish()
    }
}

/// What a [`EventBindings::sync`] call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingDelta {
    pub bound: usize,
    pub unbound: usize,
}

impl BindingDelta {
    pub fn is_empty(&self) -> bool {
        self.bound == 0 && self.unbound == 0
    }
}

struct Binding<E> {
    handler: Handler<E>,
    listener: ListenerId,
}

/// Translates an engine event into the payload handed to handler props;
/// `None` drops the event.
pub type Translate<E> = fn(&NativeEvent) -> Option<E>;

/// Handlers currently bound on one native object
pub struct EventBindings<E> {
    bound: HashMap<String, Binding<E>>,
    translate: Translate<E>,
}

impl<E: 'static> EventBindings<E> {
    pub fn new(translate: Translate<E>) -> Self {
        Self {
            bound: HashMap::default(),
            translate,
        }
    }

    /// Brings the bound listeners in line with `desired`
    ///
    /// Names whose handler kept its identity are left untouched; changed names
    /// are unbound before the new handler is bound.
    pub fn sync<T>(&mut self, target: &mut T, desired: &HandlerSet<E>) -> BindingDelta
    where
        T: EventTarget + ?Sized,
    {
        let mut delta = BindingDelta::default();

        let stale: Vec<String> = self
            .bound
            .iter()
            .filter(|(name, binding)| {
                desired
                    .get(name)
                    .map_or(true, |handler| !handler.same_as(&binding.handler))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in stale {
            if let Some(binding) = self.bound.remove(&name) {
                target.remove_listener(binding.listener);
                delta.unbound += 1;
            }
        }

        for (name, handler) in desired.handlers.iter() {
            if self.bound.contains_key(name) {
                continue;
            }
            let listener = target.add_listener(name, self.listener_for(handler.clone()));
            self.bound.insert(
                name.clone(),
                Binding {
                    handler: handler.clone(),
                    listener,
                },
            );
            delta.bound += 1;
        }

        if !delta.is_empty() {
            log::debug!(
                "event bindings synced: {} bound, {} unbound",
                delta.bound,
                delta.unbound
            );
        }
        delta
    }

    /// Removes every listener this binding set registered
    pub fn unbind_all<T>(&mut self, target: &mut T) -> usize
    where
        T: EventTarget + ?Sized,
    {
        let count = self.bound.len();
        for (_, binding) in self.bound.drain() {
            target.remove_listener(binding.listener);
        }
        count
    }

    pub fn is_bound(&self, event: &str) -> bool {
        self.bound.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    fn listener_for(&self, handler: Handler<E>) -> NativeListener {
        let translate = self.translate;
        Arc::new(move |native: &NativeEvent| {
            if let Some(payload) = translate(native) {
                handler.call(&payload);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Mutex;

    #[derive(Default)]
    struct Target {
        next: ListenerId,
        listeners: Vec<(ListenerId, String, NativeListener)>,
        removed: Vec<ListenerId>,
    }

    impl EventTarget for Target {
        fn add_listener(&mut self, event: &str, listener: NativeListener) -> ListenerId {
            self.next += 1;
            self.listeners.push((self.next, event.to_string(), listener));
            self.next
        }

        fn remove_listener(&mut self, id: ListenerId) -> bool {
            self.removed.push(id);
            let before = self.listeners.len();
            self.listeners.retain(|(lid, _, _)| *lid != id);
            before != self.listeners.len()
        }

        fn listener_count(&self) -> usize {
            self.listeners.len()
        }
    }

    impl Target {
        fn dispatch(&self, name: &str) {
            for (_, event, listener) in &self.listeners {
                if event == name {
                    listener(&NativeEvent::new(name));
                }
            }
        }
    }

    fn by_name(event: &NativeEvent) -> Option<String> {
        Some(event.name.clone())
    }

    #[test]
    fn test_sync_binds_and_keeps_identical_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let click = Handler::new(move |name: &String| sink.lock().unwrap().push(name.clone()));

        let mut target = Target::default();
        let mut bindings = EventBindings::new(by_name);
        let props = HandlerSet::new().on("click", click.clone());

        assert_eq!(bindings.sync(&mut target, &props), BindingDelta { bound: 1, unbound: 0 });
        // Same identity: nothing to do
        let again = HandlerSet::new().on("click", click);
        assert!(bindings.sync(&mut target, &again).is_empty());
        assert_eq!(target.listener_count(), 1);

        target.dispatch("click");
        assert_eq!(*seen.lock().unwrap(), vec!["click".to_string()]);
    }

    #[test]
    fn test_changed_identity_rebinds() {
        let first_calls = Arc::new(Mutex::new(0));
        let second_calls = Arc::new(Mutex::new(0));
        let (a, b) = (first_calls.clone(), second_calls.clone());

        let mut target = Target::default();
        let mut bindings = EventBindings::new(by_name);
        bindings.sync(
            &mut target,
            &HandlerSet::new().on("click", Handler::new(move |_: &String| *a.lock().unwrap() += 1)),
        );
        let delta = bindings.sync(
            &mut target,
            &HandlerSet::new().on("click", Handler::new(move |_: &String| *b.lock().unwrap() += 1)),
        );
        assert_eq!(delta, BindingDelta { bound: 1, unbound: 1 });
        assert_eq!(target.listener_count(), 1);

        target.dispatch("click");
        assert_eq!(*first_calls.lock().unwrap(), 0);
        assert_eq!(*second_calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_removed_prop_unbinds_and_unbind_all_clears() {
        let mut target = Target::default();
        let mut bindings = EventBindings::new(by_name);
        let noop = Handler::new(|_: &String| {});
        bindings.sync(
            &mut target,
            &HandlerSet::new().on("click", noop.clone()).on("mouseover", noop.clone()),
        );
        assert_eq!(bindings.len(), 2);

        let delta = bindings.sync(&mut target, &HandlerSet::new().on("click", noop));
        assert_eq!(delta.unbound, 1);
        assert!(!bindings.is_bound("mouseover"));

        assert_eq!(bindings.unbind_all(&mut target), 1);
        assert_eq!(target.listener_count(), 0);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_filtered_keeps_handler_identity() {
        let click = Handler::new(|_: &String| {});
        let added = Handler::new(|_: &String| {});
        let props = HandlerSet::new()
            .on("click", click.clone())
            .on("addfeature", added);
        let pointer = props.filtered(|name| name != "addfeature");
        assert_eq!(pointer.len(), 1);
        assert!(pointer.get("click").unwrap().same_as(&click));

        // Filtering again yields the same identities, so nothing is rebound
        let mut target = Target::default();
        let mut bindings = EventBindings::new(by_name);
        bindings.sync(&mut target, &pointer);
        assert!(bindings
            .sync(&mut target, &props.filtered(|name| name != "addfeature"))
            .is_empty());
    }
}
