//! Generic lifecycle of one declared overlay
//!
//! `Unmounted -> Pending -> Attached -> Disposed`. While pending, updates only
//! replace the desired snapshot; once attached, each update is diffed against
//! the last applied snapshot and turned into the minimal set of setter calls.

use crate::core::geo::{LatLng, LatLngBounds};
use crate::events::EventBindings;
use crate::overlays::{
    descriptor::OverlayDescriptor,
    diff::OverlayDiff,
    registry::{OverlayEntry, OverlayId},
};
use crate::provider::{context::MapContext, handle::MapRef};
use crate::sdk::native::{NativeEvent, NativeOverlay};
use crate::{MapError, Result};

/// Payload handed to overlay handler props
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEvent {
    pub name: String,
    pub lat_lng: Option<LatLng>,
}

fn translate(event: &NativeEvent) -> Option<OverlayEvent> {
    Some(OverlayEvent {
        name: event.name.clone(),
        lat_lng: event.lat_lng,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayState {
    Unmounted,
    /// Mounted, waiting for the map
    Pending,
    Attached,
    /// Terminal
    Disposed,
}

impl std::fmt::Display for OverlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayState::Unmounted => write!(f, "unmounted"),
            OverlayState::Pending => write!(f, "pending"),
            OverlayState::Attached => write!(f, "attached"),
            OverlayState::Disposed => write!(f, "disposed"),
        }
    }
}

pub struct OverlayController {
    id: OverlayId,
    state: OverlayState,
    context: Option<MapContext>,
    map: Option<MapRef>,
    /// Latest declared snapshot
    desired: OverlayDescriptor,
    /// Snapshot the native object currently reflects
    applied: Option<OverlayDescriptor>,
    native: Option<Box<dyn NativeOverlay>>,
    bindings: EventBindings<OverlayEvent>,
}

impl OverlayController {
    pub fn new(descriptor: OverlayDescriptor) -> Self {
        Self {
            id: OverlayId::next(),
            state: OverlayState::Unmounted,
            context: None,
            map: None,
            desired: descriptor,
            applied: None,
            native: None,
            bindings: EventBindings::new(translate),
        }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == OverlayState::Attached
    }

    /// Latest declared snapshot, applied or not
    pub fn descriptor(&self) -> &OverlayDescriptor {
        &self.desired
    }

    pub fn map(&self) -> Option<&MapRef> {
        self.map.as_ref()
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.desired.geometry.bounds()
    }

    /// Starts following `context`; attaches right away when the map is ready
    pub fn mount(&mut self, context: MapContext) -> Result<OverlayState> {
        match self.state {
            OverlayState::Unmounted => {}
            OverlayState::Disposed => {
                return Err(MapError::stale(format!("{} was disposed", self.id)));
            }
            _ => return Ok(self.state),
        }
        self.context = Some(context);
        self.state = OverlayState::Pending;
        self.sync()
    }

    /// Attaches if the map became ready since the last call
    pub fn sync(&mut self) -> Result<OverlayState> {
        if self.state == OverlayState::Pending {
            let map = self.context.as_ref().and_then(MapContext::map);
            if let Some(map) = map {
                self.attach(map)?;
            }
        }
        Ok(self.state)
    }

    /// Waits for the map and attaches
    pub async fn attached(&mut self) -> Result<()> {
        match self.state {
            OverlayState::Attached => return Ok(()),
            OverlayState::Disposed => {
                return Err(MapError::stale(format!("{} was disposed", self.id)));
            }
            OverlayState::Unmounted => {
                return Err(MapError::stale(format!("{} is not mounted", self.id)));
            }
            OverlayState::Pending => {}
        }
        let context = match &self.context {
            Some(context) => context.clone(),
            None => return Err(MapError::stale(format!("{} has no map context", self.id))),
        };
        let map = context.ready().await?;
        // Disposal may have happened while waiting
        if self.state != OverlayState::Pending {
            return self.attached_state();
        }
        self.attach(map)
    }

    fn attached_state(&self) -> Result<()> {
        match self.state {
            OverlayState::Attached => Ok(()),
            _ => Err(MapError::stale(format!("{} is {}", self.id, self.state))),
        }
    }

    fn attach(&mut self, map: MapRef) -> Result<()> {
        let mut native = map.create_overlay(self.desired.kind, &self.desired.init())?;
        self.bindings.sync(&mut *native, &self.desired.handlers);
        map.register_overlay(self.entry(native.native_id()))?;
        log::debug!(
            "{} attached as {} #{}",
            self.id,
            self.desired.kind,
            native.native_id()
        );

        self.native = Some(native);
        self.applied = Some(self.desired.clone());
        self.map = Some(map);
        self.state = OverlayState::Attached;
        Ok(())
    }

    fn entry(&self, native_id: u64) -> OverlayEntry {
        OverlayEntry {
            id: self.id,
            kind: self.desired.kind,
            native_id,
            z_index: self.desired.style.z_index.unwrap_or(0),
        }
    }

    /// Declares a new snapshot
    ///
    /// Returns the setter calls issued; an empty diff while pending means the
    /// snapshot was buffered. Ignored after disposal.
    pub fn update(&mut self, descriptor: OverlayDescriptor) -> Result<OverlayDiff> {
        if self.state == OverlayState::Disposed {
            log::debug!("ignoring update of disposed {}", self.id);
            return Ok(OverlayDiff::default());
        }
        if descriptor.kind != self.desired.kind {
            return Err(MapError::InvalidUpdate(format!(
                "cannot turn a {} into a {}",
                self.desired.kind, descriptor.kind
            )));
        }
        if !descriptor.geometry.fits(descriptor.kind) {
            return Err(MapError::InvalidUpdate(format!(
                "geometry does not fit a {}",
                descriptor.kind
            )));
        }

        self.desired = descriptor;
        match self.state {
            OverlayState::Attached => self.apply(),
            _ => Ok(OverlayDiff::default()),
        }
    }

    fn apply(&mut self) -> Result<OverlayDiff> {
        let (Some(map), Some(native), Some(applied)) =
            (&self.map, self.native.as_mut(), &self.applied)
        else {
            return Ok(OverlayDiff::default());
        };
        if !map.is_alive() {
            return Err(MapError::stale(format!("map of {} was torn down", self.id)));
        }

        let diff = OverlayDiff::between(applied, &self.desired);
        diff.apply(&mut **native, &self.desired);
        self.bindings.sync(&mut **native, &self.desired.handlers);

        if applied.style.z_index != self.desired.style.z_index {
            map.register_overlay(OverlayEntry {
                id: self.id,
                kind: self.desired.kind,
                native_id: native.native_id(),
                z_index: self.desired.style.z_index.unwrap_or(0),
            })?;
        }
        if !diff.is_empty() {
            log::trace!("{} applied {} setter(s)", self.id, diff.setter_count());
        }

        self.applied = Some(self.desired.clone());
        Ok(diff)
    }

    pub fn set_visible(&mut self, visible: bool) -> Result<OverlayDiff> {
        let next = self.desired.clone().visible(visible);
        self.update(next)
    }

    /// Underlying native object; fails unless attached
    pub fn native(&self) -> Result<&dyn NativeOverlay> {
        match (&self.state, &self.native) {
            (OverlayState::Attached, Some(native)) => Ok(&**native),
            _ => Err(MapError::stale(format!("{} is {}", self.id, self.state))),
        }
    }

    pub fn native_mut(&mut self) -> Result<&mut dyn NativeOverlay> {
        let state = self.state;
        match (state, self.native.as_mut()) {
            (OverlayState::Attached, Some(native)) => Ok(&mut **native),
            _ => Err(MapError::stale(format!("{} is {}", self.id, state))),
        }
    }

    /// Unbinds every handler, disposes the native object and leaves the
    /// controller inert; a second call does nothing
    ///
    /// Once the owning map was torn down its objects are gone with it, so
    /// only the handlers are unbound.
    pub fn dispose(&mut self) {
        if self.state == OverlayState::Disposed {
            return;
        }
        let map_alive = self.map.as_ref().map_or(false, MapRef::is_alive);
        if let Some(mut native) = self.native.take() {
            let unbound = self.bindings.unbind_all(&mut *native);
            if map_alive {
                native.dispose();
            }
            log::debug!("{} disposed, {} handler(s) unbound", self.id, unbound);
        }
        if let Some(map) = self.map.take() {
            map.deregister_overlay(self.id);
        }
        self.context = None;
        self.applied = None;
        self.state = OverlayState::Disposed;
    }
}

impl Drop for OverlayController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for OverlayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayController")
            .field("id", &self.id)
            .field("kind", &self.desired.kind)
            .field("state", &self.state)
            .finish()
    }
}
