//! Context published by a provider to its descendants
//!
//! Backed by a `tokio::sync::watch` channel: every transition replaces the
//! whole snapshot, readers always see the latest one, and late subscribers
//! never miss the current state.

use crate::provider::handle::MapRef;
use crate::{MapError, Result};
use tokio::sync::watch;

/// Readiness of the SDK and map as seen by descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SdkStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl std::fmt::Display for SdkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdkStatus::Idle => write!(f, "idle"),
            SdkStatus::Loading => write!(f, "loading"),
            SdkStatus::Ready => write!(f, "ready"),
            SdkStatus::Error => write!(f, "error"),
        }
    }
}

/// `{ map, sdkStatus, sdkError }` at one point in time
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub map: Option<MapRef>,
    pub sdk_status: SdkStatus,
    pub sdk_error: Option<MapError>,
    /// Set once the provider unmounted; never cleared
    pub torn_down: bool,
}

impl ContextSnapshot {
    pub(crate) fn loading() -> Self {
        Self {
            sdk_status: SdkStatus::Loading,
            ..Self::default()
        }
    }

    pub(crate) fn ready(map: MapRef) -> Self {
        Self {
            map: Some(map),
            sdk_status: SdkStatus::Ready,
            ..Self::default()
        }
    }

    pub(crate) fn failed(error: MapError) -> Self {
        Self {
            sdk_status: SdkStatus::Error,
            sdk_error: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn torn_down(status: SdkStatus) -> Self {
        Self {
            sdk_status: status,
            torn_down: true,
            ..Self::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.sdk_status == SdkStatus::Ready && self.map.is_some()
    }
}

/// Descendant-side view of a provider
#[derive(Debug, Clone)]
pub struct MapContext {
    rx: watch::Receiver<ContextSnapshot>,
}

impl MapContext {
    pub(crate) fn new(rx: watch::Receiver<ContextSnapshot>) -> Self {
        Self { rx }
    }

    /// A context that is never ready, e.g. for controllers rendered outside
    /// any provider
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(ContextSnapshot::torn_down(SdkStatus::Idle));
        Self { rx }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.rx.borrow().clone()
    }

    pub fn map(&self) -> Option<MapRef> {
        self.rx.borrow().map.clone()
    }

    pub fn status(&self) -> SdkStatus {
        self.rx.borrow().sdk_status
    }

    pub fn error(&self) -> Option<MapError> {
        self.rx.borrow().sdk_error.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.rx.borrow().torn_down
    }

    /// Waits until the map is available
    ///
    /// Fails with the provider's error when the attempt fails, and with
    /// `StaleHandle` when the provider goes away first.
    pub async fn ready(&self) -> Result<MapRef> {
        let mut rx = self.rx.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.torn_down {
                    return Err(MapError::stale("map provider was unmounted"));
                }
                if let Some(map) = &snapshot.map {
                    return Ok(map.clone());
                }
                if let Some(error) = &snapshot.sdk_error {
                    return Err(error.clone());
                }
            }
            if rx.changed().await.is_err() {
                return Err(MapError::stale("map provider was dropped"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_resolves_on_error() {
        let (tx, rx) = watch::channel(ContextSnapshot::default());
        let context = MapContext::new(rx);
        let waiter = tokio::spawn(async move { context.ready().await });

        tx.send_replace(ContextSnapshot::loading());
        tx.send_replace(ContextSnapshot::failed(MapError::Timeout(10)));

        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap_err(), MapError::Timeout(10));
    }

    #[tokio::test]
    async fn test_ready_fails_when_sender_dropped() {
        let (tx, rx) = watch::channel(ContextSnapshot::loading());
        let context = MapContext::new(rx);
        drop(tx);
        let err = context.ready().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StaleHandle);
    }

    #[test]
    fn test_detached_context() {
        let context = MapContext::detached();
        assert!(context.is_torn_down());
        assert!(context.map().is_none());
        assert_eq!(context.status(), SdkStatus::Idle);
        assert_eq!(SdkStatus::Loading.to_string(), "loading");
    }
}
