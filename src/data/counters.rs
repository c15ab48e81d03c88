//! Cumulative data-layer counters
//!
//! Counters are shared between successive mounts of a layer and are never
//! reset, so they reflect the whole history of the layer.

use crate::prelude::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DataLayerCounters {
    data_ready: AtomicU64,
    data_destroy: AtomicU64,
    features_added: AtomicU64,
    features_removed: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of [`DataLayerCounters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub data_ready_count: u64,
    pub data_destroy_count: u64,
    pub features_added_count: u64,
    pub features_removed_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl DataLayerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_ready(&self) {
        self.data_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroy(&self) {
        self.data_destroy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_added(&self, count: usize) {
        self.features_added.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self, count: usize) {
        self.features_removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(message.into());
    }

    pub fn data_ready_count(&self) -> u64 {
        self.data_ready.load(Ordering::Relaxed)
    }

    pub fn data_destroy_count(&self) -> u64 {
        self.data_destroy.load(Ordering::Relaxed)
    }

    pub fn features_added_count(&self) -> u64 {
        self.features_added.load(Ordering::Relaxed)
    }

    pub fn features_removed_count(&self) -> u64 {
        self.features_removed.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Message of the most recent error, kept after later successes
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            data_ready_count: self.data_ready_count(),
            data_destroy_count: self.data_destroy_count(),
            features_added_count: self.features_added_count(),
            features_removed_count: self.features_removed_count(),
            error_count: self.error_count(),
            last_error: self.last_error(),
        }
    }
}
