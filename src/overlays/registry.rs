use crate::overlays::descriptor::OverlayKind;
use crate::prelude::HashMap;
use crate::sdk::native::NativeId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of an overlay controller, unique per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(u64);

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

impl OverlayId {
    pub fn next() -> Self {
        Self(NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// What the map knows about an attached overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayEntry {
    pub id: OverlayId,
    pub kind: OverlayKind,
    pub native_id: NativeId,
    pub z_index: i32,
}

/// Attached overlays of one map, indexed by id and ordered by z-index
///
/// Overlays refer back to their map only through this registry, never by
/// holding the map itself.
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    entries: HashMap<OverlayId, OverlayEntry>,
    /// Ordered list of overlay ids for stacking (sorted by z-index)
    stack_order: Vec<OverlayId>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an overlay, replacing any previous entry with the same id
    pub fn register(&mut self, entry: OverlayEntry) {
        let id = entry.id;
        let z_index = entry.z_index;
        self.remove(&id);
        self.entries.insert(id, entry);

        // Insert in sorted order by z-index
        let insert_pos = self
            .stack_order
            .iter()
            .position(|other| {
                self.entries
                    .get(other)
                    .map(|e| e.z_index > z_index)
                    .unwrap_or(false)
            })
            .unwrap_or(self.stack_order.len());

        self.stack_order.insert(insert_pos, id);
    }

    pub fn remove(&mut self, id: &OverlayId) -> Option<OverlayEntry> {
        self.stack_order.retain(|other| other != id);
        self.entries.remove(id)
    }

    pub fn get(&self, id: &OverlayId) -> Option<&OverlayEntry> {
        self.entries.get(id)
    }

    /// Entries bottom-most first
    pub fn entries(&self) -> Vec<&OverlayEntry> {
        self.stack_order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    pub fn count_of(&self, kind: OverlayKind) -> usize {
        self.entries.values().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stack_order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
