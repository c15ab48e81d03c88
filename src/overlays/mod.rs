//! Declared overlays and the controller that keeps their native objects in
//! sync with the latest declaration

pub mod controller;
pub mod descriptor;
pub mod diff;
pub mod registry;

pub use controller::{OverlayController, OverlayEvent, OverlayState};
pub use descriptor::{OverlayDescriptor, OverlayGeometry, OverlayKind};
pub use diff::OverlayDiff;
pub use registry::{OverlayEntry, OverlayId, OverlayRegistry};
