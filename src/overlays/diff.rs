use crate::overlays::descriptor::OverlayDescriptor;
use crate::sdk::native::NativeOverlay;

/// Field-level difference between two overlay descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayDiff {
    pub geometry: bool,
    pub style: bool,
    pub visible: bool,
    pub content: bool,
}

impl OverlayDiff {
    pub fn between(previous: &OverlayDescriptor, next: &OverlayDescriptor) -> Self {
        Self {
            geometry: previous.geometry != next.geometry,
            style: previous.style != next.style,
            visible: previous.visible != next.visible,
            content: previous.content != next.content,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.geometry || self.style || self.visible || self.content)
    }

    /// Number of setter calls this diff translates to
    pub fn setter_count(&self) -> usize {
        [self.geometry, self.style, self.visible, self.content]
            .iter()
            .filter(|changed| **changed)
            .count()
    }

    /// Issues only the setter calls needed to move `native` to `next`
    pub fn apply(&self, native: &mut dyn NativeOverlay, next: &OverlayDescriptor) {
        if self.geometry {
            native.set_geometry(&next.geometry);
        }
        if self.style {
            native.set_style(&next.style);
        }
        if self.visible {
            native.set_visible(next.visible);
        }
        if self.content {
            native.set_content(next.content.as_deref());
        }
    }
}
