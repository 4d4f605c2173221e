//! Drag-drop snap sessions and pointer-based drag detection.

use crate::coordinator::SlotRef;
use crate::{Point, Rect, WindowId};
use serde::{Deserialize, Serialize};

/// One pointer sample from the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSample {
    pub position: Point,
    pub left_down: bool,
    /// Window whose title bar is under the pointer, if any.
    pub title_bar_window: Option<WindowId>,
}

/// Slot the dragged window would land in if released now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DropTarget {
    pub slot: SlotRef,
    pub rect: Rect,
}

/// An in-progress manual drag of a tiled window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    pub window: WindowId,
    /// Slot the window occupied when the drag started.
    pub origin: SlotRef,
    pub pointer: Point,
    pub preview: Option<DropTarget>,
}

impl DragSession {
    pub fn new(window: WindowId, origin: SlotRef, pointer: Point) -> Self {
        Self {
            window,
            origin,
            pointer,
            preview: None,
        }
    }

    /// Whether the preview points at the origin's monitor and workspace.
    pub fn preview_in_origin_context(&self) -> bool {
        self.preview.is_some_and(|t| {
            t.slot.monitor == self.origin.monitor && t.slot.workspace == self.origin.workspace
        })
    }
}

/// Result of releasing a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Window went back to its original slot.
    Reverted,
    /// Exchanged slots with another window in the same workspace.
    Swapped { with: WindowId },
    /// Moved to an empty slot of the same workspace.
    Moved { slot: usize },
    /// Inserted into another workspace, which was reflowed.
    Transferred { to: SlotRef },
}

/// What the detector wants the coordinator to do with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSignal {
    Begin { window: WindowId, position: Point },
    Update(Point),
    End(Point),
}

/// Turns raw pointer samples into drag begin/update/end signals.
///
/// A drag starts when the left button went down over a title bar and the
/// pointer then travelled more than `threshold` pixels on either axis.
#[derive(Debug, Clone)]
pub struct DragDetector {
    threshold: i32,
    button_down: bool,
    pressed: Option<(WindowId, Point)>,
    dragging: bool,
}

impl DragDetector {
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold: threshold.max(0),
            button_down: false,
            pressed: None,
            dragging: false,
        }
    }

    pub fn set_threshold(&mut self, threshold: i32) {
        self.threshold = threshold.max(0);
    }

    /// Forget the current press. Used when a session is cancelled from
    /// elsewhere so a held button does not resume it.
    pub fn reset(&mut self) {
        self.pressed = None;
        self.dragging = false;
    }

    pub fn feed(&mut self, sample: PointerSample) -> Option<DragSignal> {
        if !sample.left_down {
            let was_dragging = self.dragging;
            self.button_down = false;
            self.reset();
            return was_dragging.then_some(DragSignal::End(sample.position));
        }

        if !self.button_down {
            self.button_down = true;
            self.pressed = sample.title_bar_window.map(|w| (w, sample.position));
            return None;
        }

        if self.dragging {
            return Some(DragSignal::Update(sample.position));
        }

        let (window, start) = self.pressed?;
        let dx = (sample.position.x - start.x).abs();
        let dy = (sample.position.y - start.y).abs();
        if dx > self.threshold || dy > self.threshold {
            self.dragging = true;
            return Some(DragSignal::Begin {
                window,
                position: sample.position,
            });
        }
        None
    }
}
