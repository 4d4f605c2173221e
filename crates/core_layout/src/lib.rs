//! gridtile Core Layout Engine
//!
//! Platform-agnostic grid tiling state machine.
//!
//! This crate implements the tiling core where:
//! - Every monitor owns three independent workspaces, one of them active
//! - Each workspace holds an ordered slot map laid out by a preset
//!   (full, split, master/stack, grid of up to 5x3)
//! - Window lifecycle events are reconciled into placement commands that
//!   are issued through a [`WindowBackend`]

pub mod backend;
pub mod compact;
pub mod coordinator;
pub mod drag;
pub mod event;
pub mod layout;
pub mod recording;
pub mod swap;
pub mod workspace;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backend::{PlacementCommand, PlacementError, WindowBackend};
pub use coordinator::{
    BorderTargets, ManagedWindow, Membership, Monitor, MonitorArea, NewWindow, SessionKind,
    SlotRef, TilingCoordinator, TilingSettings, WORKSPACES_PER_MONITOR,
};
pub use drag::{DragSession, DropOutcome, DropTarget, PointerSample};
pub use event::{EventQueue, TilingCommand, TilingEvent};
pub use layout::{compute_slots, LayoutPreset, LayoutSettings, MAX_SLOTS};
pub use recording::RecordingBackend;
pub use swap::{Direction, SwapSession};
pub use workspace::Workspace;

/// Unique identifier for a window.
/// On Windows, this will typically be the HWND cast to u64.
pub type WindowId = u64;

/// Unique identifier for a monitor.
/// On Windows, this will typically be the HMONITOR cast to u64.
pub type MonitorId = u64;

/// Errors that can occur during layout operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Slot index {0} is out of bounds (capacity: {1})")]
    SlotOutOfBounds(usize, usize),

    #[error("Slot {0} is already occupied by window {1}")]
    SlotOccupied(usize, WindowId),

    #[error("Window {0} is not managed")]
    WindowNotFound(WindowId),

    #[error("Window {0} is assigned to more than one slot")]
    DuplicateWindow(WindowId),

    #[error("{count} windows do not fit a layout with {capacity} slots")]
    TooManyWindows { count: usize, capacity: usize },

    #[error("A layout needs at least one window")]
    EmptyLayout,

    #[error("Workspace index {0} is out of range")]
    InvalidWorkspace(usize),

    #[error("Monitor {0} does not exist")]
    UnknownMonitor(MonitorId),

    #[error("Unknown layout preset: {0}")]
    UnknownPreset(String),
}

/// A point in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Check if this rectangle intersects with another.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Check if a point lies inside this rectangle (right/bottom edges exclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Get the right edge x-coordinate.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Get the bottom edge y-coordinate.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Center point of the rectangle.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Area in square pixels.
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// Shrink the rectangle by `amount` on every side.
    pub fn inset(&self, amount: i32) -> Rect {
        Rect::new(
            self.x + amount,
            self.y + amount,
            (self.width - amount * 2).max(0),
            (self.height - amount * 2).max(0),
        )
    }

    /// Squared distance between the centers of two rectangles.
    pub fn center_distance_sq(&self, other: &Rect) -> i64 {
        let a = self.center();
        let b = other.center();
        let dx = i64::from(a.x - b.x);
        let dy = i64::from(a.y - b.y);
        dx * dx + dy * dy
    }
}
