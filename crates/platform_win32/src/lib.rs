//! gridtile Platform Win32
//!
//! Windows-specific window registry and placement using Win32 APIs.
//!
//! This crate handles:
//! - Window enumeration and filtering (cloaked and tool windows are skipped)
//! - Monitor enumeration (work areas, primary flag)
//! - Converting successive registry snapshots into lifecycle events
//! - Pointer sampling for drag detection (button state, title-bar hit test)
//! - The [`WindowBackend`](gridtile_core_layout::WindowBackend) implementation
//!   issuing SetWindowPos / ShowWindowAsync
//!
//! The snapshot types and the [`tracker`] are portable so they can be tested
//! on any host. Everything that touches Win32 is compiled only on Windows;
//! on other targets the entry points return [`Win32Error::Unsupported`].

pub mod tracker;

#[cfg(windows)]
mod win32;

use gridtile_core_layout::{MonitorArea, MonitorId, Rect, WindowId};
use thiserror::Error;

pub use tracker::{TopologyTracker, WindowTracker};

#[cfg(windows)]
pub use win32::{
    enumerate_monitors, enumerate_windows, foreground_window, pointer_sample, set_dpi_awareness,
    Win32Backend,
};

/// Errors that can occur during Win32 operations.
#[derive(Debug, Error)]
pub enum Win32Error {
    #[error("Failed to enumerate windows: {0}")]
    EnumerationFailed(String),

    #[error("Failed to enumerate monitors: {0}")]
    MonitorQueryFailed(String),

    #[error("Win32 APIs are not available on this platform")]
    Unsupported,
}

/// Information about a top-level window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// The window handle (HWND) as u64.
    pub hwnd: WindowId,
    /// Window title.
    pub title: String,
    /// Window class name.
    pub class_name: String,
    /// Process ID.
    pub process_id: u32,
    /// Executable file name of the owning process, if it could be queried.
    pub executable: Option<String>,
    /// Current window rectangle.
    pub rect: Rect,
    /// Monitor the window is mostly on.
    pub monitor: MonitorId,
    /// Whether the window is visible.
    pub visible: bool,
    pub minimized: bool,
    pub maximized: bool,
}

/// A display attached to the desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    /// The monitor handle (HMONITOR) as u64.
    pub id: MonitorId,
    /// Full monitor bounds.
    pub rect: Rect,
    /// Bounds excluding the taskbar and docked toolbars.
    pub work_area: Rect,
    pub is_primary: bool,
    /// Device name such as `\\.\DISPLAY1`.
    pub device_name: String,
}

impl MonitorInfo {
    /// The part of the monitor the tiling core lays out into.
    pub fn area(&self) -> MonitorArea {
        MonitorArea {
            id: self.id,
            work_area: self.work_area,
        }
    }
}

/// Window event types that the daemon needs to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// A new window appeared (visible and not minimized).
    Created(WindowInfo),
    /// A window was destroyed or hidden by its owner.
    Destroyed(WindowId),
    /// A window received focus.
    Focused(WindowId),
    /// A window was minimized.
    Minimized(WindowId),
    /// A window was maximized.
    Maximized(WindowId),
    /// A window left the minimized or maximized state.
    Restored(WindowId),
    /// The monitor set or a work area changed.
    DisplayChange(Vec<MonitorInfo>),
}

#[cfg(not(windows))]
pub use fallback::*;

#[cfg(not(windows))]
mod fallback {
    use super::{MonitorInfo, Win32Error, WindowInfo};
    use gridtile_core_layout::{PointerSample, WindowId};

    pub fn enumerate_windows() -> Result<Vec<WindowInfo>, Win32Error> {
        Err(Win32Error::Unsupported)
    }

    pub fn enumerate_monitors() -> Result<Vec<MonitorInfo>, Win32Error> {
        Err(Win32Error::Unsupported)
    }

    pub fn foreground_window() -> Option<WindowId> {
        None
    }

    pub fn pointer_sample() -> Result<PointerSample, Win32Error> {
        Err(Win32Error::Unsupported)
    }

    pub fn set_dpi_awareness() {}
}
