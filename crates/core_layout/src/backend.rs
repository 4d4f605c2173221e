//! Placement backend abstraction.
//!
//! The coordinator never touches native windows directly. Every placement
//! goes through a [`WindowBackend`], which the platform crate implements on
//! top of Win32 and tests implement with [`crate::RecordingBackend`].

use crate::{Rect, WindowId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single placement command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// The handle no longer refers to a live window.
    #[error("Window {0} is no longer valid")]
    Stale(WindowId),

    /// The OS refused the operation (access denied, fixed-size window, ...).
    #[error("Placement of window {window} rejected: {reason}")]
    Rejected { window: WindowId, reason: String },
}

impl PlacementError {
    /// Window the failed command targeted.
    pub fn window(&self) -> WindowId {
        match self {
            Self::Stale(window) => *window,
            Self::Rejected { window, .. } => *window,
        }
    }
}

/// A placement command as issued to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlacementCommand {
    MoveResize { window: WindowId, rect: Rect },
    Show { window: WindowId },
    Hide { window: WindowId },
    Activate { window: WindowId },
}

impl PlacementCommand {
    /// Window the command targets.
    pub fn window(&self) -> WindowId {
        match *self {
            Self::MoveResize { window, .. }
            | Self::Show { window }
            | Self::Hide { window }
            | Self::Activate { window } => window,
        }
    }
}

/// Primitive window operations the coordinator relies on.
///
/// Every call must fail fast. A dead or hung window yields
/// [`PlacementError::Stale`] rather than blocking the event loop.
pub trait WindowBackend {
    /// Whether the handle still refers to a live window.
    fn is_alive(&self, window: WindowId) -> bool;

    /// Move and resize a window to the given rectangle.
    fn move_resize(&mut self, window: WindowId, rect: Rect) -> Result<(), PlacementError>;

    /// Show a hidden window without activating it. Minimized windows are
    /// restored.
    fn show(&mut self, window: WindowId) -> Result<(), PlacementError>;

    /// Hide a window without minimizing it.
    fn hide(&mut self, window: WindowId) -> Result<(), PlacementError>;

    /// Bring a window to the foreground.
    fn activate(&mut self, window: WindowId) -> Result<(), PlacementError>;

    /// Execute a command value.
    fn execute(&mut self, command: &PlacementCommand) -> Result<(), PlacementError> {
        match *command {
            PlacementCommand::MoveResize { window, rect } => self.move_resize(window, rect),
            PlacementCommand::Show { window } => self.show(window),
            PlacementCommand::Hide { window } => self.hide(window),
            PlacementCommand::Activate { window } => self.activate(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_error_window() {
        assert_eq!(PlacementError::Stale(7).window(), 7);
        let rejected = PlacementError::Rejected {
            window: 9,
            reason: "access denied".to_string(),
        };
        assert_eq!(rejected.window(), 9);
        assert!(rejected.to_string().contains("access denied"));
    }

    #[test]
    fn test_command_serialization() {
        let cmd = PlacementCommand::MoveResize {
            window: 3,
            rect: Rect::new(0, 0, 10, 10),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"move_resize\""));
        let back: PlacementCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
