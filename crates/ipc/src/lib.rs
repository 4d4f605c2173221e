//! gridtile IPC Protocol
//!
//! Shared types for daemon-CLI communication over Windows named pipes.
//! Each request and each response is one JSON object terminated by a newline.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Named pipe path for IPC communication.
pub const PIPE_NAME: &str = r"\\.\pipe\gridtile";

/// Upper bound for a single request line, newline included.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors produced while decoding a message.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Message exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("Empty message")]
    Empty,

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Direction argument of [`IpcCommand::SwapMove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Turn tiling on or off.
    ToggleTiling,
    /// Recompute and re-place every window on the focused monitor.
    Retile,

    /// Start swap mode on the focused window.
    SwapEnter,
    /// Move the swap subject to the neighboring slot.
    SwapMove { direction: Direction },
    /// Leave swap mode.
    SwapExit,

    /// Float the focused window, or tile it again.
    ToggleFloat,

    /// Make a workspace of the focused monitor active.
    SwitchWorkspace {
        /// One-based workspace number (1-3).
        index: usize,
    },
    /// Move the focused monitor's active workspace to the next monitor.
    MoveWorkspaceToNextMonitor,

    /// Lay out a workspace with a named preset and explicit slot contents.
    SetLayout {
        /// `full`, `split`, `master_stack` or `grid CxR`.
        layout: String,
        /// Window per slot in slot order, `None` leaves the slot free.
        slots: Vec<Option<u64>>,
        /// One-based workspace number, the active one when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workspace: Option<usize>,
        /// Target monitor, the focused one when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        monitor: Option<u64>,
    },

    /// Query monitors, workspaces and slot maps.
    QueryState,
    /// Query the rectangles the border overlay should draw.
    QueryBorders,

    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// A rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One workspace in a [`IpcResponse::State`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// One-based workspace number.
    pub index: usize,
    pub active: bool,
    /// Layout preset label, `None` while empty.
    pub layout: Option<String>,
    /// Window per slot, `None` for free slots.
    pub slots: Vec<Option<u64>>,
}

/// One monitor in a [`IpcResponse::State`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub id: u64,
    pub work_area: Bounds,
    pub workspaces: Vec<WorkspaceState>,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// State query response.
    State {
        tiling_enabled: bool,
        /// `none`, `drag` or `swap`.
        session: String,
        focused_window: Option<u64>,
        focused_monitor: Option<u64>,
        /// Managed windows outside any slot (floating or unplaced).
        floating: Vec<u64>,
        monitors: Vec<MonitorState>,
    },
    /// Border query response.
    Borders {
        active: Option<Bounds>,
        swap: Option<Bounds>,
        preview: Option<Bounds>,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Encode a message as one newline-terminated line.
pub fn encode<T: Serialize>(message: &T) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line read from the pipe.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge {
            max: MAX_IPC_MESSAGE_SIZE,
        });
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(IpcError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
