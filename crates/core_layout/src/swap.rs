//! Swap mode: keyboard-driven adjacency swaps over the grid topology.

use crate::layout::LayoutPreset;
use crate::WindowId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction of a swap-mode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" | "h" => Ok(Self::Left),
            "right" | "l" => Ok(Self::Right),
            "up" | "k" => Ok(Self::Up),
            "down" | "j" => Ok(Self::Down),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// An engaged swap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSession {
    /// Window being moved around.
    pub subject: WindowId,
}

/// Slot adjacent to `index` in `direction`, by row/column position.
///
/// Returns `None` at the grid edge. Moving within the master slot's own
/// span also yields `None`.
pub fn neighbor(preset: LayoutPreset, index: usize, direction: Direction) -> Option<usize> {
    let (col, row) = preset.cell_of(index)?;
    let (col, row) = match direction {
        Direction::Left => (col.checked_sub(1)?, row),
        Direction::Right => (col + 1, row),
        Direction::Up => (col, row.checked_sub(1)?),
        Direction::Down => (col, row + 1),
    };
    preset
        .slot_at_cell(col, row)
        .filter(|&target| target != index)
}
