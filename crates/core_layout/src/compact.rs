//! Auto-compact: cheap slot reindexing after a window leaves a workspace.

use crate::layout::LayoutPreset;
use crate::workspace::Workspace;
use crate::WindowId;

/// What to do with a workspace after a window was removed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactPlan {
    /// Nothing left; drop the preset.
    Empty,
    /// Full recompute with the preset implied by the remaining count.
    Reflow,
    /// Shift later slots down by one, keep the preset.
    Shift,
}

/// Decide how to compact a workspace left with `remaining` windows.
pub fn plan(preset: Option<LayoutPreset>, remaining: usize, auto_compact: bool) -> CompactPlan {
    if remaining == 0 {
        return CompactPlan::Empty;
    }
    match preset {
        Some(preset)
            if auto_compact
                && remaining >= preset.min_count()
                && remaining <= preset.capacity() =>
        {
            CompactPlan::Shift
        }
        _ => CompactPlan::Reflow,
    }
}

/// Close the hole left at `removed` by shifting later slots down.
///
/// Returns the windows that changed slot, with their new index. Only
/// these can need a placement command.
pub fn shift_after(workspace: &mut Workspace, removed: usize) -> Vec<(WindowId, usize)> {
    workspace.shift_down_from(removed)
}
