//! In-memory backend that records placement commands.
//!
//! Used by the test suites as a fake window registry and by the daemon's
//! `--dry-run` mode.

use crate::backend::{PlacementCommand, PlacementError, WindowBackend};
use crate::{Rect, WindowId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Backend that records commands instead of touching real windows.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<PlacementCommand>,
    dead: HashSet<WindowId>,
    rejecting: HashSet<WindowId>,
    positions: HashMap<WindowId, Rect>,
    hidden: HashSet<WindowId>,
    refuse_focus: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command issued so far, oldest first.
    pub fn commands(&self) -> &[PlacementCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take(&mut self) -> Vec<PlacementCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Forget recorded commands without returning them.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Move/resize commands issued to `window`.
    pub fn moves_for(&self, window: WindowId) -> Vec<Rect> {
        self.commands
            .iter()
            .filter_map(|cmd| match *cmd {
                PlacementCommand::MoveResize { window: w, rect } if w == window => Some(rect),
                _ => None,
            })
            .collect()
    }

    /// Number of move/resize commands recorded.
    pub fn move_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, PlacementCommand::MoveResize { .. }))
            .count()
    }

    /// Whether any command at all targeted `window`.
    pub fn touched(&self, window: WindowId) -> bool {
        self.commands.iter().any(|cmd| cmd.window() == window)
    }

    /// Last rectangle applied to `window`.
    pub fn position(&self, window: WindowId) -> Option<Rect> {
        self.positions.get(&window).copied()
    }

    /// Whether `window` is currently hidden.
    pub fn is_hidden(&self, window: WindowId) -> bool {
        self.hidden.contains(&window)
    }

    /// Make every later command to `window` fail as stale.
    pub fn mark_dead(&mut self, window: WindowId) {
        self.dead.insert(window);
    }

    /// Make every later command to `window` fail as rejected.
    pub fn mark_rejecting(&mut self, window: WindowId) {
        self.rejecting.insert(window);
    }

    /// Make every later activation fail as rejected, the way the OS
    /// refuses foreground changes it considers focus stealing.
    pub fn refuse_focus(&mut self) {
        self.refuse_focus = true;
    }

    fn check(&self, window: WindowId) -> Result<(), PlacementError> {
        if self.dead.contains(&window) {
            return Err(PlacementError::Stale(window));
        }
        if self.rejecting.contains(&window) {
            return Err(PlacementError::Rejected {
                window,
                reason: "access denied".to_string(),
            });
        }
        Ok(())
    }

    fn record(&mut self, command: PlacementCommand) {
        debug!("Recorded {:?}", command);
        self.commands.push(command);
    }
}

impl WindowBackend for RecordingBackend {
    fn is_alive(&self, window: WindowId) -> bool {
        !self.dead.contains(&window)
    }

    fn move_resize(&mut self, window: WindowId, rect: Rect) -> Result<(), PlacementError> {
        self.check(window)?;
        self.positions.insert(window, rect);
        self.record(PlacementCommand::MoveResize { window, rect });
        Ok(())
    }

    fn show(&mut self, window: WindowId) -> Result<(), PlacementError> {
        self.check(window)?;
        self.hidden.remove(&window);
        self.record(PlacementCommand::Show { window });
        Ok(())
    }

    fn hide(&mut self, window: WindowId) -> Result<(), PlacementError> {
        self.check(window)?;
        self.hidden.insert(window);
        self.record(PlacementCommand::Hide { window });
        Ok(())
    }

    fn activate(&mut self, window: WindowId) -> Result<(), PlacementError> {
        self.check(window)?;
        if self.refuse_focus {
            return Err(PlacementError::Rejected {
                window,
                reason: "foreground change refused".to_string(),
            });
        }
        self.record(PlacementCommand::Activate { window });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_commands_in_order() {
        let mut backend = RecordingBackend::new();
        backend.move_resize(1, Rect::new(0, 0, 10, 10)).unwrap();
        backend.hide(2).unwrap();
        backend.show(2).unwrap();

        assert_eq!(backend.commands().len(), 3);
        assert_eq!(backend.moves_for(1), vec![Rect::new(0, 0, 10, 10)]);
        assert!(!backend.is_hidden(2));
        assert_eq!(backend.take().len(), 3);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_dead_and_rejecting_windows_fail() {
        let mut backend = RecordingBackend::new();
        backend.mark_dead(1);
        backend.mark_rejecting(2);

        assert!(!backend.is_alive(1));
        assert_eq!(backend.show(1), Err(PlacementError::Stale(1)));
        assert!(matches!(
            backend.move_resize(2, Rect::default()),
            Err(PlacementError::Rejected { window: 2, .. })
        ));
        assert!(backend.commands().is_empty());
    }
}
