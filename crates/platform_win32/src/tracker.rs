//! Snapshot diffing for the window registry and monitor topology.
//!
//! The Win32 layer is polled: each poll produces a full list of windows and
//! monitors. The trackers compare it with the previous poll and emit the
//! lifecycle events the daemon forwards to the tiling core.

use crate::{MonitorInfo, WindowEvent, WindowInfo};
use gridtile_core_layout::WindowId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    minimized: bool,
    /// Sticky while minimized; an iconic window never reports zoomed.
    maximized: bool,
}

/// Converts successive window snapshots into [`WindowEvent`]s.
#[derive(Debug, Default)]
pub struct WindowTracker {
    known: HashMap<WindowId, Tracked>,
    foreground: Option<WindowId>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `window` was reported as created and not yet destroyed.
    pub fn is_known(&self, window: WindowId) -> bool {
        self.known.contains_key(&window)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Diff `snapshot` against the previous one.
    ///
    /// A window absent from the snapshot (or invisible) is reported as
    /// destroyed unless `retained` returns true for it, which is how windows
    /// hidden by a workspace switch stay tracked.
    pub fn update<F>(
        &mut self,
        snapshot: &[WindowInfo],
        foreground: Option<WindowId>,
        retained: F,
    ) -> Vec<WindowEvent>
    where
        F: Fn(WindowId) -> bool,
    {
        let mut events = Vec::new();
        let mut present = HashSet::new();

        for info in snapshot.iter().filter(|info| info.visible) {
            present.insert(info.hwnd);
            match self.known.get_mut(&info.hwnd) {
                None => {
                    if info.minimized {
                        continue;
                    }
                    self.known.insert(
                        info.hwnd,
                        Tracked {
                            minimized: false,
                            maximized: info.maximized,
                        },
                    );
                    events.push(WindowEvent::Created(info.clone()));
                    if info.maximized {
                        events.push(WindowEvent::Maximized(info.hwnd));
                    }
                }
                Some(state) => transition(info, state, &mut events),
            }
        }

        let mut gone: Vec<WindowId> = self
            .known
            .keys()
            .copied()
            .filter(|id| !present.contains(id) && !retained(*id))
            .collect();
        gone.sort_unstable();
        for id in gone {
            self.known.remove(&id);
            if self.foreground == Some(id) {
                self.foreground = None;
            }
            events.push(WindowEvent::Destroyed(id));
        }

        if foreground != self.foreground {
            self.foreground = foreground;
            if let Some(id) = foreground.filter(|id| self.known.contains_key(id)) {
                events.push(WindowEvent::Focused(id));
            }
        }

        events
    }
}

fn transition(info: &WindowInfo, state: &mut Tracked, events: &mut Vec<WindowEvent>) {
    let id = info.hwnd;

    if info.minimized {
        if !state.minimized {
            state.minimized = true;
            events.push(WindowEvent::Minimized(id));
        }
        return;
    }

    if state.minimized {
        state.minimized = false;
        events.push(WindowEvent::Restored(id));
    }
    match (state.maximized, info.maximized) {
        (true, false) => {
            state.maximized = false;
            events.push(WindowEvent::Restored(id));
        }
        (false, true) => {
            state.maximized = true;
            events.push(WindowEvent::Maximized(id));
        }
        _ => {}
    }
}

/// Detects monitor topology changes between polls.
#[derive(Debug, Default)]
pub struct TopologyTracker {
    last: Vec<MonitorInfo>,
}

impl TopologyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a display change when the monitor set or any work area
    /// differs from the previous poll. Empty reports are ignored.
    pub fn update(&mut self, mut monitors: Vec<MonitorInfo>) -> Option<WindowEvent> {
        if monitors.is_empty() {
            return None;
        }
        monitors.sort_by_key(|m| (m.rect.x, m.rect.y, m.id));
        if monitors == self.last {
            return None;
        }
        self.last = monitors.clone();
        Some(WindowEvent::DisplayChange(monitors))
    }

    pub fn current(&self) -> &[MonitorInfo] {
        &self.last
    }
}
