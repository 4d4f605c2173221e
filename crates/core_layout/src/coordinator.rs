//! Tiling coordinator.
//!
//! [`TilingCoordinator`] owns every monitor, workspace and managed window.
//! Each event or command runs to completion against that state and issues
//! placement commands through the injected [`WindowBackend`]. Backend
//! failures are queued and converted into state transitions once the
//! current operation has finished: stale handles become removals,
//! rejected placements demote the window to floating.

use crate::backend::{PlacementError, WindowBackend};
use crate::compact::{self, CompactPlan};
use crate::drag::{DragDetector, DragSession, DragSignal, DropOutcome, DropTarget, PointerSample};
use crate::event::{TilingCommand, TilingEvent};
use crate::layout::{compute_slots, LayoutPreset, LayoutSettings, MAX_SLOTS};
use crate::swap::{self, Direction, SwapSession};
use crate::workspace::{ActivationReport, Workspace};
use crate::{LayoutError, MonitorId, Point, Rect, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, error, info, warn};

/// Every monitor carries this many independent workspaces.
pub const WORKSPACES_PER_MONITOR: usize = 3;

/// Address of a slot across the whole desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub monitor: MonitorId,
    /// Zero-based workspace index on the monitor.
    pub workspace: usize,
    pub slot: usize,
}

/// Monitor identity and work area as reported by the topology source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorArea {
    pub id: MonitorId,
    /// Usable area, excluding the taskbar.
    pub work_area: Rect,
}

/// A monitor and its workspaces.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub id: MonitorId,
    pub work_area: Rect,
    workspaces: Vec<Workspace>,
    active: usize,
}

impl Monitor {
    fn new(area: MonitorArea) -> Self {
        Self {
            id: area.id,
            work_area: area.work_area,
            workspaces: (0..WORKSPACES_PER_MONITOR)
                .map(|i| Workspace::new(i == 0))
                .collect(),
            active: 0,
        }
    }

    /// Index of the visible workspace.
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_workspace(&self) -> &Workspace {
        &self.workspaces[self.active]
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }
}

/// A qualifying window reported by the window registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWindow {
    pub id: WindowId,
    /// Geometry at discovery, restored when the window is floated.
    pub rect: Rect,
    /// Monitor the window currently sits on, if known.
    pub monitor: Option<MonitorId>,
    /// Managed but kept out of the grid (window rules).
    pub floating: bool,
    pub maximized: bool,
}

impl NewWindow {
    pub fn new(id: WindowId, rect: Rect) -> Self {
        Self {
            id,
            rect,
            monitor: None,
            floating: false,
            maximized: false,
        }
    }

    pub fn on_monitor(mut self, monitor: MonitorId) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn floating(mut self) -> Self {
        self.floating = true;
        self
    }
}

/// Per-window state kept by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedWindow {
    pub id: WindowId,
    /// Geometry the window had before it was first tiled.
    pub restore_rect: Rect,
    pub floating: bool,
    pub maximized: bool,
    pub minimized: bool,
    /// Home workspace of a window that released its slot on minimize.
    pub parked: Option<(MonitorId, usize)>,
}

/// Where a window currently belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Membership {
    Tiled(SlotRef),
    /// Minimized with its slot released; returns to this workspace.
    Parked { monitor: MonitorId, workspace: usize },
    Floating,
    /// Managed, waiting for tiling to be enabled or a monitor to appear.
    Unplaced,
    Unmanaged,
}

/// Interactive session currently engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Idle,
    Drag,
    Swap,
}

/// Rectangles for the border-rendering collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BorderTargets {
    pub active: Option<Rect>,
    pub swap: Option<Rect>,
    pub preview: Option<Rect>,
}

/// Runtime-tunable behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingSettings {
    pub layout: LayoutSettings,
    /// Shift slots on removal instead of reflowing.
    pub auto_compact: bool,
    /// Minimized windows give up their slot.
    pub compact_on_minimize: bool,
    /// Pointer travel in pixels before a title-bar press becomes a drag.
    pub drag_threshold: i32,
}

impl Default for TilingSettings {
    fn default() -> Self {
        Self {
            layout: LayoutSettings::default(),
            auto_compact: true,
            compact_on_minimize: false,
            drag_threshold: 10,
        }
    }
}

#[derive(Debug, Clone)]
enum Session {
    Idle,
    Drag(DragSession),
    Swap(SwapSession),
}

/// The tiling state machine.
pub struct TilingCoordinator<B: WindowBackend> {
    backend: B,
    settings: TilingSettings,
    monitors: Vec<Monitor>,
    windows: HashMap<WindowId, ManagedWindow>,
    /// Managed windows waiting for a slot, in arrival order.
    unplaced: Vec<WindowId>,
    enabled: bool,
    focused: Option<WindowId>,
    focused_monitor: usize,
    session: Session,
    stamp: u64,
    detector: DragDetector,
    failures: VecDeque<PlacementError>,
}

impl<B: WindowBackend> TilingCoordinator<B> {
    /// Create a coordinator over the given monitors. The first workspace of
    /// every monitor starts active.
    pub fn new(backend: B, settings: TilingSettings, monitors: Vec<MonitorArea>) -> Self {
        info!("Tiling coordinator starting with {} monitor(s)", monitors.len());
        let mut seen = BTreeSet::new();
        let monitors = monitors
            .into_iter()
            .filter(|m| seen.insert(m.id))
            .map(Monitor::new)
            .collect();
        Self {
            backend,
            detector: DragDetector::new(settings.drag_threshold),
            settings,
            monitors,
            windows: HashMap::new(),
            unplaced: Vec::new(),
            enabled: true,
            focused: None,
            focused_monitor: 0,
            session: Session::Idle,
            stamp: 0,
            failures: VecDeque::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &TilingSettings {
        &self.settings
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn monitor(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.id == id)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    /// Monitor that receives new windows and workspace commands.
    pub fn focused_monitor(&self) -> Option<MonitorId> {
        self.focused_monitor_index().map(|m| self.monitors[m].id)
    }

    pub fn managed(&self, window: WindowId) -> Option<&ManagedWindow> {
        self.windows.get(&window)
    }

    pub fn managed_count(&self) -> usize {
        self.windows.len()
    }

    /// Every managed window, in no particular order.
    pub fn managed_windows(&self) -> impl Iterator<Item = &ManagedWindow> + '_ {
        self.windows.values()
    }

    pub fn session_kind(&self) -> SessionKind {
        match self.session {
            Session::Idle => SessionKind::Idle,
            Session::Drag(_) => SessionKind::Drag,
            Session::Swap(_) => SessionKind::Swap,
        }
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        match &self.session {
            Session::Drag(session) => Some(session),
            _ => None,
        }
    }

    pub fn swap_session(&self) -> Option<SwapSession> {
        match self.session {
            Session::Swap(session) => Some(session),
            _ => None,
        }
    }

    /// Current membership of a window.
    pub fn membership(&self, window: WindowId) -> Membership {
        let Some(managed) = self.windows.get(&window) else {
            return Membership::Unmanaged;
        };
        if let Some((m, w, slot)) = self.locate(window) {
            return Membership::Tiled(self.slot_ref(m, w, slot));
        }
        if let Some((monitor, workspace)) = managed.parked {
            return Membership::Parked { monitor, workspace };
        }
        if managed.floating {
            Membership::Floating
        } else {
            Membership::Unplaced
        }
    }

    /// Rectangles the border collaborator should draw.
    pub fn border_targets(&self) -> BorderTargets {
        let visible_rect = |window: WindowId| {
            let (m, w, slot) = self.locate(window)?;
            let ws = &self.monitors[m].workspaces[w];
            if !ws.is_active() {
                return None;
            }
            ws.slot_rect(slot)
        };

        let active = self
            .focused
            .filter(|w| self.windows.get(w).is_some_and(|mw| !mw.maximized && !mw.minimized))
            .and_then(visible_rect);
        let (swap, preview) = match &self.session {
            Session::Idle => (None, None),
            Session::Swap(session) => (visible_rect(session.subject), None),
            Session::Drag(session) => (None, session.preview.map(|t| t.rect)),
        };
        BorderTargets {
            active,
            swap,
            preview,
        }
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Apply one event.
    pub fn handle(&mut self, event: TilingEvent) {
        match event {
            TilingEvent::TopologyChanged(areas) => self.topology_changed(areas),
            TilingEvent::WindowAdded(new) => self.window_added(new),
            TilingEvent::WindowRemoved(window) => self.window_removed(window),
            TilingEvent::WindowMaximized(window) => self.window_maximized(window),
            TilingEvent::WindowMinimized(window) => self.window_minimized(window),
            TilingEvent::WindowRestored(window) => self.window_restored(window),
            TilingEvent::WindowFocused(window) => self.window_focused(window),
            TilingEvent::Command(command) => {
                self.command(command);
            }
            TilingEvent::Pointer(sample) => self.pointer(sample),
        }
    }

    /// Apply one command. Returns false when it was rejected or had no
    /// effect.
    pub fn command(&mut self, command: TilingCommand) -> bool {
        match command {
            TilingCommand::ToggleTiling => {
                self.toggle_tiling();
                true
            }
            TilingCommand::SetTiling(enabled) => self.set_tiling_enabled(enabled),
            TilingCommand::ForceRetile => self.force_retile(),
            TilingCommand::EnterSwap => self.enter_swap(),
            TilingCommand::SwapMove(direction) => self.swap_move(direction),
            TilingCommand::ExitSwap => self.exit_swap(),
            TilingCommand::ToggleFloat => self.toggle_float(),
            TilingCommand::SwitchWorkspace(index) => match self.switch_workspace(index) {
                Ok(switched) => switched,
                Err(e) => {
                    warn!("Workspace switch failed: {}", e);
                    false
                }
            },
            TilingCommand::MoveWorkspaceToNextMonitor => self.move_workspace_to_next_monitor(),
            TilingCommand::BeginDrag { window, pointer } => self.begin_drag(window, pointer),
            TilingCommand::UpdateDrag(pointer) => {
                self.update_drag(pointer);
                self.drag_session().is_some()
            }
            TilingCommand::EndDrag(pointer) => self.end_drag(pointer).is_some(),
            TilingCommand::CancelDrag => self.cancel_drag(),
        }
    }

    // ========================================================================
    // Window lifecycle
    // ========================================================================

    /// A qualifying window appeared.
    pub fn window_added(&mut self, new: NewWindow) {
        self.add_window(new);
        self.settle();
    }

    /// A window is gone.
    pub fn window_removed(&mut self, window: WindowId) {
        self.remove_window(window);
        self.settle();
    }

    /// A window was maximized. Its workspace stops issuing placements to
    /// siblings until it is restored.
    pub fn window_maximized(&mut self, window: WindowId) {
        let Some(managed) = self.windows.get_mut(&window) else {
            return;
        };
        managed.maximized = true;
        if self.is_dragging(window) {
            self.end_sessions();
        }
        debug!("Window {} maximized", window);
    }

    /// A window was minimized.
    pub fn window_minimized(&mut self, window: WindowId) {
        let Some(managed) = self.windows.get_mut(&window) else {
            return;
        };
        managed.minimized = true;
        self.release_sessions(window);
        if self.focused == Some(window) {
            self.focused = None;
        }

        if self.settings.compact_on_minimize {
            if let Some(slot) = self.detach(window) {
                if let Some(managed) = self.windows.get_mut(&window) {
                    managed.parked = Some((slot.monitor, slot.workspace));
                }
                debug!("Window {} minimized, slot released", window);
            }
        }
        self.settle();
    }

    /// A window left the minimized or maximized state.
    pub fn window_restored(&mut self, window: WindowId) {
        let Some(managed) = self.windows.get_mut(&window) else {
            return;
        };

        if managed.minimized {
            managed.minimized = false;
            match managed.parked.take() {
                Some((monitor, workspace)) => {
                    debug!("Window {} restored from minimize, re-adding", window);
                    if !self.enabled {
                        self.unplaced.push(window);
                    } else {
                        let target = self
                            .monitor_index(monitor)
                            .map(|m| (m, workspace))
                            .or_else(|| {
                                self.focused_monitor_index()
                                    .map(|m| (m, self.monitors[m].active))
                            });
                        match target {
                            Some((m, w)) => {
                                self.tile_into(window, m, w, None);
                            }
                            None => self.unplaced.push(window),
                        }
                    }
                }
                None => {
                    if let Some((m, w, slot)) = self.locate(window) {
                        self.place(m, w, slot);
                    }
                }
            }
        } else if managed.maximized {
            managed.maximized = false;
            debug!("Window {} restored from maximize", window);
            if let Some((m, w, slot)) = self.locate(window) {
                self.place(m, w, slot);
                self.flush_pending(m, w);
            }
        }
        self.settle();
    }

    /// Focus moved to `window`.
    pub fn window_focused(&mut self, window: WindowId) {
        if !self.windows.contains_key(&window) {
            self.focused = None;
            return;
        }
        self.focused = Some(window);
        if let Some((m, _, _)) = self.locate(window) {
            self.focused_monitor = m;
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Float or re-tile the focused window.
    pub fn toggle_float(&mut self) -> bool {
        match self.focused {
            Some(window) => self.toggle_float_window(window),
            None => {
                debug!("No focused window to toggle floating");
                false
            }
        }
    }

    /// Float a tiled window or re-tile a floating one.
    pub fn toggle_float_window(&mut self, window: WindowId) -> bool {
        if let Some(kind) = self.busy() {
            debug!("Float toggle rejected while {:?} session is active", kind);
            return false;
        }
        let Some(managed) = self.windows.get(&window) else {
            return false;
        };
        if managed.parked.is_some() || managed.minimized {
            return false;
        }
        let (floating, maximized, restore) =
            (managed.floating, managed.maximized, managed.restore_rect);

        if floating {
            if let Some(managed) = self.windows.get_mut(&window) {
                managed.floating = false;
            }
            info!("Window {} returns to the grid", window);
            self.tile_managed(window);
        } else {
            self.unplaced.retain(|&w| w != window);
            self.detach(window);
            if let Some(managed) = self.windows.get_mut(&window) {
                managed.floating = true;
            }
            info!("Window {} is now floating", window);
            if self.enabled && !maximized {
                if let Err(e) = self.backend.move_resize(window, restore) {
                    self.absorb(e);
                }
            }
        }
        self.settle();
        true
    }

    /// Turn tiling on or off. Returns whether the state changed.
    pub fn set_tiling_enabled(&mut self, enabled: bool) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        if !enabled {
            self.end_sessions();
            info!("Tiling disabled");
            return true;
        }

        info!("Tiling enabled");
        for m in 0..self.monitors.len() {
            let w = self.monitors[m].active;
            self.place_all(m, w);
        }
        for window in std::mem::take(&mut self.unplaced) {
            self.tile_managed(window);
        }
        self.settle();
        true
    }

    /// Flip tiling on/off. Returns the new state.
    pub fn toggle_tiling(&mut self) -> bool {
        let enabled = !self.enabled;
        self.set_tiling_enabled(enabled);
        enabled
    }

    /// Recompute the focused monitor's active workspace from scratch and
    /// place every window in it.
    pub fn force_retile(&mut self) -> bool {
        if let Some(kind) = self.busy() {
            debug!("Retile rejected while {:?} session is active", kind);
            return false;
        }
        let Some(m) = self.focused_monitor_index() else {
            return false;
        };
        let w = self.monitors[m].active;
        info!(
            "Retiling workspace {} on monitor {}",
            w + 1,
            self.monitors[m].id
        );
        self.reflow(m, w, true);
        self.settle();
        true
    }

    /// Make workspace `index` (zero-based) active on the focused monitor.
    pub fn switch_workspace(&mut self, index: usize) -> Result<bool, LayoutError> {
        if index >= WORKSPACES_PER_MONITOR {
            return Err(LayoutError::InvalidWorkspace(index));
        }
        if let Some(kind) = self.busy() {
            debug!("Workspace switch rejected while {:?} session is active", kind);
            return Ok(false);
        }
        let Some(m) = self.focused_monitor_index() else {
            return Ok(false);
        };
        if self.monitors[m].active == index {
            return Ok(false);
        }

        let shown = self.activate_workspace(m, index);
        info!(
            "Monitor {} switched to workspace {}",
            self.monitors[m].id,
            index + 1
        );

        self.focused = shown.first().copied();
        if let Some(window) = self.focused {
            match self.backend.activate(window) {
                Ok(()) => {}
                Err(e @ PlacementError::Stale(_)) => self.absorb(e),
                // Focus refusal leaves tiling state alone
                Err(e) => debug!("Could not focus window {}: {}", window, e),
            }
        }
        self.settle();
        Ok(true)
    }

    /// Move the focused monitor's active workspace to the same-numbered
    /// workspace of the next monitor, merging with what is already there.
    pub fn move_workspace_to_next_monitor(&mut self) -> bool {
        if let Some(kind) = self.busy() {
            debug!("Workspace move rejected while {:?} session is active", kind);
            return false;
        }
        if self.monitors.len() < 2 {
            info!("Only one monitor, workspace stays put");
            return false;
        }
        let Some(src) = self.focused_monitor_index() else {
            return false;
        };
        let dst = (src + 1) % self.monitors.len();
        let w = self.monitors[src].active;

        let moving = self.monitors[src].workspaces[w].windows();
        self.monitors[src].workspaces[w].clear();
        if self.monitors[dst].active != w {
            self.activate_workspace(dst, w);
        }
        self.merge_into(dst, w, &moving);
        self.focused_monitor = dst;

        info!(
            "Moved workspace {} ({} windows) from monitor {} to monitor {}",
            w + 1,
            moving.len(),
            self.monitors[src].id,
            self.monitors[dst].id
        );
        self.settle();
        true
    }

    /// Apply `preset` to workspace `index` (zero-based) of `monitor` with
    /// explicit `(slot, window)` assignments.
    ///
    /// Assigned windows leave whatever they were in before: another slot,
    /// floating, parked or unplaced. Windows of the workspace that are not
    /// assigned float at their pre-tile geometry. A hidden workspace only
    /// gets its slot map rewritten; its windows are placed when shown.
    ///
    /// The preset holds until the workspace's window set changes.
    pub fn set_layout(
        &mut self,
        monitor: MonitorId,
        index: usize,
        preset: LayoutPreset,
        assignments: &[(usize, WindowId)],
    ) -> Result<bool, LayoutError> {
        if index >= WORKSPACES_PER_MONITOR {
            return Err(LayoutError::InvalidWorkspace(index));
        }
        let m = self
            .monitor_index(monitor)
            .ok_or(LayoutError::UnknownMonitor(monitor))?;
        let capacity = preset.capacity();
        if assignments.is_empty() {
            return Err(LayoutError::EmptyLayout);
        }
        if assignments.len() > capacity {
            return Err(LayoutError::TooManyWindows {
                count: assignments.len(),
                capacity,
            });
        }
        let mut by_slot: BTreeMap<usize, WindowId> = BTreeMap::new();
        let mut assigned: BTreeSet<WindowId> = BTreeSet::new();
        for &(slot, window) in assignments {
            if slot >= capacity {
                return Err(LayoutError::SlotOutOfBounds(slot, capacity));
            }
            if !self.windows.contains_key(&window) {
                return Err(LayoutError::WindowNotFound(window));
            }
            if !assigned.insert(window) {
                return Err(LayoutError::DuplicateWindow(window));
            }
            if let Some(&other) = by_slot.get(&slot) {
                return Err(LayoutError::SlotOccupied(slot, other));
            }
            by_slot.insert(slot, window);
        }
        if let Some(kind) = self.busy() {
            debug!("Layout change rejected while {:?} session is active", kind);
            return Ok(false);
        }

        for &window in &assigned {
            if let Some((wm, ww, _)) = self.locate(window) {
                if (wm, ww) != (m, index) {
                    self.detach(window);
                }
            }
            self.unplaced.retain(|&w| w != window);
            if let Some(managed) = self.windows.get_mut(&window) {
                managed.floating = false;
                managed.parked = None;
                managed.minimized = false;
                managed.maximized = false;
            }
        }

        let displaced: Vec<WindowId> = self.monitors[m].workspaces[index]
            .windows()
            .into_iter()
            .filter(|w| !assigned.contains(w))
            .collect();
        let stamp = self.next_stamp();
        let area = self.monitors[m].work_area;
        let layout = self.settings.layout;
        let slots: Vec<(usize, WindowId)> = by_slot.into_iter().collect();
        let ws = &mut self.monitors[m].workspaces[index];
        ws.assign_layout(preset, &slots, area, &layout, stamp);
        let active = ws.is_active();
        info!(
            "Workspace {} on monitor {} set to {} with {} window(s)",
            index + 1,
            monitor,
            preset.label(),
            slots.len()
        );

        for window in displaced {
            self.float_displaced(window, active);
        }
        for &window in &assigned {
            if !active {
                self.conceal_if_inactive(window, m, index);
            } else if let Err(e) = self.backend.show(window) {
                self.absorb(e);
            }
        }
        if active {
            self.place_all(m, index);
        }
        self.settle();
        Ok(true)
    }

    /// Reconcile against a new monitor list.
    ///
    /// Monitors are matched by id. Windows of vanished monitors move to the
    /// same-numbered workspace of the nearest remaining monitor. Sessions
    /// touching a vanished monitor are cancelled.
    pub fn topology_changed(&mut self, areas: Vec<MonitorArea>) {
        if areas.is_empty() {
            warn!("Ignoring empty monitor topology");
            return;
        }

        let focused_id = self.focused_monitor();
        let gone: Vec<MonitorId> = self
            .monitors
            .iter()
            .map(|m| m.id)
            .filter(|id| !areas.iter().any(|a| a.id == *id))
            .collect();
        let revert = self.cancel_sessions_on(&gone);

        let mut old = std::mem::take(&mut self.monitors);
        let mut resized = Vec::new();
        for area in areas {
            if self.monitors.iter().any(|m| m.id == area.id) {
                continue;
            }
            match old.iter().position(|m| m.id == area.id) {
                Some(i) => {
                    let mut monitor = old.remove(i);
                    if monitor.work_area != area.work_area {
                        info!(
                            "Monitor {} work area changed to {:?}",
                            area.id, area.work_area
                        );
                        monitor.work_area = area.work_area;
                        resized.push(self.monitors.len());
                    }
                    self.monitors.push(monitor);
                }
                None => {
                    info!("Monitor {} attached", area.id);
                    self.monitors.push(Monitor::new(area));
                }
            }
        }

        let layout = self.settings.layout;
        for m in resized {
            let area = self.monitors[m].work_area;
            for ws in &mut self.monitors[m].workspaces {
                ws.relayout(area, &layout);
            }
            let w = self.monitors[m].active;
            self.place_all(m, w);
        }

        for vanished in old {
            info!("Monitor {} detached", vanished.id);
            let Some(target) = self.nearest_monitor(vanished.work_area) else {
                continue;
            };
            let target_id = self.monitors[target].id;
            for (w, ws) in vanished.workspaces.iter().enumerate() {
                let moving = ws.windows();
                if !moving.is_empty() {
                    self.merge_into(target, w, &moving);
                }
            }
            for managed in self.windows.values_mut() {
                if let Some((monitor, workspace)) = managed.parked {
                    if monitor == vanished.id {
                        managed.parked = Some((target_id, workspace));
                    }
                }
            }
        }

        self.focused_monitor = focused_id
            .and_then(|id| self.monitor_index(id))
            .unwrap_or(0);

        if let Some(window) = revert {
            if let Some((m, w, slot)) = self.locate(window) {
                self.place(m, w, slot);
            }
        }
        if self.enabled {
            for window in std::mem::take(&mut self.unplaced) {
                self.tile_managed(window);
            }
        }
        self.settle();
    }

    /// Replace runtime settings. Layout changes recompute every slot
    /// rectangle and re-place windows on active workspaces.
    pub fn set_settings(&mut self, settings: TilingSettings) {
        let layout_changed = settings.layout != self.settings.layout;
        self.settings = settings;
        self.detector.set_threshold(settings.drag_threshold);
        if !layout_changed {
            return;
        }

        info!("Layout settings changed, recomputing slot geometry");
        for m in 0..self.monitors.len() {
            let active = self.monitors[m].active;
            let before = self.rects_by_window(m, active);
            let area = self.monitors[m].work_area;
            for ws in &mut self.monitors[m].workspaces {
                ws.relayout(area, &settings.layout);
            }
            self.place_changed(m, active, &before, None);
        }
        self.settle();
    }

    // ========================================================================
    // Drag-drop
    // ========================================================================

    /// Feed a raw pointer sample through drag detection.
    pub fn pointer(&mut self, sample: PointerSample) {
        match self.detector.feed(sample) {
            Some(DragSignal::Begin { window, position }) => {
                if self.begin_drag(window, position) {
                    self.update_drag(position);
                }
            }
            Some(DragSignal::Update(position)) => self.update_drag(position),
            Some(DragSignal::End(position)) => {
                self.end_drag(position);
            }
            None => {}
        }
    }

    /// Start dragging a tiled window. Rejected while another session is
    /// active or when the window is not tiled on a visible workspace.
    pub fn begin_drag(&mut self, window: WindowId, pointer: Point) -> bool {
        if let Some(kind) = self.busy() {
            debug!("Drag of window {} rejected while {:?} session is active", window, kind);
            return false;
        }
        if !self.enabled {
            return false;
        }
        let Some((m, w, slot)) = self.locate(window) else {
            debug!("Window {} is not tiled, ignoring drag", window);
            return false;
        };
        if !self.monitors[m].workspaces[w].is_active()
            || self.windows.get(&window).is_some_and(|mw| mw.maximized)
        {
            return false;
        }

        let origin = self.slot_ref(m, w, slot);
        self.session = Session::Drag(DragSession::new(window, origin, pointer));
        debug!("Drag started for window {} from slot {}", window, slot);
        true
    }

    /// Move the pointer of the current drag and refresh the preview.
    /// A pointer over a gap keeps the previous preview.
    pub fn update_drag(&mut self, pointer: Point) {
        let Session::Drag(session) = &self.session else {
            return;
        };
        let target = self.hit_test(session, pointer);
        if let Session::Drag(session) = &mut self.session {
            session.pointer = pointer;
            if target.is_some() {
                session.preview = target;
            }
        }
    }

    /// Release the drag at `pointer` and commit the drop.
    pub fn end_drag(&mut self, pointer: Point) -> Option<DropOutcome> {
        if !matches!(self.session, Session::Drag(_)) {
            return None;
        }
        self.update_drag(pointer);
        let Session::Drag(session) = std::mem::replace(&mut self.session, Session::Idle) else {
            return None;
        };
        self.detector.reset();
        let outcome = self.drop_window(session);
        self.settle();
        outcome
    }

    /// Abort the drag and put the window back in its slot.
    pub fn cancel_drag(&mut self) -> bool {
        let Session::Drag(session) = &self.session else {
            return false;
        };
        let window = session.window;
        self.session = Session::Idle;
        self.detector.reset();
        if let Some((m, w, slot)) = self.locate(window) {
            self.place(m, w, slot);
        }
        debug!("Drag of window {} cancelled", window);
        self.settle();
        true
    }

    fn hit_test(&self, session: &DragSession, pointer: Point) -> Option<DropTarget> {
        let monitor = self
            .monitors
            .iter()
            .find(|m| m.work_area.contains(pointer))?;
        let w = monitor.active;
        let ws = &monitor.workspaces[w];
        let same_context = monitor.id == session.origin.monitor && w == session.origin.workspace;

        let rects = if same_context {
            ws.rects().to_vec()
        } else {
            let count = ws.len() + 1;
            if count > MAX_SLOTS {
                return None;
            }
            let preset = LayoutPreset::for_count(count)?;
            compute_slots(count, monitor.work_area, preset, &self.settings.layout)
        };

        let slot = rects.iter().position(|r| r.contains(pointer))?;
        Some(DropTarget {
            slot: SlotRef {
                monitor: monitor.id,
                workspace: w,
                slot,
            },
            rect: rects[slot],
        })
    }

    fn drop_window(&mut self, session: DragSession) -> Option<DropOutcome> {
        let window = session.window;
        let (m, w, slot) = self.locate(window)?;

        let Some(target) = session.preview else {
            debug!("Drop of window {} without target, reverting", window);
            self.place(m, w, slot);
            return Some(DropOutcome::Reverted);
        };

        let same_context = self.monitors[m].id == target.slot.monitor && w == target.slot.workspace;
        if same_context {
            return Some(self.drop_in_place(window, m, w, slot, target.slot.slot));
        }

        let viable = self.monitor_index(target.slot.monitor).filter(|&tm| {
            self.monitors[tm]
                .workspace(target.slot.workspace)
                .is_some_and(|ws| ws.is_active() && ws.len() < MAX_SLOTS)
        });
        let Some(tm) = viable else {
            debug!("Drop target for window {} no longer viable, reverting", window);
            self.place(m, w, slot);
            return Some(DropOutcome::Reverted);
        };

        self.detach(window);
        self.tile_into(window, tm, target.slot.workspace, Some(target.slot.slot));
        let to = self
            .locate(window)
            .map(|(m, w, slot)| self.slot_ref(m, w, slot))
            .unwrap_or(target.slot);
        info!(
            "Window {} moved to monitor {} workspace {}",
            window,
            to.monitor,
            to.workspace + 1
        );
        Some(DropOutcome::Transferred { to })
    }

    fn drop_in_place(
        &mut self,
        window: WindowId,
        m: usize,
        w: usize,
        slot: usize,
        target: usize,
    ) -> DropOutcome {
        if target == slot || target >= self.monitors[m].workspaces[w].capacity() {
            self.place(m, w, slot);
            return DropOutcome::Reverted;
        }

        match self.monitors[m].workspaces[w].slot_at(target) {
            Some(other) => {
                if self.monitors[m].workspaces[w].swap_slots(slot, target).is_err() {
                    self.place(m, w, slot);
                    return DropOutcome::Reverted;
                }
                debug!("Window {} swapped with window {}", window, other);
                self.place(m, w, slot);
                self.place(m, w, target);
                DropOutcome::Swapped { with: other }
            }
            None => {
                self.move_to_empty(window, m, w, slot, target);
                DropOutcome::Moved { slot: target }
            }
        }
    }

    // ========================================================================
    // Swap mode
    // ========================================================================

    /// Engage swap mode with the focused tiled window as subject.
    pub fn enter_swap(&mut self) -> bool {
        if let Some(kind) = self.busy() {
            debug!("Swap mode rejected while {:?} session is active", kind);
            return false;
        }
        let Some(window) = self.focused else {
            return false;
        };
        let Some((m, w, _)) = self.locate(window) else {
            debug!("Focused window {} is not tiled, no swap mode", window);
            return false;
        };
        if !self.monitors[m].workspaces[w].is_active() {
            return false;
        }
        self.session = Session::Swap(SwapSession { subject: window });
        info!("Swap mode entered for window {}", window);
        true
    }

    /// Exchange the subject with its neighbour in `direction`. An empty
    /// neighbour slot turns the step into a move.
    pub fn swap_move(&mut self, direction: Direction) -> bool {
        let Session::Swap(session) = &self.session else {
            return false;
        };
        let subject = session.subject;
        let Some((m, w, slot)) = self.locate(subject) else {
            self.session = Session::Idle;
            return false;
        };
        let Some(preset) = self.monitors[m].workspaces[w].preset() else {
            return false;
        };
        let Some(target) = swap::neighbor(preset, slot, direction) else {
            debug!("No slot {:?} of slot {}", direction, slot);
            return false;
        };

        match self.monitors[m].workspaces[w].slot_at(target) {
            Some(_) => {
                if self.monitors[m].workspaces[w].swap_slots(slot, target).is_err() {
                    return false;
                }
                self.place(m, w, slot);
                self.place(m, w, target);
            }
            None => self.move_to_empty(subject, m, w, slot, target),
        }
        self.settle();
        true
    }

    /// Leave swap mode. The last exchange stays committed.
    pub fn exit_swap(&mut self) -> bool {
        if !matches!(self.session, Session::Swap(_)) {
            return false;
        }
        self.session = Session::Idle;
        info!("Swap mode exited");
        true
    }

    // ========================================================================
    // Invariant repair
    // ========================================================================

    /// Check and repair slot-map invariants. Returns the number of repairs.
    ///
    /// A window found in several slots keeps its most recently assigned
    /// entry. Slots holding unmanaged windows are cleared. Managed windows
    /// that lost their slot are re-added.
    pub fn repair_invariants(&mut self) -> usize {
        let mut entries: BTreeMap<WindowId, Vec<(u64, usize, usize, usize)>> = BTreeMap::new();
        for (m, monitor) in self.monitors.iter().enumerate() {
            for (w, ws) in monitor.workspaces.iter().enumerate() {
                for (slot, occupant) in ws.occupants() {
                    entries
                        .entry(occupant.window)
                        .or_default()
                        .push((occupant.stamp, m, w, slot));
                }
            }
        }

        let mut repairs = 0;
        let mut touched = BTreeSet::new();
        for (window, mut places) in entries {
            let keep = if self.windows.contains_key(&window) { 1 } else { 0 };
            if places.len() <= keep {
                continue;
            }
            places.sort_by_key(|&(stamp, m, w, slot)| (std::cmp::Reverse(stamp), m, w, slot));
            for &(_, m, w, slot) in &places[keep..] {
                if keep == 0 {
                    error!(
                        "Slot {} of workspace {} on monitor {} holds unmanaged window {}, clearing",
                        slot,
                        w + 1,
                        self.monitors[m].id,
                        window
                    );
                } else {
                    error!(
                        "Window {} assigned to several slots, evicting slot {} of workspace {} on monitor {}",
                        window,
                        slot,
                        w + 1,
                        self.monitors[m].id
                    );
                }
                self.monitors[m].workspaces[w].clear_slot(slot);
                touched.insert((m, w));
                repairs += 1;
            }
        }

        let mut lost: Vec<WindowId> = self
            .windows
            .values()
            .filter(|mw| !mw.floating && mw.parked.is_none() && !self.unplaced.contains(&mw.id))
            .map(|mw| mw.id)
            .filter(|&id| self.locate(id).is_none())
            .collect();
        lost.sort_unstable();
        for window in lost {
            error!("Window {} lost its slot, re-adding", window);
            self.unplaced.push(window);
            repairs += 1;
        }

        for (m, w) in touched {
            self.reflow(m, w, false);
        }
        if self.enabled {
            for window in std::mem::take(&mut self.unplaced) {
                self.tile_managed(window);
            }
        }
        self.settle();
        repairs
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    fn busy(&self) -> Option<SessionKind> {
        match self.session_kind() {
            SessionKind::Idle => None,
            kind => Some(kind),
        }
    }

    fn is_dragging(&self, window: WindowId) -> bool {
        matches!(&self.session, Session::Drag(s) if s.window == window)
    }

    fn end_sessions(&mut self) {
        self.session = Session::Idle;
        self.detector.reset();
    }

    /// End any session that involves `window`.
    fn release_sessions(&mut self, window: WindowId) {
        let involved = match &self.session {
            Session::Idle => false,
            Session::Drag(s) => s.window == window,
            Session::Swap(s) => s.subject == window,
        };
        if involved {
            debug!("Ending {:?} session for window {}", self.session_kind(), window);
            self.end_sessions();
        }
    }

    /// Cancel sessions touching any of `gone`. Returns a dragged window
    /// that needs to go back to its slot.
    fn cancel_sessions_on(&mut self, gone: &[MonitorId]) -> Option<WindowId> {
        if gone.is_empty() {
            return None;
        }
        let (cancel, revert) = match &self.session {
            Session::Idle => (false, None),
            Session::Drag(s) => {
                let hit = gone.contains(&s.origin.monitor)
                    || s.preview.is_some_and(|t| gone.contains(&t.slot.monitor));
                (hit, Some(s.window))
            }
            Session::Swap(s) => {
                let hit = self
                    .locate(s.subject)
                    .is_some_and(|(m, _, _)| gone.contains(&self.monitors[m].id));
                (hit, None)
            }
        };
        if !cancel {
            return None;
        }
        info!("Cancelling {:?} session on a detached monitor", self.session_kind());
        self.end_sessions();
        revert
    }

    fn monitor_index(&self, id: MonitorId) -> Option<usize> {
        self.monitors.iter().position(|m| m.id == id)
    }

    fn focused_monitor_index(&self) -> Option<usize> {
        (!self.monitors.is_empty()).then(|| self.focused_monitor.min(self.monitors.len() - 1))
    }

    fn nearest_monitor(&self, area: Rect) -> Option<usize> {
        self.monitors
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| m.work_area.center_distance_sq(&area))
            .map(|(i, _)| i)
    }

    /// Monitor for a window that has no slot yet.
    fn target_monitor(&self, hint: Option<MonitorId>, rect: Rect) -> Option<usize> {
        hint.and_then(|id| self.monitor_index(id))
            .or_else(|| {
                self.monitors
                    .iter()
                    .position(|m| m.work_area.contains(rect.center()))
            })
            .or_else(|| self.focused_monitor_index())
    }

    fn locate(&self, window: WindowId) -> Option<(usize, usize, usize)> {
        self.monitors.iter().enumerate().find_map(|(m, monitor)| {
            monitor
                .workspaces
                .iter()
                .enumerate()
                .find_map(|(w, ws)| ws.window_slot(window).map(|slot| (m, w, slot)))
        })
    }

    fn slot_ref(&self, m: usize, w: usize, slot: usize) -> SlotRef {
        SlotRef {
            monitor: self.monitors[m].id,
            workspace: w,
            slot,
        }
    }

    fn has_maximized(&self, ws: &Workspace, except: Option<WindowId>) -> bool {
        ws.windows().into_iter().any(|window| {
            Some(window) != except && self.windows.get(&window).is_some_and(|mw| mw.maximized)
        })
    }

    fn rects_by_window(&self, m: usize, w: usize) -> HashMap<WindowId, Rect> {
        let ws = &self.monitors[m].workspaces[w];
        ws.occupants()
            .filter_map(|(slot, o)| ws.slot_rect(slot).map(|r| (o.window, r)))
            .collect()
    }

    /// Issue the move/resize for one slot, honouring every suppression
    /// rule: tiling disabled, hidden workspace, dragged, maximized or
    /// minimized window, and maximized siblings (deferred).
    fn place(&mut self, m: usize, w: usize, slot: usize) {
        if !self.enabled {
            return;
        }
        let ws = &self.monitors[m].workspaces[w];
        if !ws.is_active() {
            return;
        }
        let (Some(window), Some(rect)) = (ws.slot_at(slot), ws.slot_rect(slot)) else {
            return;
        };
        if self.is_dragging(window) {
            return;
        }
        match self.windows.get(&window) {
            Some(mw) if !mw.maximized && !mw.minimized => {}
            _ => return,
        }
        if self.has_maximized(ws, Some(window)) {
            debug!("Deferring placement of window {} behind a maximized sibling", window);
            self.monitors[m].workspaces[w].defer(window);
            return;
        }
        if let Err(e) = self.backend.move_resize(window, rect) {
            self.absorb(e);
        }
    }

    fn place_all(&mut self, m: usize, w: usize) {
        let slots: Vec<usize> = self.monitors[m].workspaces[w]
            .occupants()
            .map(|(slot, _)| slot)
            .collect();
        for slot in slots {
            self.place(m, w, slot);
        }
    }

    /// Place windows whose slot rectangle differs from `before`, plus
    /// `always`.
    fn place_changed(
        &mut self,
        m: usize,
        w: usize,
        before: &HashMap<WindowId, Rect>,
        always: Option<WindowId>,
    ) {
        let ws = &self.monitors[m].workspaces[w];
        let slots: Vec<usize> = ws
            .occupants()
            .filter(|&(slot, o)| {
                Some(o.window) == always || before.get(&o.window).copied() != ws.slot_rect(slot)
            })
            .map(|(slot, _)| slot)
            .collect();
        for slot in slots {
            self.place(m, w, slot);
        }
    }

    /// Place windows that were deferred behind a maximized sibling, once no
    /// maximized window remains.
    fn flush_pending(&mut self, m: usize, w: usize) {
        let ws = &self.monitors[m].workspaces[w];
        if !ws.has_pending() || self.has_maximized(ws, None) {
            return;
        }
        for window in self.monitors[m].workspaces[w].take_pending() {
            if let Some(slot) = self.monitors[m].workspaces[w].window_slot(window) {
                self.place(m, w, slot);
            }
        }
    }

    fn absorb(&mut self, error: PlacementError) {
        match &error {
            PlacementError::Stale(window) => {
                debug!("Window {} is stale, treating as removed", window)
            }
            PlacementError::Rejected { window, reason } => {
                warn!("Placement of window {} rejected ({}), floating it", window, reason)
            }
        }
        self.failures.push_back(error);
    }

    fn absorb_report(&mut self, report: ActivationReport) {
        for window in report.stale {
            self.absorb(PlacementError::Stale(window));
        }
        for (window, reason) in report.rejected {
            self.absorb(PlacementError::Rejected { window, reason });
        }
    }

    /// Convert queued backend failures into removals and demotions.
    fn settle(&mut self) {
        while let Some(failure) = self.failures.pop_front() {
            match failure {
                PlacementError::Stale(window) => self.remove_window(window),
                PlacementError::Rejected { window, .. } => self.demote(window),
            }
        }
    }

    fn add_window(&mut self, new: NewWindow) {
        if self.windows.contains_key(&new.id) {
            debug!("Window {} is already managed", new.id);
            return;
        }
        self.windows.insert(
            new.id,
            ManagedWindow {
                id: new.id,
                restore_rect: new.rect,
                floating: new.floating,
                maximized: new.maximized,
                minimized: false,
                parked: None,
            },
        );
        if new.floating {
            debug!("Window {} managed as floating", new.id);
            return;
        }
        if !self.enabled {
            self.unplaced.push(new.id);
            return;
        }
        match self.target_monitor(new.monitor, new.rect) {
            Some(m) => {
                let w = self.monitors[m].active;
                self.tile_into(new.id, m, w, None);
            }
            None => self.unplaced.push(new.id),
        }
    }

    fn remove_window(&mut self, window: WindowId) {
        if self.windows.remove(&window).is_none() {
            return;
        }
        self.unplaced.retain(|&w| w != window);
        self.release_sessions(window);
        if self.focused == Some(window) {
            self.focused = None;
        }
        self.detach(window);
        debug!("Window {} removed", window);
    }

    /// Float a window whose placement the OS refused.
    fn demote(&mut self, window: WindowId) {
        let Some(managed) = self.windows.get_mut(&window) else {
            return;
        };
        managed.floating = true;
        managed.parked = None;
        self.unplaced.retain(|&w| w != window);
        self.release_sessions(window);
        self.detach(window);
    }

    /// Tile a managed window that currently has no slot.
    fn tile_managed(&mut self, window: WindowId) {
        let Some(managed) = self.windows.get(&window) else {
            return;
        };
        if managed.floating || managed.minimized || self.locate(window).is_some() {
            return;
        }
        let target = self.target_monitor(None, managed.restore_rect);
        match target {
            Some(m) => {
                let w = self.monitors[m].active;
                self.tile_into(window, m, w, None);
            }
            None => self.unplaced.push(window),
        }
    }

    /// Insert a window into workspace `w` of monitor `m`.
    ///
    /// Without a position the window is appended; when the count stays
    /// within the current preset only the new window is placed. Otherwise
    /// the workspace is reflowed and every window whose rectangle changed
    /// is placed. A full workspace floats the window instead.
    fn tile_into(&mut self, window: WindowId, m: usize, w: usize, position: Option<usize>) -> bool {
        let count = self.monitors[m].workspaces[w].len();
        if count >= MAX_SLOTS {
            info!(
                "Workspace {} on monitor {} is full, window {} floats",
                w + 1,
                self.monitors[m].id,
                window
            );
            if let Some(managed) = self.windows.get_mut(&window) {
                managed.floating = true;
            }
            return false;
        }

        let stamp = self.next_stamp();
        let preset = LayoutPreset::for_count(count + 1);
        let ws = &self.monitors[m].workspaces[w];
        let append = if position.is_none() && preset == ws.preset() {
            ws.append_slot()
        } else {
            None
        };

        if let Some(slot) = append {
            if self.monitors[m].workspaces[w].assign(window, slot, stamp).is_ok() {
                debug!("Window {} appended to slot {}", window, slot);
                self.place(m, w, slot);
                self.conceal_if_inactive(window, m, w);
                return true;
            }
        }

        let before = self.rects_by_window(m, w);
        let area = self.monitors[m].work_area;
        let layout = self.settings.layout;
        let ws = &mut self.monitors[m].workspaces[w];
        let mut order = ws.windows();
        let at = position.unwrap_or(order.len()).min(order.len());
        order.insert(at, window);
        ws.apply_layout(preset, &order, area, &layout, stamp);
        debug!("Window {} inserted at slot {}, workspace reflowed", window, at);

        self.place_changed(m, w, &before, Some(window));
        self.conceal_if_inactive(window, m, w);
        true
    }

    /// Remove a tiled window from its slot and compact what is left.
    fn detach(&mut self, window: WindowId) -> Option<SlotRef> {
        let (m, w, slot) = self.locate(window)?;
        let slot_ref = self.slot_ref(m, w, slot);
        self.monitors[m].workspaces[w].unassign(window);
        self.compact(m, w, slot);
        self.flush_pending(m, w);
        Some(slot_ref)
    }

    fn compact(&mut self, m: usize, w: usize, removed: usize) {
        let ws = &self.monitors[m].workspaces[w];
        match compact::plan(ws.preset(), ws.len(), self.settings.auto_compact) {
            CompactPlan::Empty => self.monitors[m].workspaces[w].clear(),
            CompactPlan::Reflow => self.reflow(m, w, false),
            CompactPlan::Shift => {
                let before = self.rects_by_window(m, w);
                let moved = compact::shift_after(&mut self.monitors[m].workspaces[w], removed);
                debug!("Compacted workspace {}: {} window(s) shifted", w + 1, moved.len());
                self.place_changed(m, w, &before, None);
            }
        }
    }

    /// Recompute a workspace with the default preset for its count.
    /// `force` places every window, otherwise only those that moved.
    fn reflow(&mut self, m: usize, w: usize, force: bool) {
        let stamp = self.next_stamp();
        let before = self.rects_by_window(m, w);
        let area = self.monitors[m].work_area;
        let layout = self.settings.layout;
        let ws = &mut self.monitors[m].workspaces[w];
        let order = ws.windows();
        let overflow = ws.apply_layout(
            LayoutPreset::for_count(order.len()),
            &order,
            area,
            &layout,
            stamp,
        );
        self.float_overflow(overflow);
        if force {
            self.place_all(m, w);
        } else {
            self.place_changed(m, w, &before, None);
        }
    }

    /// Append `moving` to workspace `w` of monitor `m` and reflow it.
    fn merge_into(&mut self, m: usize, w: usize, moving: &[WindowId]) {
        let stamp = self.next_stamp();
        let before = self.rects_by_window(m, w);
        let area = self.monitors[m].work_area;
        let layout = self.settings.layout;
        let ws = &mut self.monitors[m].workspaces[w];
        let mut order = ws.windows();
        let incoming: Vec<WindowId> = moving
            .iter()
            .copied()
            .filter(|id| !order.contains(id))
            .collect();
        order.extend(incoming);
        let overflow = ws.apply_layout(
            LayoutPreset::for_count(order.len()),
            &order,
            area,
            &layout,
            stamp,
        );
        self.float_overflow(overflow);

        let active = self.monitors[m].workspaces[w].is_active();
        for &window in moving {
            if !self.monitors[m].workspaces[w].contains(window) {
                continue;
            }
            if !active {
                self.conceal_if_inactive(window, m, w);
            } else if self.windows.get(&window).is_some_and(|mw| !mw.minimized) {
                if let Err(e) = self.backend.show(window) {
                    self.absorb(e);
                }
            }
        }
        self.place_changed(m, w, &before, None);
    }

    fn float_overflow(&mut self, overflow: Vec<WindowId>) {
        for window in overflow {
            info!("No slot left for window {}, floating it", window);
            if let Some(managed) = self.windows.get_mut(&window) {
                managed.floating = true;
            }
        }
    }

    /// Float a window pushed out of its workspace by a manual layout.
    /// `visible` is false when that workspace was hidden.
    fn float_displaced(&mut self, window: WindowId, visible: bool) {
        let Some(managed) = self.windows.get_mut(&window) else {
            return;
        };
        managed.floating = true;
        let (restore, settled) = (
            managed.restore_rect,
            !managed.maximized && !managed.minimized,
        );
        debug!("Window {} left out of the manual layout, floating it", window);
        if !visible {
            if let Err(e) = self.backend.show(window) {
                self.absorb(e);
                return;
            }
        }
        if self.enabled && settled {
            if let Err(e) = self.backend.move_resize(window, restore) {
                self.absorb(e);
            }
        }
    }

    fn conceal_if_inactive(&mut self, window: WindowId, m: usize, w: usize) {
        if self.monitors[m].workspaces[w].is_active() {
            return;
        }
        if let Err(e) = self.backend.hide(window) {
            self.absorb(e);
        }
    }

    fn move_to_empty(&mut self, window: WindowId, m: usize, w: usize, from: usize, to: usize) {
        let stamp = self.next_stamp();
        let ws = &mut self.monitors[m].workspaces[w];
        ws.unassign(window);
        if ws.assign(window, to, stamp).is_err() {
            // Slot turned out occupied, restore the old assignment
            let _ = ws.assign(window, from, stamp);
            self.place(m, w, from);
            return;
        }
        debug!("Window {} moved from slot {} to empty slot {}", window, from, to);
        self.place(m, w, to);
    }

    /// Hide the current workspace of monitor `m` and show workspace
    /// `index`. Returns the windows that were shown.
    fn activate_workspace(&mut self, m: usize, index: usize) -> Vec<WindowId> {
        let keep_all = !self.enabled;
        let current = self.monitors[m].active;
        let Self {
            monitors,
            backend,
            windows,
            ..
        } = self;
        let monitor = &mut monitors[m];

        let hidden = monitor.workspaces[current].deactivate(backend);
        monitor.active = index;
        let target = &mut monitor.workspaces[index];
        let suspended = target
            .windows()
            .iter()
            .any(|w| windows.get(w).is_some_and(|mw| mw.maximized));
        let shown = target.activate(backend, |w| keep_all || suspended || windows.get(&w).is_none());

        for window in &shown.shown {
            if let Some(managed) = windows.get_mut(window) {
                managed.minimized = false;
            }
        }
        if self
            .focused
            .is_some_and(|f| self.monitors[m].workspaces[current].contains(f))
        {
            self.focused = None;
        }

        // Siblings of a maximized window missed their move; place them on restore
        if suspended && !keep_all {
            let ws = &mut self.monitors[m].workspaces[index];
            for &window in &shown.shown {
                if self.windows.get(&window).is_some_and(|mw| !mw.maximized) {
                    ws.defer(window);
                }
            }
        }

        let visible = shown.shown.clone();
        self.absorb_report(hidden);
        self.absorb_report(shown);
        visible
    }
}
