//! gridtile Daemon
//!
//! Main daemon process for the gridtile window manager.
//!
//! Responsibilities:
//! - Load configuration and initialize logging
//! - Poll the window registry and monitor topology
//! - Serialize lifecycle events, commands and pointer samples into the
//!   tiling coordinator
//! - Handle IPC commands from the CLI

mod config;
#[cfg(windows)]
mod server;

use anyhow::Result;
use clap::Parser;
use config::{Config, WindowAction};
use gridtile_core_layout::{
    Direction, EventQueue, LayoutError, LayoutPreset, Membership, NewWindow, PointerSample, Rect,
    SessionKind, TilingCoordinator, TilingEvent, WindowBackend, WindowId, WORKSPACES_PER_MONITOR,
};
use gridtile_ipc::{Bounds, IpcCommand, IpcResponse, MonitorState, WorkspaceState};
use gridtile_platform_win32::{
    MonitorInfo, TopologyTracker, WindowEvent, WindowInfo, WindowTracker,
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Fallback work area when no monitor is detected.
const FALLBACK_VIEWPORT_WIDTH: i32 = 1920;
const FALLBACK_VIEWPORT_HEIGHT: i32 = 1080;
const FALLBACK_WORK_AREA_HEIGHT: i32 = 1040;

/// Command-line options for the daemon.
#[derive(Parser, Debug)]
#[command(name = "gridtile")]
#[command(author, version, about = "Dynamic grid tiling for Windows", long_about = None)]
struct Args {
    /// Load configuration from this file instead of the standard locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Track windows but only log placement commands
    #[arg(long)]
    dry_run: bool,
}

/// Failures surfaced to IPC clients.
#[derive(Debug, Error)]
enum CommandError {
    #[error("Workspace {0} does not exist (expected 1-{max})", max = WORKSPACES_PER_MONITOR)]
    InvalidWorkspace(usize),

    #[error("Rejected while a {0} session is active")]
    Busy(&'static str),

    #[error("{0}")]
    Rejected(&'static str),

    #[error("Failed to reload config: {0}")]
    Reload(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

fn session_name(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Idle => "none",
        SessionKind::Drag => "drag",
        SessionKind::Swap => "swap",
    }
}

fn bounds(rect: Rect) -> Bounds {
    Bounds {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn direction(direction: gridtile_ipc::Direction) -> Direction {
    match direction {
        gridtile_ipc::Direction::Left => Direction::Left,
        gridtile_ipc::Direction::Right => Direction::Right,
        gridtile_ipc::Direction::Up => Direction::Up,
        gridtile_ipc::Direction::Down => Direction::Down,
    }
}

/// Single-monitor topology used when enumeration fails.
fn fallback_monitor() -> MonitorInfo {
    MonitorInfo {
        id: 1,
        rect: Rect::new(0, 0, FALLBACK_VIEWPORT_WIDTH, FALLBACK_VIEWPORT_HEIGHT),
        work_area: Rect::new(0, 0, FALLBACK_VIEWPORT_WIDTH, FALLBACK_WORK_AREA_HEIGHT),
        is_primary: true,
        device_name: "Fallback".to_string(),
    }
}

/// Everything the event loop owns.
struct AppState<B: WindowBackend> {
    coordinator: TilingCoordinator<B>,
    /// User configuration.
    config: Config,
    /// File the configuration came from when given on the command line.
    config_path: Option<PathBuf>,
    tracker: WindowTracker,
    topology: TopologyTracker,
    /// Pending events, drained in priority order.
    queue: EventQueue,
    /// Daemon start time for uptime reporting.
    start_time: std::time::Instant,
}

impl<B: WindowBackend> AppState<B> {
    fn new(
        config: Config,
        config_path: Option<PathBuf>,
        backend: B,
        monitors: Vec<MonitorInfo>,
    ) -> Self {
        let monitors = if monitors.is_empty() {
            warn!(
                "No monitors detected, using fallback {}x{}",
                FALLBACK_VIEWPORT_WIDTH, FALLBACK_VIEWPORT_HEIGHT
            );
            vec![fallback_monitor()]
        } else {
            monitors
        };

        let mut topology = TopologyTracker::new();
        topology.update(monitors.clone());
        let areas = topology.current().iter().map(MonitorInfo::area).collect();

        Self {
            coordinator: TilingCoordinator::new(backend, config.tiling_settings(), areas),
            config,
            config_path,
            tracker: WindowTracker::new(),
            topology,
            queue: EventQueue::new(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Apply every queued event in priority order.
    fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.queue.pop() {
            self.coordinator.handle(event);
            handled += 1;
        }
        handled
    }

    /// Replace the configuration and push new settings into the coordinator.
    fn apply_config(&mut self, mut config: Config) {
        for warning in config.validate() {
            warn!("Config: {}", warning);
        }
        self.coordinator.set_settings(config.tiling_settings());
        info!(
            "Configuration applied: gap={}, outer_padding={}, master_ratio={}, auto_compact={}",
            config.layout.gap,
            config.layout.outer_padding,
            config.layout.master_ratio,
            config.behavior.auto_compact
        );
        self.config = config;
    }

    fn reload_config(&mut self) -> Result<(), CommandError> {
        let loaded = match &self.config_path {
            Some(path) => Config::load_from_path(path),
            None => Config::load(),
        };
        let config = loaded.map_err(|e| CommandError::Reload(format!("{:#}", e)))?;
        self.apply_config(config);
        Ok(())
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Whether a window is invisible because its workspace is not shown.
    fn hidden_by_workspace(coordinator: &TilingCoordinator<B>, window: WindowId) -> bool {
        match coordinator.membership(window) {
            Membership::Tiled(slot) => {
                coordinator
                    .monitor(slot.monitor)
                    .is_some_and(|m| m.active_index() != slot.workspace)
                    && coordinator.backend().is_alive(window)
            }
            _ => false,
        }
    }

    /// Diff a registry snapshot and queue the resulting events.
    fn poll_registry(&mut self, snapshot: &[WindowInfo], foreground: Option<WindowId>) {
        let coordinator = &self.coordinator;
        let events = self
            .tracker
            .update(snapshot, foreground, |id| Self::hidden_by_workspace(coordinator, id));
        for event in events {
            self.handle_window_event(event);
        }
    }

    /// Queue a topology change if the monitor set differs from the last poll.
    fn poll_topology(&mut self, monitors: Vec<MonitorInfo>) {
        if let Some(event) = self.topology.update(monitors) {
            self.handle_window_event(event);
        }
    }

    fn poll_pointer(&mut self, sample: PointerSample) {
        self.queue.push(TilingEvent::Pointer(sample));
    }

    /// Translate a platform event into a tiling event.
    fn handle_window_event(&mut self, event: WindowEvent) {
        let event = match event {
            WindowEvent::Created(info) => {
                let executable = info.executable.as_deref().unwrap_or_default();
                let action = self
                    .config
                    .classify(&info.class_name, &info.title, executable);
                let mut new = NewWindow::new(info.hwnd, info.rect).on_monitor(info.monitor);
                new.maximized = info.maximized;
                match action {
                    WindowAction::Ignore => {
                        debug!(
                            "Ignoring window by rule: {} ({})",
                            info.title, info.class_name
                        );
                        return;
                    }
                    WindowAction::Float => {
                        debug!("Floating window by rule: {} ({})", info.title, info.class_name);
                        new = new.floating();
                    }
                    WindowAction::Tile => {
                        debug!("New window: {} ({})", info.title, info.class_name);
                    }
                }
                TilingEvent::WindowAdded(new)
            }
            WindowEvent::Destroyed(id) => TilingEvent::WindowRemoved(id),
            WindowEvent::Focused(id) => TilingEvent::WindowFocused(id),
            WindowEvent::Minimized(id) => TilingEvent::WindowMinimized(id),
            WindowEvent::Maximized(id) => TilingEvent::WindowMaximized(id),
            WindowEvent::Restored(id) => TilingEvent::WindowRestored(id),
            WindowEvent::DisplayChange(monitors) => {
                info!("Display configuration changed: {} monitor(s)", monitors.len());
                TilingEvent::TopologyChanged(monitors.iter().map(MonitorInfo::area).collect())
            }
        };
        self.queue.push(event);
    }

    /// Periodic consistency check.
    fn maintain(&mut self) {
        self.drain();
        let repaired = self.coordinator.repair_invariants();
        if repaired > 0 {
            error!("Repaired {} slot map inconsistencies", repaired);
        }
    }

    /// Make windows of inactive workspaces visible again before exit.
    fn restore_hidden_windows(&mut self) {
        let hidden: Vec<WindowId> = self
            .coordinator
            .monitors()
            .iter()
            .flat_map(|m| {
                let active = m.active_index();
                m.workspaces()
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| *i != active)
                    .flat_map(|(_, ws)| ws.windows())
            })
            .collect();
        for window in &hidden {
            if let Err(e) = self.coordinator.backend_mut().show(*window) {
                debug!("Could not show window {} on exit: {}", window, e);
            }
        }
        info!("Restored {} hidden window(s)", hidden.len());
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Process an IPC command and return a response.
    fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        // Lifecycle and topology events queued before the command run first.
        self.drain();
        let result = self.execute(cmd);
        self.drain();
        match result {
            Ok(response) => response,
            Err(e) => {
                debug!("Command failed: {}", e);
                IpcResponse::error(e.to_string())
            }
        }
    }

    fn busy(&self) -> Result<(), CommandError> {
        match self.coordinator.session_kind() {
            SessionKind::Idle => Ok(()),
            kind => Err(CommandError::Busy(session_name(kind))),
        }
    }

    fn execute(&mut self, cmd: IpcCommand) -> Result<IpcResponse, CommandError> {
        match cmd {
            IpcCommand::ToggleTiling => {
                let enabled = self.coordinator.toggle_tiling();
                info!("Tiling {}", if enabled { "enabled" } else { "disabled" });
            }
            IpcCommand::Retile => {
                self.busy()?;
                self.coordinator.force_retile();
            }
            IpcCommand::SwapEnter => {
                self.busy()?;
                if !self.coordinator.enter_swap() {
                    return Err(CommandError::Rejected("No focused tiled window to swap"));
                }
            }
            IpcCommand::SwapMove { direction: dir } => {
                if self.coordinator.swap_session().is_none() {
                    return Err(CommandError::Rejected("Swap mode is not active"));
                }
                self.coordinator.swap_move(direction(dir));
            }
            IpcCommand::SwapExit => {
                if !self.coordinator.exit_swap() {
                    return Err(CommandError::Rejected("Swap mode is not active"));
                }
            }
            IpcCommand::ToggleFloat => {
                self.busy()?;
                if !self.coordinator.toggle_float() {
                    return Err(CommandError::Rejected("No focused window to float"));
                }
            }
            IpcCommand::SwitchWorkspace { index } => {
                if index == 0 || index > WORKSPACES_PER_MONITOR {
                    return Err(CommandError::InvalidWorkspace(index));
                }
                self.busy()?;
                self.coordinator
                    .switch_workspace(index - 1)
                    .map_err(|_| CommandError::InvalidWorkspace(index))?;
            }
            IpcCommand::MoveWorkspaceToNextMonitor => {
                self.busy()?;
                self.coordinator.move_workspace_to_next_monitor();
            }
            IpcCommand::SetLayout {
                layout,
                slots,
                workspace,
                monitor,
            } => {
                let preset: LayoutPreset = layout.parse()?;
                let monitor = monitor
                    .or_else(|| self.coordinator.focused_monitor())
                    .ok_or(CommandError::Rejected("No monitor to lay out"))?;
                let index = match workspace {
                    Some(i) if i == 0 || i > WORKSPACES_PER_MONITOR => {
                        return Err(CommandError::InvalidWorkspace(i))
                    }
                    Some(i) => i - 1,
                    None => self
                        .coordinator
                        .monitor(monitor)
                        .map(|m| m.active_index())
                        .ok_or(LayoutError::UnknownMonitor(monitor))?,
                };
                let assignments: Vec<(usize, WindowId)> = slots
                    .iter()
                    .enumerate()
                    .filter_map(|(slot, window)| window.map(|w| (slot, w)))
                    .collect();
                self.busy()?;
                if !self
                    .coordinator
                    .set_layout(monitor, index, preset, &assignments)?
                {
                    return Err(CommandError::Rejected("Layout change was refused"));
                }
                info!("Layout {} applied to workspace {}", layout.trim(), index + 1);
            }
            IpcCommand::QueryState => return Ok(self.state_response()),
            IpcCommand::QueryBorders => return Ok(self.borders_response()),
            IpcCommand::Reload => {
                self.reload_config()?;
                info!("Configuration reloaded");
            }
            IpcCommand::Stop => {
                info!(
                    "Stop requested after {}s",
                    self.start_time.elapsed().as_secs()
                );
            }
        }
        Ok(IpcResponse::Ok)
    }

    fn state_response(&self) -> IpcResponse {
        let monitors = self
            .coordinator
            .monitors()
            .iter()
            .map(|m| MonitorState {
                id: m.id,
                work_area: bounds(m.work_area),
                workspaces: m
                    .workspaces()
                    .iter()
                    .enumerate()
                    .map(|(i, ws)| WorkspaceState {
                        index: i + 1,
                        active: ws.is_active(),
                        layout: ws.preset().map(|p| p.label()),
                        slots: (0..ws.capacity()).map(|slot| ws.slot_at(slot)).collect(),
                    })
                    .collect(),
            })
            .collect();

        let mut floating: Vec<WindowId> = self
            .coordinator
            .managed_windows()
            .map(|mw| mw.id)
            .filter(|id| {
                matches!(
                    self.coordinator.membership(*id),
                    Membership::Floating | Membership::Unplaced
                )
            })
            .collect();
        floating.sort_unstable();

        IpcResponse::State {
            tiling_enabled: self.coordinator.is_enabled(),
            session: session_name(self.coordinator.session_kind()).to_string(),
            focused_window: self.coordinator.focused(),
            focused_monitor: self.coordinator.focused_monitor(),
            floating,
            monitors,
        }
    }

    fn borders_response(&self) -> IpcResponse {
        let targets = self.coordinator.border_targets();
        IpcResponse::Borders {
            active: targets.active.map(bounds),
            swap: targets.swap.map(bounds),
            preview: targets.preview.map(bounds),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(not(windows))]
async fn serve(_config: Config, _args: Args) -> Result<()> {
    anyhow::bail!("gridtile manages Win32 windows and only runs on Windows")
}

#[cfg(windows)]
async fn serve(config: Config, args: Args) -> Result<()> {
    server::run(config, args.config, args.dry_run).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set DPI awareness before any window/GDI operations
    gridtile_platform_win32::set_dpi_awareness();

    // Load configuration first (needed for log level)
    let loaded = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });

    init_logging(&config.behavior.log_level)?;

    for warning in config.validate() {
        warn!("Config: {}", warning);
    }

    info!("gridtile daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if args.dry_run {
        info!("Dry run: placement commands are logged, windows are left alone");
    }

    serve(config, args).await?;

    info!("gridtile daemon shutting down.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::WindowRule;
    use gridtile_core_layout::{Point, RecordingBackend};

    fn monitor(id: u64, x: i32) -> MonitorInfo {
        MonitorInfo {
            id,
            rect: Rect::new(x, 0, 1920, 1080),
            work_area: Rect::new(x, 0, 1920, 1040),
            is_primary: x == 0,
            device_name: format!(r"\\.\DISPLAY{}", id),
        }
    }

    fn window(id: WindowId, monitor: u64) -> WindowInfo {
        WindowInfo {
            hwnd: id,
            title: format!("Window {}", id),
            class_name: "Notepad".to_string(),
            process_id: 100,
            executable: Some("notepad.exe".to_string()),
            rect: Rect::new(100, 100, 800, 600),
            monitor,
            visible: true,
            minimized: false,
            maximized: false,
        }
    }

    fn state(monitors: Vec<MonitorInfo>) -> AppState<RecordingBackend> {
        AppState::new(Config::default(), None, RecordingBackend::new(), monitors)
    }

    fn state_with(windows: &[WindowId]) -> AppState<RecordingBackend> {
        let mut s = state(vec![monitor(1, 0)]);
        let snapshot: Vec<WindowInfo> = windows.iter().map(|&id| window(id, 1)).collect();
        s.poll_registry(&snapshot, windows.first().copied());
        s.drain();
        s.coordinator.backend_mut().clear();
        s
    }

    fn active_windows(s: &AppState<RecordingBackend>, monitor: u64) -> Vec<WindowId> {
        s.coordinator
            .monitor(monitor)
            .map(|m| m.active_workspace().windows())
            .unwrap_or_default()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    #[test]
    fn test_app_state_new() {
        let s = state(vec![monitor(1, 0), monitor(2, 1920)]);
        assert_eq!(s.coordinator.monitors().len(), 2);
        assert!(s.coordinator.is_enabled());
        assert_eq!(s.coordinator.managed_count(), 0);
    }

    #[test]
    fn test_app_state_no_monitors_fallback() {
        let s = state(Vec::new());
        assert_eq!(s.coordinator.monitors().len(), 1);
        assert_eq!(
            s.coordinator.monitors()[0].work_area,
            Rect::new(0, 0, FALLBACK_VIEWPORT_WIDTH, FALLBACK_WORK_AREA_HEIGHT)
        );
    }

    // ========================================================================
    // Registry events
    // ========================================================================

    #[test]
    fn test_registry_windows_are_tiled() {
        let s = state_with(&[1, 2, 3]);
        assert_eq!(active_windows(&s, 1), vec![1, 2, 3]);
        assert_eq!(
            s.coordinator.monitor(1).unwrap().active_workspace().preset(),
            Some(LayoutPreset::MasterStack)
        );
        assert_eq!(s.coordinator.focused(), Some(1));
    }

    #[test]
    fn test_builtin_ignored_class_is_not_managed() {
        let mut s = state(vec![monitor(1, 0)]);
        let mut tray = window(5, 1);
        tray.class_name = "Shell_TrayWnd".to_string();
        s.poll_registry(&[tray], None);
        s.drain();
        assert_eq!(s.coordinator.membership(5), Membership::Unmanaged);
    }

    #[test]
    fn test_float_rule_keeps_window_out_of_grid() {
        let mut config = Config::default();
        config.window_rules = vec![WindowRule {
            match_class: None,
            match_title: None,
            match_executable: Some("calc.exe".to_string()),
            action: WindowAction::Float,
        }];
        let mut s = AppState::new(config, None, RecordingBackend::new(), vec![monitor(1, 0)]);
        let mut calc = window(9, 1);
        calc.executable = Some("CALC.EXE".to_string());
        s.poll_registry(&[window(1, 1), calc], None);
        s.drain();

        assert_eq!(s.coordinator.membership(9), Membership::Floating);
        assert_eq!(active_windows(&s, 1), vec![1]);
    }

    #[test]
    fn test_destroyed_window_is_removed() {
        let mut s = state_with(&[1, 2]);
        s.poll_registry(&[window(1, 1)], Some(1));
        s.drain();
        assert_eq!(s.coordinator.membership(2), Membership::Unmanaged);
        assert_eq!(active_windows(&s, 1), vec![1]);
    }

    #[test]
    fn test_hidden_workspace_windows_are_not_destroyed() {
        let mut s = state_with(&[1, 2]);
        assert!(matches!(
            s.handle_command(IpcCommand::SwitchWorkspace { index: 2 }),
            IpcResponse::Ok
        ));
        // Hidden windows disappear from the visible snapshot.
        s.poll_registry(&[], None);
        s.drain();
        assert!(matches!(s.coordinator.membership(1), Membership::Tiled(_)));
        assert!(matches!(s.coordinator.membership(2), Membership::Tiled(_)));
    }

    #[test]
    fn test_maximize_event_reaches_coordinator() {
        let mut s = state_with(&[1, 2]);
        let mut maximized = window(1, 1);
        maximized.maximized = true;
        s.poll_registry(&[maximized, window(2, 1)], Some(1));
        s.drain();
        assert!(s.coordinator.managed(1).unwrap().maximized);
        assert!(s.coordinator.backend().commands().is_empty());
    }

    #[test]
    fn test_display_change_adds_monitor() {
        let mut s = state_with(&[1]);
        s.poll_topology(vec![monitor(1, 0), monitor(2, 1920)]);
        s.drain();
        assert_eq!(s.coordinator.monitors().len(), 2);
        assert_eq!(active_windows(&s, 1), vec![1]);
    }

    #[test]
    fn test_unchanged_topology_is_silent() {
        let mut s = state_with(&[1]);
        s.poll_topology(vec![monitor(1, 0)]);
        assert_eq!(s.drain(), 0);
    }

    #[test]
    fn test_pointer_samples_drive_drag() {
        let mut s = state_with(&[1, 2]);
        let ws = s.coordinator.monitor(1).unwrap().active_workspace();
        let from = ws.slot_rect(0).unwrap().center();
        let to = ws.slot_rect(1).unwrap().center();

        s.poll_pointer(PointerSample {
            position: from,
            left_down: true,
            title_bar_window: Some(1),
        });
        s.drain();
        s.poll_pointer(PointerSample {
            position: Point::new(to.x, to.y),
            left_down: true,
            title_bar_window: Some(1),
        });
        s.drain();
        assert_eq!(s.coordinator.session_kind(), SessionKind::Drag);

        s.poll_pointer(PointerSample {
            position: to,
            left_down: false,
            title_bar_window: None,
        });
        s.drain();
        assert_eq!(s.coordinator.session_kind(), SessionKind::Idle);
        assert_eq!(active_windows(&s, 1), vec![2, 1]);
    }

    // ========================================================================
    // IPC commands
    // ========================================================================

    #[test]
    fn test_cmd_toggle_tiling() {
        let mut s = state_with(&[1]);
        assert!(matches!(s.handle_command(IpcCommand::ToggleTiling), IpcResponse::Ok));
        assert!(!s.coordinator.is_enabled());
        s.handle_command(IpcCommand::ToggleTiling);
        assert!(s.coordinator.is_enabled());
    }

    #[test]
    fn test_cmd_retile_empty() {
        let mut s = state(vec![monitor(1, 0)]);
        assert!(matches!(s.handle_command(IpcCommand::Retile), IpcResponse::Ok));
    }

    #[test]
    fn test_cmd_switch_workspace_out_of_range() {
        let mut s = state_with(&[1]);
        for index in [0, 4] {
            match s.handle_command(IpcCommand::SwitchWorkspace { index }) {
                IpcResponse::Error { message } => assert!(message.contains("does not exist")),
                other => panic!("Expected error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_cmd_switch_workspace_hides_windows() {
        let mut s = state_with(&[1, 2]);
        s.handle_command(IpcCommand::SwitchWorkspace { index: 3 });
        assert!(s.coordinator.backend().is_hidden(1));
        assert!(s.coordinator.backend().is_hidden(2));
        assert_eq!(s.coordinator.monitor(1).unwrap().active_index(), 2);
    }

    fn set_layout(layout: &str, slots: &[Option<WindowId>]) -> IpcCommand {
        IpcCommand::SetLayout {
            layout: layout.to_string(),
            slots: slots.to_vec(),
            workspace: None,
            monitor: None,
        }
    }

    fn error_message(response: IpcResponse) -> String {
        match response {
            IpcResponse::Error { message } => message,
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_set_layout() {
        let mut s = state_with(&[1, 2, 3]);
        let response = s.handle_command(set_layout("split", &[Some(3), Some(1)]));
        assert!(matches!(response, IpcResponse::Ok));

        let ws = s.coordinator.monitor(1).unwrap().active_workspace();
        assert_eq!(ws.preset(), Some(LayoutPreset::Split));
        assert_eq!(ws.slot_at(0), Some(3));
        assert_eq!(ws.slot_at(1), Some(1));
        assert_eq!(s.coordinator.membership(2), Membership::Floating);
    }

    #[test]
    fn test_cmd_set_layout_on_other_workspace() {
        let mut s = state_with(&[1, 2]);
        let response = s.handle_command(IpcCommand::SetLayout {
            layout: "full".to_string(),
            slots: vec![Some(2)],
            workspace: Some(3),
            monitor: Some(1),
        });
        assert!(matches!(response, IpcResponse::Ok));
        assert_eq!(active_windows(&s, 1), vec![1]);
        assert!(s.coordinator.backend().is_hidden(2));
        assert_eq!(s.coordinator.monitor(1).unwrap().active_index(), 0);
    }

    #[test]
    fn test_cmd_set_layout_errors() {
        let mut s = state_with(&[1, 2]);
        let message = error_message(s.handle_command(set_layout("hexagon", &[Some(1)])));
        assert!(message.contains("Unknown layout preset"));

        let message = error_message(s.handle_command(set_layout("split", &[Some(1), Some(99)])));
        assert!(message.contains("not managed"));

        let message = error_message(s.handle_command(set_layout("full", &[Some(1), Some(2)])));
        assert!(message.contains("do not fit"));

        let message = error_message(s.handle_command(IpcCommand::SetLayout {
            layout: "full".to_string(),
            slots: vec![Some(1)],
            workspace: Some(4),
            monitor: None,
        }));
        assert!(message.contains("does not exist"));

        let message = error_message(s.handle_command(IpcCommand::SetLayout {
            layout: "full".to_string(),
            slots: vec![Some(1)],
            workspace: None,
            monitor: Some(42),
        }));
        assert!(message.contains("Monitor 42"));

        // Nothing changed
        let mut windows = active_windows(&s, 1);
        windows.sort_unstable();
        assert_eq!(windows, vec![1, 2]);
    }

    #[test]
    fn test_cmd_set_layout_rejected_during_swap() {
        let mut s = state_with(&[1, 2]);
        s.handle_command(IpcCommand::SwapEnter);
        let message = error_message(s.handle_command(set_layout("split", &[Some(2), Some(1)])));
        assert!(message.contains("swap"));
    }

    #[test]
    fn test_cmd_swap_flow() {
        let mut s = state_with(&[1, 2]);
        assert!(matches!(s.handle_command(IpcCommand::SwapEnter), IpcResponse::Ok));
        assert!(matches!(
            s.handle_command(IpcCommand::Retile),
            IpcResponse::Error { .. }
        ));
        s.handle_command(IpcCommand::SwapMove {
            direction: gridtile_ipc::Direction::Right,
        });
        assert!(matches!(s.handle_command(IpcCommand::SwapExit), IpcResponse::Ok));
        assert_eq!(active_windows(&s, 1), vec![2, 1]);
    }

    #[test]
    fn test_cmd_swap_move_without_session() {
        let mut s = state_with(&[1, 2]);
        match s.handle_command(IpcCommand::SwapMove {
            direction: gridtile_ipc::Direction::Left,
        }) {
            IpcResponse::Error { message } => assert!(message.contains("not active")),
            other => panic!("Expected error, got {:?}", other),
        }
        assert!(matches!(
            s.handle_command(IpcCommand::SwapExit),
            IpcResponse::Error { .. }
        ));
    }

    #[test]
    fn test_cmd_toggle_float_focused() {
        let mut s = state_with(&[1, 2]);
        assert!(matches!(s.handle_command(IpcCommand::ToggleFloat), IpcResponse::Ok));
        assert_eq!(s.coordinator.membership(1), Membership::Floating);
        assert_eq!(active_windows(&s, 1), vec![2]);
    }

    #[test]
    fn test_cmd_toggle_float_without_focus() {
        let mut s = state(vec![monitor(1, 0)]);
        assert!(matches!(
            s.handle_command(IpcCommand::ToggleFloat),
            IpcResponse::Error { .. }
        ));
    }

    #[test]
    fn test_cmd_move_workspace_single_monitor() {
        let mut s = state_with(&[1]);
        assert!(matches!(
            s.handle_command(IpcCommand::MoveWorkspaceToNextMonitor),
            IpcResponse::Ok
        ));
        assert_eq!(active_windows(&s, 1), vec![1]);
    }

    #[test]
    fn test_cmd_move_workspace_to_next_monitor() {
        let mut s = state(vec![monitor(1, 0), monitor(2, 1920)]);
        s.poll_registry(&[window(1, 1), window(2, 1)], Some(1));
        s.drain();
        s.handle_command(IpcCommand::MoveWorkspaceToNextMonitor);
        assert!(active_windows(&s, 1).is_empty());
        assert_eq!(active_windows(&s, 2), vec![1, 2]);
        assert_eq!(s.coordinator.focused_monitor(), Some(2));
    }

    #[test]
    fn test_cmd_query_state() {
        let mut s = state_with(&[1, 2]);
        match s.handle_command(IpcCommand::QueryState) {
            IpcResponse::State {
                tiling_enabled,
                session,
                focused_window,
                monitors,
                floating,
                ..
            } => {
                assert!(tiling_enabled);
                assert_eq!(session, "none");
                assert_eq!(focused_window, Some(1));
                assert!(floating.is_empty());
                assert_eq!(monitors.len(), 1);
                let ws = &monitors[0].workspaces;
                assert_eq!(ws.len(), WORKSPACES_PER_MONITOR);
                assert_eq!(ws[0].index, 1);
                assert!(ws[0].active);
                assert_eq!(ws[0].layout.as_deref(), Some("split"));
                assert_eq!(ws[0].slots, vec![Some(1), Some(2)]);
                assert!(ws[1].slots.is_empty());
            }
            other => panic!("Expected state, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_query_borders() {
        let mut s = state_with(&[1, 2]);
        let slot = s
            .coordinator
            .monitor(1)
            .unwrap()
            .active_workspace()
            .slot_rect(0)
            .unwrap();
        match s.handle_command(IpcCommand::QueryBorders) {
            IpcResponse::Borders {
                active,
                swap,
                preview,
            } => {
                assert_eq!(active, Some(bounds(slot)));
                assert!(swap.is_none());
                assert!(preview.is_none());
            }
            other => panic!("Expected borders, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_reload_missing_file_fails() {
        let mut s = AppState::new(
            Config::default(),
            Some(PathBuf::from("does/not/exist.toml")),
            RecordingBackend::new(),
            vec![monitor(1, 0)],
        );
        match s.handle_command(IpcCommand::Reload) {
            IpcResponse::Error { message } => assert!(message.contains("reload")),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_stop() {
        let mut s = state(vec![monitor(1, 0)]);
        assert!(matches!(s.handle_command(IpcCommand::Stop), IpcResponse::Ok));
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn test_apply_config_relayouts_windows() {
        let mut s = state_with(&[1, 2]);
        let mut config = Config::default();
        config.layout.gap = 20;
        s.apply_config(config);

        assert_eq!(s.config.layout.gap, 20);
        assert_eq!(s.coordinator.settings().layout.gap, 20);
        assert_eq!(s.coordinator.backend().move_count(), 2);
    }

    #[test]
    fn test_apply_config_clamps_values() {
        let mut s = state_with(&[1]);
        let mut config = Config::default();
        config.layout.master_ratio = 3.0;
        s.apply_config(config);
        assert_eq!(s.coordinator.settings().layout.master_ratio, 0.8);
    }

    #[test]
    fn test_restore_hidden_windows_on_exit() {
        let mut s = state_with(&[1, 2]);
        s.handle_command(IpcCommand::SwitchWorkspace { index: 2 });
        s.restore_hidden_windows();
        assert!(!s.coordinator.backend().is_hidden(1));
        assert!(!s.coordinator.backend().is_hidden(2));
    }
}
