//! gridtile CLI
//!
//! Command-line interface for controlling the gridtile daemon.
//!
//! Commands are sent to the daemon via IPC (named pipe).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gridtile_ipc::{Bounds, Direction, IpcCommand, IpcResponse};

#[derive(Parser)]
#[command(name = "gridtile-cli")]
#[command(author, version, about = "Control the gridtile tiling daemon")]
struct Cli {
    /// Print the raw JSON response instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn tiling on or off
    ToggleTiling,
    /// Re-place every window on the focused monitor
    Retile,
    /// Swap mode commands
    Swap {
        #[command(subcommand)]
        action: SwapAction,
    },
    /// Float the focused window, or tile it again
    ToggleFloat,
    /// Switch the focused monitor to another workspace
    Workspace {
        /// Workspace number (1-3)
        index: usize,
    },
    /// Move the active workspace to the next monitor
    MoveWorkspaceNextMonitor,
    /// Apply a layout preset with windows in slot order
    Layout {
        /// full, split, master_stack or grid CxR (e.g. grid:3x2)
        layout: String,
        /// Window handles in slot order, `-` leaves a slot free
        #[arg(required = true, value_parser = parse_slot)]
        windows: Vec<SlotArg>,
        /// Workspace number (1-3), defaults to the active one
        #[arg(long)]
        workspace: Option<usize>,
        /// Monitor id, defaults to the focused one
        #[arg(long, value_parser = parse_handle)]
        monitor: Option<u64>,
    },
    /// Show monitors, workspaces and slots
    State,
    /// Show the border rectangles
    Borders,
    /// Reload configuration
    Reload,
    /// Stop the daemon
    Stop,
}

#[derive(Subcommand)]
enum SwapAction {
    /// Enter swap mode on the focused window
    Enter,
    /// Move the swap subject to the neighboring slot
    Move {
        #[arg(value_enum)]
        direction: DirectionArg,
    },
    /// Leave swap mode
    Exit,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Left,
    Right,
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Left => Direction::Left,
            DirectionArg::Right => Direction::Right,
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

/// Parse a handle as printed by `state`: `0x` hex or decimal.
fn parse_handle(arg: &str) -> Result<u64, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|e| format!("invalid handle '{}': {}", arg, e))
}

/// One slot of a `layout` command.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SlotArg(Option<u64>);

fn parse_slot(arg: &str) -> Result<SlotArg, String> {
    if arg == "-" {
        Ok(SlotArg(None))
    } else {
        parse_handle(arg).map(|id| SlotArg(Some(id)))
    }
}

fn to_command(command: Commands) -> IpcCommand {
    match command {
        Commands::ToggleTiling => IpcCommand::ToggleTiling,
        Commands::Retile => IpcCommand::Retile,
        Commands::Swap { action } => match action {
            SwapAction::Enter => IpcCommand::SwapEnter,
            SwapAction::Move { direction } => IpcCommand::SwapMove {
                direction: direction.into(),
            },
            SwapAction::Exit => IpcCommand::SwapExit,
        },
        Commands::ToggleFloat => IpcCommand::ToggleFloat,
        Commands::Workspace { index } => IpcCommand::SwitchWorkspace { index },
        Commands::MoveWorkspaceNextMonitor => IpcCommand::MoveWorkspaceToNextMonitor,
        Commands::Layout {
            layout,
            windows,
            workspace,
            monitor,
        } => IpcCommand::SetLayout {
            layout,
            slots: windows.into_iter().map(|SlotArg(id)| id).collect(),
            workspace,
            monitor,
        },
        Commands::State => IpcCommand::QueryState,
        Commands::Borders => IpcCommand::QueryBorders,
        Commands::Reload => IpcCommand::Reload,
        Commands::Stop => IpcCommand::Stop,
    }
}

fn format_bounds(bounds: Option<Bounds>) -> String {
    match bounds {
        Some(b) => format!("{}x{} at {},{}", b.width, b.height, b.x, b.y),
        None => "-".to_string(),
    }
}

fn format_id(id: Option<u64>) -> String {
    id.map_or_else(|| "-".to_string(), |id| format!("{:#x}", id))
}

/// Render a response for humans.
fn render(response: &IpcResponse) -> String {
    match response {
        IpcResponse::Ok => "ok".to_string(),
        IpcResponse::Error { message } => format!("error: {}", message),
        IpcResponse::State {
            tiling_enabled,
            session,
            focused_window,
            focused_monitor,
            floating,
            monitors,
        } => {
            let mut out = format!(
                "tiling: {}\nsession: {}\nfocused: window {} on monitor {}\n",
                if *tiling_enabled { "on" } else { "off" },
                session,
                format_id(*focused_window),
                format_id(*focused_monitor),
            );
            for monitor in monitors {
                out.push_str(&format!(
                    "monitor {:#x} ({})\n",
                    monitor.id,
                    format_bounds(Some(monitor.work_area))
                ));
                for ws in &monitor.workspaces {
                    let slots: Vec<String> = ws.slots.iter().map(|s| format_id(*s)).collect();
                    out.push_str(&format!(
                        "  {}workspace {}: {} [{}]\n",
                        if ws.active { "*" } else { " " },
                        ws.index,
                        ws.layout.as_deref().unwrap_or("empty"),
                        slots.join(", ")
                    ));
                }
            }
            if !floating.is_empty() {
                let ids: Vec<String> = floating.iter().map(|id| format!("{:#x}", id)).collect();
                out.push_str(&format!("floating: {}\n", ids.join(", ")));
            }
            out.trim_end().to_string()
        }
        IpcResponse::Borders {
            active,
            swap,
            preview,
        } => format!(
            "active: {}\nswap: {}\npreview: {}",
            format_bounds(*active),
            format_bounds(*swap),
            format_bounds(*preview)
        ),
    }
}

#[cfg(windows)]
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    use anyhow::Context;
    use gridtile_ipc::{decode, encode, PIPE_NAME};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    const CONNECT_ATTEMPTS: u32 = 10;
    const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

    let mut attempts = 0;
    let client = loop {
        match ClientOptions::new().open(PIPE_NAME) {
            Ok(client) => break client,
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempts < CONNECT_ATTEMPTS => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to {} (is the daemon running?)", PIPE_NAME)
                })
            }
        }
    };

    let (reader, mut writer) = tokio::io::split(client);
    writer.write_all(encode(cmd)?.as_bytes()).await?;
    writer.flush().await?;

    let mut line = String::new();
    let mut reader = BufReader::new(reader);
    tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("Timed out waiting for the daemon")?
        .context("Failed to read response")?;

    Ok(decode(&line)?)
}

#[cfg(not(windows))]
async fn send_command(_cmd: &IpcCommand) -> Result<IpcResponse> {
    bail!("gridtile-cli talks to the daemon over a Windows named pipe and only runs on Windows")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = to_command(cli.command);
    let response = send_command(&cmd).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", render(&response));
    }

    if let IpcResponse::Error { message } = response {
        bail!("daemon rejected command: {}", message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtile_ipc::{MonitorState, WorkspaceState};

    fn parse(args: &[&str]) -> IpcCommand {
        let cli = Cli::try_parse_from(args).unwrap();
        to_command(cli.command)
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse(&["gridtile-cli", "toggle-tiling"]), IpcCommand::ToggleTiling);
        assert_eq!(parse(&["gridtile-cli", "retile"]), IpcCommand::Retile);
        assert_eq!(parse(&["gridtile-cli", "toggle-float"]), IpcCommand::ToggleFloat);
        assert_eq!(parse(&["gridtile-cli", "state"]), IpcCommand::QueryState);
        assert_eq!(parse(&["gridtile-cli", "borders"]), IpcCommand::QueryBorders);
        assert_eq!(parse(&["gridtile-cli", "stop"]), IpcCommand::Stop);
        assert_eq!(
            parse(&["gridtile-cli", "move-workspace-next-monitor"]),
            IpcCommand::MoveWorkspaceToNextMonitor
        );
    }

    #[test]
    fn test_parse_swap_commands() {
        assert_eq!(parse(&["gridtile-cli", "swap", "enter"]), IpcCommand::SwapEnter);
        assert_eq!(
            parse(&["gridtile-cli", "swap", "move", "up"]),
            IpcCommand::SwapMove {
                direction: Direction::Up
            }
        );
        assert_eq!(parse(&["gridtile-cli", "swap", "exit"]), IpcCommand::SwapExit);
        assert!(Cli::try_parse_from(["gridtile-cli", "swap", "move", "sideways"]).is_err());
    }

    #[test]
    fn test_parse_workspace_passes_one_based_index() {
        assert_eq!(
            parse(&["gridtile-cli", "workspace", "2"]),
            IpcCommand::SwitchWorkspace { index: 2 }
        );
        assert!(Cli::try_parse_from(["gridtile-cli", "workspace", "two"]).is_err());
    }

    #[test]
    fn test_parse_layout_command() {
        assert_eq!(
            parse(&["gridtile-cli", "layout", "grid:2x2", "0x1a", "-", "42"]),
            IpcCommand::SetLayout {
                layout: "grid:2x2".to_string(),
                slots: vec![Some(0x1a), None, Some(42)],
                workspace: None,
                monitor: None,
            }
        );
        assert_eq!(
            parse(&[
                "gridtile-cli",
                "layout",
                "full",
                "7",
                "--workspace",
                "2",
                "--monitor",
                "0x10"
            ]),
            IpcCommand::SetLayout {
                layout: "full".to_string(),
                slots: vec![Some(7)],
                workspace: Some(2),
                monitor: Some(16),
            }
        );
    }

    #[test]
    fn test_parse_layout_rejects_bad_handles() {
        assert!(Cli::try_parse_from(["gridtile-cli", "layout", "split", "0xzz"]).is_err());
        assert!(Cli::try_parse_from(["gridtile-cli", "layout", "split", "window"]).is_err());
        assert!(Cli::try_parse_from(["gridtile-cli", "layout", "split"]).is_err());
    }

    #[test]
    fn test_parse_handle_forms() {
        assert_eq!(parse_handle("0x10"), Ok(16));
        assert_eq!(parse_handle("0X10"), Ok(16));
        assert_eq!(parse_handle("16"), Ok(16));
        assert_eq!(parse_slot("-"), Ok(SlotArg(None)));
        assert!(parse_handle("-1").is_err());
    }

    #[test]
    fn test_json_flag_is_global() {
        let cli = Cli::try_parse_from(["gridtile-cli", "state", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_render_borders() {
        let text = render(&IpcResponse::Borders {
            active: Some(Bounds {
                x: 8,
                y: 8,
                width: 100,
                height: 50,
            }),
            swap: None,
            preview: None,
        });
        assert_eq!(text, "active: 100x50 at 8,8\nswap: -\npreview: -");
    }

    #[test]
    fn test_render_state() {
        let text = render(&IpcResponse::State {
            tiling_enabled: true,
            session: "none".to_string(),
            focused_window: Some(16),
            focused_monitor: Some(1),
            floating: vec![32],
            monitors: vec![MonitorState {
                id: 1,
                work_area: Bounds {
                    x: 0,
                    y: 0,
                    width: 1920,
                    height: 1040,
                },
                workspaces: vec![
                    WorkspaceState {
                        index: 1,
                        active: true,
                        layout: Some("split".to_string()),
                        slots: vec![Some(16), None],
                    },
                    WorkspaceState {
                        index: 2,
                        active: false,
                        layout: None,
                        slots: vec![],
                    },
                ],
            }],
        });
        assert!(text.contains("tiling: on"));
        assert!(text.contains("*workspace 1: split [0x10, -]"));
        assert!(text.contains(" workspace 2: empty []"));
        assert!(text.ends_with("floating: 0x20"));
    }

    #[test]
    fn test_render_error() {
        assert_eq!(render(&IpcResponse::error("busy")), "error: busy");
    }
}
