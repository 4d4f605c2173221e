//! Windows event loop: named-pipe IPC server and registry polling.
//!
//! Every state change funnels through one `mpsc` channel into a single loop
//! that owns the [`AppState`], so the tiling coordinator never sees
//! concurrent mutation.

use crate::config::Config;
use crate::AppState;
use anyhow::{Context, Result};
use gridtile_core_layout::{RecordingBackend, WindowBackend};
use gridtile_ipc::{decode, encode, IpcCommand, IpcResponse, MAX_IPC_MESSAGE_SIZE, PIPE_NAME};
use gridtile_platform_win32::{
    enumerate_monitors, enumerate_windows, foreground_window, pointer_sample, Win32Backend,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// Poll windows, focus and pointer.
    Poll,
    /// Poll monitors and run the consistency check.
    Maintenance,
    /// Shutdown signal.
    Shutdown,
}

/// IPC read timeout - clients must send within this period.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval of the slower monitor poll and invariant check.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Check if another daemon instance is already running by connecting to the named pipe.
fn check_already_running() -> bool {
    ClientOptions::new().open(PIPE_NAME).is_ok()
}

/// Start the daemon with the real or the recording backend.
pub async fn run(config: Config, config_path: Option<PathBuf>, dry_run: bool) -> Result<()> {
    if check_already_running() {
        error!(
            "Another gridtile instance is already running (pipe {} is active)",
            PIPE_NAME
        );
        return Ok(());
    }

    let monitors = match enumerate_monitors() {
        Ok(monitors) => {
            info!("Detected {} monitor(s):", monitors.len());
            for m in &monitors {
                info!(
                    "  Monitor {}: {}x{} (work area: {}x{} at {},{}){} \"{}\"",
                    m.id,
                    m.rect.width,
                    m.rect.height,
                    m.work_area.width,
                    m.work_area.height,
                    m.work_area.x,
                    m.work_area.y,
                    if m.is_primary { " [PRIMARY]" } else { "" },
                    m.device_name
                );
            }
            monitors
        }
        Err(e) => {
            warn!("Failed to detect monitors: {}", e);
            Vec::new()
        }
    };

    let poll_interval = Duration::from_millis(config.behavior.poll_interval_ms);
    if dry_run {
        let state = AppState::new(config, config_path, RecordingBackend::new(), monitors);
        event_loop(state, poll_interval).await
    } else {
        let state = AppState::new(config, config_path, Win32Backend::new(), monitors);
        event_loop(state, poll_interval).await
    }
}

async fn event_loop<B: WindowBackend>(
    mut state: AppState<B>,
    poll_interval: Duration,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    // Initial registry pass so existing windows are tiled before any command
    poll(&mut state);
    info!(
        "Managing {} window(s) at startup",
        state.coordinator.managed_count()
    );

    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        run_ipc_server(ipc_tx).await;
    });
    info!("IPC server listening on {}", PIPE_NAME);

    let mut pollers = vec![
        spawn_ticker(event_tx.clone(), poll_interval, || DaemonEvent::Poll),
        spawn_ticker(event_tx.clone(), MAINTENANCE_INTERVAL, || {
            DaemonEvent::Maintenance
        }),
    ];

    // Install Ctrl+C handler so terminal kill triggers graceful shutdown
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Ready. Use gridtile-cli to send commands.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
            }
            DaemonEvent::Poll => poll(&mut state),
            DaemonEvent::Maintenance => {
                match enumerate_monitors() {
                    Ok(monitors) => state.poll_topology(monitors),
                    Err(e) => debug!("Monitor poll failed: {}", e),
                }
                state.maintain();
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                state.restore_hidden_windows();
                break;
            }
        }
    }

    for handle in pollers.drain(..) {
        handle.abort();
    }
    Ok(())
}

/// One registry, focus and pointer pass.
fn poll<B: WindowBackend>(state: &mut AppState<B>) {
    match enumerate_windows() {
        Ok(windows) => state.poll_registry(&windows, foreground_window()),
        Err(e) => warn!("Failed to enumerate windows: {}", e),
    }
    match pointer_sample() {
        Ok(sample) => state.poll_pointer(sample),
        Err(e) => debug!("Pointer sample failed: {}", e),
    }
    state.drain();
}

fn spawn_ticker(
    tx: mpsc::Sender<DaemonEvent>,
    period: Duration,
    make: fn() -> DaemonEvent,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(make()).await.is_err() {
                break; // Channel closed
            }
        }
    })
}

/// Run the IPC server, accepting connections and dispatching commands.
async fn run_ipc_server(event_tx: mpsc::Sender<DaemonEvent>) {
    let mut is_first_instance = true;

    loop {
        let server = match ServerOptions::new()
            .first_pipe_instance(is_first_instance)
            .pipe_mode(PipeMode::Byte)
            .create(PIPE_NAME)
        {
            Ok(s) => {
                is_first_instance = false;
                s
            }
            Err(e) => {
                error!("Failed to create named pipe server: {}", e);
                if is_first_instance {
                    error!("Is another gridtile daemon already running?");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Waiting for client connection on {}", PIPE_NAME);

        if let Err(e) = server.connect().await {
            error!("Failed to accept client connection: {}", e);
            continue;
        }

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(server, event_tx).await {
                warn!("Client handler error: {:#}", e);
            }
        });
    }
}

/// Serialize a response, falling back to a fixed error line.
fn response_line(response: &IpcResponse) -> String {
    encode(response).unwrap_or_else(|e| {
        warn!("Failed to serialize IPC response: {}", e);
        "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string()
    })
}

/// Handle a single client connection.
async fn handle_client(pipe: NamedPipeServer, event_tx: mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(pipe);
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE as u64);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e).context("Failed to read IPC request"),
        Err(_) => {
            // Timeout: client did not send in time, silently close
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    debug!("Received command: {}", line.trim());

    let cmd: IpcCommand = match decode(&line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(response_line(&response).as_bytes()).await?;

    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_read_timeout_is_reasonable() {
        assert!(IPC_READ_TIMEOUT.as_secs() >= 1);
        assert!(IPC_READ_TIMEOUT.as_secs() <= 30);
    }

    #[test]
    fn test_max_ipc_message_size_is_reasonable() {
        const { assert!(MAX_IPC_MESSAGE_SIZE >= 1024) };
        const { assert!(MAX_IPC_MESSAGE_SIZE <= 1024 * 1024) };
    }

    #[test]
    fn test_response_line_is_newline_terminated() {
        let line = response_line(&IpcResponse::Ok);
        assert_eq!(line, "{\"status\":\"ok\"}\n");
    }
}
