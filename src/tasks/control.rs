//! Unix-socket control surface: one JSON object per line, e.g.
//! `{"command": "next"}`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::{Direction, DisplayCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlCommand {
    Next,
    Previous,
    Pause,
    Resume,
    #[serde(alias = "toggle-state")]
    Toggle,
    Refresh,
}

impl From<ControlCommand> for DisplayCommand {
    fn from(cmd: ControlCommand) -> Self {
        match cmd {
            ControlCommand::Next => Self::Advance(Direction::Next),
            ControlCommand::Previous => Self::Advance(Direction::Previous),
            ControlCommand::Pause => Self::Pause,
            ControlCommand::Resume => Self::resume(),
            ControlCommand::Toggle => Self::Toggle,
            ControlCommand::Refresh => Self::Refresh,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: ControlCommand,
}

/// Parse one request line. Blank lines yield `Ok(None)`.
pub fn parse_request(line: &str) -> Result<Option<ControlCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let req: ControlRequest =
        serde_json::from_str(line).with_context(|| format!("bad control request {line:?}"))?;
    Ok(Some(req.command))
}

#[instrument(skip(to_driver, cancel), fields(socket = %path.display()))]
pub async fn run(
    path: PathBuf,
    to_driver: Sender<DisplayCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(&path)?;
    info!("control socket listening");

    loop {
        select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let to_driver = to_driver.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve(stream, to_driver).await {
                                debug!("control connection ended: {err:#}");
                            }
                        });
                    }
                    Err(err) => warn!("control socket accept failed: {err}"),
                }
            }
        }
    }

    if let Err(err) = std::fs::remove_file(&path) {
        debug!("could not remove control socket: {err}");
    }
    Ok(())
}

fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    // A stale socket from an earlier run blocks bind.
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    UnixListener::bind(path)
        .with_context(|| format!("failed to bind control socket {}", path.display()))
}

async fn serve(stream: UnixStream, to_driver: Sender<DisplayCommand>) -> Result<()> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_request(&line) {
            Ok(Some(cmd)) => {
                info!(?cmd, "control command");
                to_driver
                    .send(cmd.into())
                    .await
                    .context("driver no longer accepts commands")?;
            }
            Ok(None) => {}
            Err(err) => warn!("ignoring control request: {err:#}"),
        }
    }
    Ok(())
}
