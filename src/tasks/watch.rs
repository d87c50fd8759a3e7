//! Filesystem watcher for local repositories. Bursts of changes collapse
//! into a single refresh request.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::events::DisplayCommand;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Whether an event changes what a listing would return.
pub fn affects_listing(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any)
            | EventKind::Remove(RemoveKind::File | RemoveKind::Folder | RemoveKind::Any)
            | EventKind::Modify(ModifyKind::Name(_))
    )
}

#[instrument(skip(to_driver, cancel), fields(root = %root.display()))]
pub async fn run(
    root: PathBuf,
    recursive: bool,
    debounce: Duration,
    to_driver: Sender<DisplayCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })
    .context("failed to create filesystem watcher")?;
    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(&root, mode)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    info!(recursive, "watching image directory");

    let mut pending: Option<Instant> = None;
    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(res) = watch_rx.recv() => match res {
                Ok(event) if affects_listing(&event.kind) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "directory changed");
                    pending = Some(Instant::now() + debounce);
                }
                Ok(event) => debug!(kind = ?event.kind, "fs: ignored"),
                Err(err) => error!("watch error: {err}"),
            },

            _ = sleep_until(pending.unwrap_or_else(Instant::now)), if pending.is_some() => {
                pending = None;
                info!("directory contents changed; requesting refresh");
                if to_driver.send(DisplayCommand::Refresh).await.is_err() {
                    debug!("driver gone; stopping watcher");
                    break;
                }
            }
        }
    }
    Ok(())
}
