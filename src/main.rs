//! Binary entrypoint for random-photo.
//!
//! Wires the driver to its command sources and logs what it would show.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use random_photo::config::Configuration;
use random_photo::events::{DisplayCommand, DisplayEvent, SourceKind};
use random_photo::source::{ImageSource, LocalSource, decode_id};
use random_photo::tasks;

#[derive(Debug, Parser)]
#[command(
    name = "random-photo",
    version,
    about = "Rotating image source with EXIF metadata overlays"
)]
struct Args {
    /// Path to YAML config file
    #[arg(value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// List the configured repository and exit
    #[arg(long)]
    list_only: bool,

    /// Seed for random rotation (overrides rotation-seed)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info").add_directive(
            format!("random_photo={level}")
                .parse()
                .context("invalid log directive")?,
        ),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        list_only,
        seed,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if seed.is_some() {
        cfg.rotation_seed = seed;
    }
    info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    if list_only {
        return print_listing(&cfg).await;
    }

    let (cmd_tx, cmd_rx) = mpsc::channel::<DisplayCommand>(16); // Control/signals/watcher -> Driver
    let (event_tx, mut event_rx) = mpsc::channel::<DisplayEvent>(16); // Driver -> Display

    let cancel = CancellationToken::new();

    // Ctrl-D/Ctrl-C stop everything
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => info!("stdin closed; initiating shutdown"),
                Err(err) => warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = cmd_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            info!("SIGUSR1 received; toggling rotation");
                            if let Err(err) = control.send(DisplayCommand::Toggle).await {
                                warn!("failed to forward toggle request: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    if let Some(path) = cfg.control_socket_path.clone() {
        let to_driver = cmd_tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            tasks::control::run(path, to_driver, cancel)
                .await
                .context("control task failed")
        });
    }

    if cfg.image_repository == SourceKind::LocalFile && cfg.repository_config.watch {
        let local = LocalSource::from_config(&cfg.repository_config)?;
        let to_driver = cmd_tx.clone();
        let cancel = cancel.clone();
        let root = local.root().to_path_buf();
        let recursive = local.recursive();
        tasks.spawn(async move {
            tasks::watch::run(
                root,
                recursive,
                tasks::watch::DEFAULT_DEBOUNCE,
                to_driver,
                cancel,
            )
            .await
            .context("watch task failed")
        });
    }

    tasks.spawn({
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        async move {
            tasks::driver::run(cfg, cmd_rx, event_tx, cancel)
                .await
                .context("driver task failed")
        }
    });
    drop(cmd_tx);

    // Stand-in display: report what would be shown.
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("{err:#}"),
            Err(err) => warn!("task join error: {err}"),
        }
    }
    Ok(())
}

fn log_event(event: &DisplayEvent) {
    match event {
        DisplayEvent::Ready(ready) => {
            let src = ready.payload.as_src();
            let preview: String = src.chars().take(64).collect();
            info!(id = %decode_id(&ready.id), src = %preview, bytes = src.len(), "showing image");
            if let Some(meta) = &ready.metadata {
                for line in meta.overlay_lines() {
                    info!(overlay = %line, "metadata");
                }
            }
        }
        DisplayEvent::StatusChanged { running, navigated } => {
            info!(running, navigated = ?navigated, "status changed");
        }
        DisplayEvent::CycleFailed { reason } => warn!(%reason, "cycle failed"),
    }
}

async fn print_listing(cfg: &Configuration) -> Result<()> {
    let source = ImageSource::from_config(cfg)?;
    if !source.kind().is_listed() {
        println!("{} sources synthesize a new URL per image; nothing to list", source.kind());
        return Ok(());
    }
    let images = source
        .list()
        .await
        .with_context(|| format!("failed to list {} repository", source.kind()))?;
    for record in images.iter() {
        println!("{}", decode_id(&record.id));
    }
    info!(count = images.len(), "listing complete");
    Ok(())
}
