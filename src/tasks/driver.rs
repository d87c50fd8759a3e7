//! Rotation/display driver: owns the listing snapshot, rotation state and
//! caches, and turns timer ticks and commands into display events.

use anyhow::{Context, Result, anyhow};
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::BoundedCache;
use crate::config::Configuration;
use crate::error::ListError;
use crate::events::{
    Direction, DisplayCommand, DisplayEvent, ImageList, ImagePayload, ImageReady,
};
use crate::geocode::Geocoder;
use crate::metadata::{self, ImageMetadata};
use crate::selector::Selector;
use crate::source::ImageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing shown yet; waiting for the first resume.
    Idle,
    Running,
    Paused,
}

enum Wake {
    Command(DisplayCommand),
    Listed(Result<Result<ImageList, ListError>, JoinError>),
    Tick,
    Refresh,
}

struct Session {
    cfg: Configuration,
    source: ImageSource,
    state: DriverState,
    selector: Selector,
    geocoder: Geocoder,
    metadata: BoundedCache<String, ImageMetadata>,
    images: ImageList,
    /// Pending advancement tick; `None` unless running.
    deadline: Option<Instant>,
    next_refresh: Option<Instant>,
    listing: JoinSet<Result<ImageList, ListError>>,
    first_listing: bool,
    events: Sender<DisplayEvent>,
}

/// Drive the rotation until cancelled.
///
/// Exactly one advancement cycle runs at a time: every handler is awaited to
/// completion before the next wake-up is considered. Listing runs on a
/// separate task so a slow repository never blocks commands or ticks.
#[instrument(skip_all, fields(kind = %cfg.image_repository))]
pub async fn run(
    cfg: Configuration,
    mut commands: Receiver<DisplayCommand>,
    events: Sender<DisplayEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut session = Session::new(cfg, events)?;
    session.start().await?;
    let mut commands_open = true;

    loop {
        let wake = select! {
            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv(), if commands_open => match maybe_cmd {
                Some(cmd) => Wake::Command(cmd),
                None => {
                    debug!("command channel closed; continuing on timer only");
                    commands_open = false;
                    continue;
                }
            },

            Some(joined) = session.listing.join_next() => Wake::Listed(joined),

            _ = sleep_until(session.deadline.unwrap_or_else(Instant::now)), if session.deadline.is_some() => Wake::Tick,

            _ = sleep_until(session.next_refresh.unwrap_or_else(Instant::now)), if session.next_refresh.is_some() => Wake::Refresh,
        };

        match cancel.run_until_cancelled(session.handle(wake)).await {
            None => break,
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!("driver stopping: {err:#}");
                break;
            }
        }
    }

    session.listing.abort_all();
    info!("driver stopped");
    Ok(())
}

impl Session {
    fn new(cfg: Configuration, events: Sender<DisplayEvent>) -> Result<Self> {
        let source = ImageSource::from_config(&cfg)?;
        let geocoder = Geocoder::new(&cfg.geocoder).context("failed to set up geocoder")?;
        let selector = Selector::new(cfg.rotation_mode(), cfg.rotation_seed);
        let metadata = BoundedCache::new(cfg.metadata_cache_size);
        let next_refresh = cfg
            .refresh_interval
            .filter(|_| source.kind().is_listed())
            .map(|every| Instant::now() + every);
        Ok(Self {
            cfg,
            source,
            state: DriverState::Idle,
            selector,
            geocoder,
            metadata,
            images: ImageList::default(),
            deadline: None,
            next_refresh,
            listing: JoinSet::new(),
            first_listing: true,
            events,
        })
    }

    /// List-based sources wait for their first listing; direct sources can
    /// start right away.
    async fn start(&mut self) -> Result<()> {
        if self.source.kind().is_listed() {
            self.spawn_listing();
            return Ok(());
        }
        self.first_listing = false;
        if self.cfg.start_hidden {
            debug!("start-hidden set; waiting for resume");
            return Ok(());
        }
        self.resume(true).await
    }

    async fn handle(&mut self, wake: Wake) -> Result<()> {
        match wake {
            Wake::Command(cmd) => self.on_command(cmd).await,
            Wake::Listed(joined) => self.on_listed(joined).await,
            Wake::Tick => {
                self.deadline = None;
                self.cycle(Direction::Next).await?;
                self.schedule();
                Ok(())
            }
            Wake::Refresh => {
                self.next_refresh = self.cfg.refresh_interval.map(|every| Instant::now() + every);
                self.refresh();
                Ok(())
            }
        }
    }

    async fn on_command(&mut self, cmd: DisplayCommand) -> Result<()> {
        debug!(?cmd, state = ?self.state, "command");
        match cmd {
            DisplayCommand::Advance(direction) => self.advance(direction).await,
            DisplayCommand::Pause => self.pause().await,
            DisplayCommand::Resume {
                respect_start_paused,
            } => self.resume(respect_start_paused).await,
            DisplayCommand::Toggle => {
                if self.state == DriverState::Running {
                    self.pause().await
                } else {
                    self.resume(false).await
                }
            }
            DisplayCommand::Refresh => {
                self.refresh();
                Ok(())
            }
        }
    }

    async fn on_listed(
        &mut self,
        joined: Result<Result<ImageList, ListError>, JoinError>,
    ) -> Result<()> {
        match joined {
            Err(err) => warn!("listing task failed: {err}"),
            Ok(Ok(images)) => {
                info!(count = images.len(), "image list updated");
                self.images = images;
                self.selector.reset();
            }
            Ok(Err(err)) => {
                warn!(reason = ?err.reason(), "listing failed: {err}");
                self.emit(DisplayEvent::CycleFailed {
                    reason: err.to_string(),
                })
                .await?;
            }
        }

        if std::mem::take(&mut self.first_listing) {
            if self.cfg.start_hidden {
                debug!("start-hidden set; waiting for resume");
            } else {
                self.resume(true).await?;
            }
        }
        Ok(())
    }

    fn refresh(&mut self) {
        if !self.source.kind().is_listed() {
            debug!("refresh ignored for direct source");
            return;
        }
        if !self.listing.is_empty() {
            debug!("listing already in flight");
            return;
        }
        self.spawn_listing();
    }

    fn spawn_listing(&mut self) {
        let source = self.source.clone();
        self.listing.spawn(async move { source.list().await });
    }

    async fn resume(&mut self, respect_start_paused: bool) -> Result<()> {
        if self.state == DriverState::Running {
            return Ok(());
        }
        self.state = if respect_start_paused && self.cfg.start_paused {
            DriverState::Paused
        } else {
            DriverState::Running
        };
        info!(state = ?self.state, "resuming");
        self.cycle(Direction::Next).await?;
        self.schedule();
        self.status(None).await
    }

    async fn pause(&mut self) -> Result<()> {
        self.deadline = None;
        if self.state == DriverState::Running {
            self.state = DriverState::Paused;
            info!("paused");
        }
        self.status(None).await
    }

    async fn advance(&mut self, direction: Direction) -> Result<()> {
        if direction == Direction::Previous && !self.cfg.allows_previous() {
            debug!("previous ignored outside sequential list rotation");
            return Ok(());
        }
        // While Idle this shows one image and leaves the state alone.
        self.deadline = None;
        self.cycle(direction).await?;
        self.schedule();
        self.status(Some(direction)).await
    }

    fn schedule(&mut self) {
        self.deadline = (self.state == DriverState::Running)
            .then(|| Instant::now() + self.cfg.update_interval);
    }

    /// Select, fetch, attach metadata and emit. Failures are reported to the
    /// display side and never end the driver; only a closed event channel does.
    async fn cycle(&mut self, direction: Direction) -> Result<()> {
        let listed_id = if self.source.kind().is_listed() {
            match self.selector.select(&self.images, direction) {
                Some(record) => Some(record.id.clone()),
                None => {
                    debug!("no images to show");
                    return Ok(());
                }
            }
        } else {
            None
        };

        let payload = match self.source.fetch(listed_id.as_deref().unwrap_or_default()).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(id = ?listed_id, reason = ?err.reason(), "fetch failed: {err}");
                return self
                    .emit(DisplayEvent::CycleFailed {
                        reason: err.to_string(),
                    })
                    .await;
            }
        };

        let id = match listed_id {
            Some(id) => id,
            None => match &payload {
                ImagePayload::Url(url) => url.clone(),
                ImagePayload::DataUri(_) => String::new(),
            },
        };
        let metadata = if self.cfg.wants_metadata() {
            Some(self.metadata_for(&id).await)
        } else {
            None
        };
        debug!(%id, "image ready");
        self.emit(DisplayEvent::Ready(ImageReady {
            id,
            payload,
            metadata,
        }))
        .await
    }

    async fn metadata_for(&mut self, id: &str) -> ImageMetadata {
        if let Some(hit) = self.metadata.get(&id.to_string()) {
            return hit.clone();
        }
        let meta = match self.source.local_path(id) {
            Some(path) => metadata::extract(path, &mut self.geocoder).await,
            None => ImageMetadata::default(),
        };
        if let Some(evicted) = self.metadata.put(id.to_string(), meta.clone()) {
            debug!(%evicted, "metadata cache evicted entry");
        }
        meta
    }

    async fn status(&mut self, navigated: Option<Direction>) -> Result<()> {
        if !self.cfg.show_status_icon {
            return Ok(());
        }
        self.emit(DisplayEvent::StatusChanged {
            running: self.state == DriverState::Running,
            navigated,
        })
        .await
    }

    async fn emit(&mut self, event: DisplayEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("display event channel closed"))
    }
}
