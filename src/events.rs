use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::metadata::ImageMetadata;

/// Where images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
    /// Public random-photo service; a fresh URL is synthesized per image.
    #[default]
    Direct,
    LocalFile,
    /// WebDAV share (Nextcloud and friends).
    RemoteShare,
}

impl SourceKind {
    const NAMES: &'static [&'static str] = &["picsum", "localdirectory", "nextcloud"];

    /// Local and remote sources are enumerated up front; direct URLs are not.
    pub fn is_listed(self) -> bool {
        !matches!(self, Self::Direct)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "picsum" | "direct" => Some(Self::Direct),
            "localdirectory" | "local" | "local-file" => Some(Self::LocalFile),
            "nextcloud" | "webdav" | "remote-share" => Some(Self::RemoteShare),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Direct => "picsum",
            Self::LocalFile => "localdirectory",
            Self::RemoteShare => "nextcloud",
        })
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match Self::parse(&raw) {
            Some(kind) => Ok(kind),
            None if raw.trim().is_empty() => Err(de::Error::unknown_variant(&raw, Self::NAMES)),
            None => {
                tracing::warn!(value = %raw, "unknown image-repository; using picsum");
                Ok(Self::Direct)
            }
        }
    }
}

/// One listed image. Identity is the opaque `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRecord {
    pub id: String,
    pub source_kind: SourceKind,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            source_kind,
        }
    }
}

/// Immutable listing snapshot; cloning shares the underlying records.
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    records: Arc<[ImageRecord]>,
}

impl ImageList {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn from_ids<I, S>(ids: I, source_kind: SourceKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter()
                .map(|id| ImageRecord::new(id, source_kind))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Next,
    Previous,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "next",
            Self::Previous => "previous",
        })
    }
}

/// Commands accepted by the display driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCommand {
    Advance(Direction),
    Pause,
    /// Resume automatic advancement. `respect_start_paused` mirrors the
    /// startup path, where `start-paused` keeps the driver paused.
    Resume { respect_start_paused: bool },
    Toggle,
    /// Re-list the source in the background and swap the snapshot when done.
    Refresh,
}

impl DisplayCommand {
    pub fn resume() -> Self {
        Self::Resume {
            respect_start_paused: false,
        }
    }
}

/// Image source as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Url(String),
    DataUri(String),
}

impl ImagePayload {
    pub fn as_src(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::DataUri(uri) => uri,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageReady {
    pub id: String,
    pub payload: ImagePayload,
    pub metadata: Option<ImageMetadata>,
}

/// Events emitted towards the presentation layer.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Ready(ImageReady),
    /// Run/pause state changed or the user navigated explicitly.
    StatusChanged {
        running: bool,
        navigated: Option<Direction>,
    },
    /// A listing or fetch failed; the driver keeps going.
    CycleFailed { reason: String },
}
