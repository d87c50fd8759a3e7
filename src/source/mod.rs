//! Image repositories: listing and retrieval for each source kind.

pub mod direct;
pub mod local;
pub mod webdav;

use std::path::PathBuf;

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tracing::{info, instrument};

use crate::config::Configuration;
use crate::error::{FetchError, ListError};
use crate::events::{ImageList, ImagePayload, SourceKind};

pub use direct::DirectSource;
pub use local::LocalSource;
pub use webdav::RemoteShare;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_id(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

pub fn decode_id(id: &str) -> String {
    percent_decode_str(id).decode_utf8_lossy().into_owned()
}

/// One configured repository.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Direct(DirectSource),
    Local(LocalSource),
    Remote(RemoteShare),
}

impl ImageSource {
    pub fn from_config(cfg: &Configuration) -> Result<Self> {
        let source = match cfg.image_repository {
            SourceKind::Direct => Self::Direct(DirectSource::from_config(cfg)),
            SourceKind::LocalFile => Self::Local(
                LocalSource::from_config(&cfg.repository_config)
                    .context("failed to prepare local directory source")?,
            ),
            SourceKind::RemoteShare => Self::Remote(
                RemoteShare::from_config(&cfg.repository_config)
                    .context("failed to prepare remote share source")?,
            ),
        };
        Ok(source)
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Direct(_) => SourceKind::Direct,
            Self::Local(_) => SourceKind::LocalFile,
            Self::Remote(_) => SourceKind::RemoteShare,
        }
    }

    /// Enumerate the repository. Direct sources have nothing to enumerate.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn list(&self) -> Result<ImageList, ListError> {
        let ids = match self {
            Self::Direct(_) => Vec::new(),
            Self::Local(local) => {
                let local = local.clone();
                tokio::task::spawn_blocking(move || local.list())
                    .await
                    .map_err(|err| ListError::Network(format!("listing task failed: {err}")))??
            }
            Self::Remote(remote) => remote.list().await?,
        };
        info!(count = ids.len(), "repository listed");
        Ok(ImageList::from_ids(ids, self.kind()))
    }

    /// Retrieve one image. Direct sources ignore `id` and mint a fresh URL.
    pub async fn fetch(&self, id: &str) -> Result<ImagePayload, FetchError> {
        match self {
            Self::Direct(direct) => Ok(ImagePayload::Url(direct.next_url())),
            Self::Local(local) => local.fetch(id).await,
            Self::Remote(remote) => remote.fetch(id).await,
        }
    }

    /// Filesystem path behind `id`, for sources that have one.
    pub fn local_path(&self, id: &str) -> Option<PathBuf> {
        match self {
            Self::Local(_) => Some(PathBuf::from(decode_id(id))),
            Self::Direct(_) | Self::Remote(_) => None,
        }
    }
}
