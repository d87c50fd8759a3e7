use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::RepositoryConfig;
use crate::error::{FetchError, ListError};
use crate::events::ImagePayload;

use super::{decode_id, encode_id};

/// Local files are served with a fixed content type; browsers sniff the rest.
const LOCAL_CONTENT_TYPE: &str = "image/jpeg";

/// Directory tree on this machine.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    recursive: bool,
    exclude: Vec<Regex>,
}

impl LocalSource {
    pub fn from_config(cfg: &RepositoryConfig) -> Result<Self> {
        Ok(Self::new(
            expand_home(cfg.path.trim()),
            cfg.recursive,
            cfg.exclude_patterns()?,
        ))
    }

    pub fn new(root: impl Into<PathBuf>, recursive: bool, exclude: Vec<Regex>) -> Self {
        Self {
            root: root.into(),
            recursive,
            exclude,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Walk the root and return encoded absolute paths, sorted by file name
    /// within each directory.
    ///
    /// Excluded entries are pruned together with their subtree. There is no
    /// type filtering: every remaining file is listed.
    ///
    /// # Errors
    /// [`ListError::PathNotFound`] when the root is missing or not a
    /// directory, [`ListError::Empty`] when nothing survives the walk.
    pub fn list(&self) -> Result<Vec<String>, ListError> {
        let root = self
            .root
            .canonicalize()
            .map_err(|_| ListError::PathNotFound(self.root.clone()))?;
        if !root.is_dir() {
            return Err(ListError::PathNotFound(self.root.clone()));
        }

        let mut walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .min_depth(1);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut ids = Vec::new();
        for entry in walker.into_iter().filter_entry(|e| !self.is_excluded(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                ids.push(encode_id(&entry.path().to_string_lossy()));
            }
        }

        if ids.is_empty() {
            return Err(ListError::Empty(root.display().to_string()));
        }
        Ok(ids)
    }

    // The root itself is never matched against the patterns.
    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        self.exclude.iter().any(|re| re.is_match(&name))
    }

    pub async fn fetch(&self, id: &str) -> Result<ImagePayload, FetchError> {
        let path = PathBuf::from(decode_id(id));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "read local image");
        Ok(ImagePayload::DataUri(format!(
            "data:{LOCAL_CONTENT_TYPE};base64,{}",
            STANDARD.encode(bytes)
        )))
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(raw)
}
