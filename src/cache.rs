//! On-disk cache artifacts with dependency tracking.
//!
//! Next to every artifact sits `<artifact>.meta`, a bincode list of
//! [`ResourceStamp`]s for the source files the artifact was generated from.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::types::{FileResource, ResourceStamp};

/// Errors raised while reading or writing a cache artifact.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode cache metadata: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A cache artifact on disk and the metadata that decides its freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCache {
    path: PathBuf,
    debug: bool,
}

impl ConfigCache {
    /// `debug` additionally compares file contents when checking freshness.
    pub fn new(path: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            path: path.into(),
            debug,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn meta_path(&self) -> PathBuf {
        let mut meta = self.path.clone().into_os_string();
        meta.push(".meta");
        PathBuf::from(meta)
    }

    /// Whether the artifact exists and every recorded source is unchanged.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        if !self.path.is_file() {
            trace!(path = %self.path.display(), "no cache artifact");
            return false;
        }
        let Some(stamps) = self.read_meta() else {
            debug!(path = %self.path.display(), "cache metadata missing or unreadable");
            return false;
        };
        match stamps.iter().find(|s| !s.is_fresh(self.debug)) {
            Some(stale) => {
                debug!(resource = %stale.resource, "cache artifact is stale");
                false
            }
            None => true,
        }
    }

    /// Read the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file cannot be read.
    pub fn read(&self) -> Result<Vec<u8>, CacheError> {
        std::fs::read(&self.path).map_err(|e| CacheError::io(&self.path, e))
    }

    /// Atomically replace the artifact and record the state of `resources`.
    ///
    /// # Errors
    ///
    /// Fails if the cache directory cannot be written or a resource cannot
    /// be stamped.
    #[instrument(skip(self, content, resources), fields(path = %self.path.display(), bytes = content.len()))]
    pub fn write<'a, I>(&self, content: &[u8], resources: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = &'a FileResource>,
    {
        let stamps = resources
            .into_iter()
            .map(|r| r.stamp().map_err(|e| CacheError::io(r.path(), e)))
            .collect::<Result<Vec<_>, _>>()?;
        let meta = bincode::serde::encode_to_vec(&stamps, bincode::config::standard())?;

        write_atomic(&self.path, content)?;
        write_atomic(&self.meta_path(), &meta)?;
        debug!(resources = stamps.len(), "wrote cache artifact");
        Ok(())
    }

    fn read_meta(&self) -> Option<Vec<ResourceStamp>> {
        let bytes = std::fs::read(self.meta_path()).ok()?;
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .ok()
            .map(|(stamps, _)| stamps)
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CacheError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    file.write_all(content)
        .and_then(|()| file.flush())
        .map_err(|e| CacheError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}
