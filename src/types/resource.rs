use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// A source file a [`RuleCollection`](super::RuleCollection) was built from.
///
/// Used to decide whether a cached artifact still reflects its sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capture the current state of the file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn stamp(&self) -> std::io::Result<ResourceStamp> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(ResourceStamp {
            resource: self.clone(),
            modified: modified_since_epoch(&metadata),
            len: metadata.len(),
            digest: self.digest()?,
        })
    }

    fn digest(&self) -> std::io::Result<[u8; 32]> {
        let contents = std::fs::read(&self.path)?;
        Ok(*blake3::hash(&contents).as_bytes())
    }
}

fn modified_since_epoch(metadata: &std::fs::Metadata) -> Option<(u64, u32)> {
    metadata.modified().ok().and_then(|t| {
        t.duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| (d.as_secs(), d.subsec_nanos()))
    })
}

impl fmt::Display for FileResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The recorded signature of a [`FileResource`] at cache-write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStamp {
    pub resource: FileResource,
    /// Modification time as `(seconds, nanoseconds)` since the Unix epoch.
    pub modified: Option<(u64, u32)>,
    pub len: u64,
    /// BLAKE3 digest of the file contents.
    pub digest: [u8; 32],
}

impl ResourceStamp {
    /// Whether the file still matches this stamp.
    ///
    /// Modification time and length are always compared. With `verify_contents`
    /// the content digest must match as well; the file is only read then.
    /// A missing file is never fresh.
    #[must_use]
    pub fn is_fresh(&self, verify_contents: bool) -> bool {
        let Ok(metadata) = std::fs::metadata(self.resource.path()) else {
            return false;
        };
        if modified_since_epoch(&metadata) != self.modified || metadata.len() != self.len {
            return false;
        }
        !verify_contents
            || self
                .resource
                .digest()
                .is_ok_and(|digest| digest == self.digest)
    }
}
