//! Loading rule collections from files.
//!
//! [`DelegatingLoader`] is the [`Loader`] an engine normally owns. It
//! resolves resource names with a [`FileLocator`], hands each file to the
//! first [`FormatLoader`] that accepts it, and follows imports between files.

mod xml;
mod yaml;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

pub use xml::XmlFileLoader;
pub use yaml::YamlFileLoader;

use crate::RuleCollection;

/// Errors raised while loading a rule collection.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file \"{resource}\" not found (searched: {})", join_paths(.searched))]
    NotFound {
        resource: String,
        searched: Vec<PathBuf>,
    },

    #[error("failed to read \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("the file \"{}\" is not valid YAML: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("the file \"{}\" is not valid XML: {source}", .path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("{message}")]
    Invalid { path: PathBuf, message: String },

    #[error("no loader supports the resource \"{resource}\"{}", kind_suffix(.kind.as_deref()))]
    UnsupportedResource {
        resource: String,
        kind: Option<String>,
    },

    #[error("circular import detected: {}", join_paths(.chain))]
    CircularImport { chain: Vec<PathBuf> },
}

impl LoadError {
    pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" > ")
}

fn kind_suffix(kind: Option<&str>) -> String {
    kind.map(|k| format!(" of type \"{k}\"")).unwrap_or_default()
}

/// Produces a [`RuleCollection`] from a resource identifier.
///
/// Implementations record every file they read on the returned collection
/// with [`RuleCollection::add_resource`].
pub trait Loader {
    fn supports(&self, resource: &str, kind: Option<&str>) -> bool;

    /// # Errors
    ///
    /// Fails on missing or malformed input. No partial collection is returned.
    fn load(&self, resource: &str, kind: Option<&str>) -> Result<RuleCollection, LoadError>;
}

/// A loader for one file format, driven by [`DelegatingLoader`].
pub trait FormatLoader: Send + Sync {
    fn supports(&self, resource: &str, kind: Option<&str>) -> bool;

    /// Load an already located file. Imports go back through `importer`.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed files and on failed imports.
    fn load_file(
        &self,
        path: &Path,
        importer: &mut Importer<'_>,
    ) -> Result<RuleCollection, LoadError>;
}

/// Finds resource files on disk.
#[derive(Debug, Clone, Default)]
pub struct FileLocator {
    paths: Vec<PathBuf>,
}

impl FileLocator {
    /// A locator that falls back to the given directories, in order.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Resolve `name` to an existing file.
    ///
    /// Absolute names are used as-is. Relative names are tried against
    /// `current_dir` first, then each search path.
    ///
    /// # Errors
    ///
    /// [`LoadError::NotFound`] listing every candidate tried.
    pub fn locate(&self, name: &str, current_dir: Option<&Path>) -> Result<PathBuf, LoadError> {
        let not_found = |searched| LoadError::NotFound {
            resource: name.to_owned(),
            searched,
        };
        if name.is_empty() {
            return Err(not_found(Vec::new()));
        }

        let requested = Path::new(name);
        if requested.is_absolute() {
            return if requested.is_file() {
                Ok(requested.to_path_buf())
            } else {
                Err(not_found(vec![requested.to_path_buf()]))
            };
        }

        let candidates: Vec<PathBuf> = current_dir
            .into_iter()
            .chain(self.paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(requested))
            .collect();
        match candidates.iter().find(|c| c.is_file()) {
            Some(found) => Ok(found.clone()),
            None => Err(not_found(candidates)),
        }
    }
}

/// The default [`Loader`]: locates files and dispatches on format.
pub struct DelegatingLoader {
    locator: FileLocator,
    formats: Vec<Box<dyn FormatLoader>>,
}

impl DelegatingLoader {
    /// A loader for YAML and XML rule files.
    #[must_use]
    pub fn new(locator: FileLocator) -> Self {
        let mut loader = Self::without_formats(locator);
        loader.add_format(Box::new(YamlFileLoader));
        loader.add_format(Box::new(XmlFileLoader));
        loader
    }

    #[must_use]
    pub fn without_formats(locator: FileLocator) -> Self {
        Self {
            locator,
            formats: Vec::new(),
        }
    }

    /// Formats are tried in the order they were added.
    pub fn add_format(&mut self, format: Box<dyn FormatLoader>) {
        self.formats.push(format);
    }

    #[must_use]
    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    fn format_for(&self, resource: &str, kind: Option<&str>) -> Option<&Box<dyn FormatLoader>> {
        self.formats.iter().find(|f| f.supports(resource, kind))
    }
}

impl Loader for DelegatingLoader {
    fn supports(&self, resource: &str, kind: Option<&str>) -> bool {
        self.format_for(resource, kind).is_some()
    }

    fn load(&self, resource: &str, kind: Option<&str>) -> Result<RuleCollection, LoadError> {
        let collection = Importer::new(self).import(resource, kind, None)?;
        debug!(
            resource,
            rules = collection.len(),
            files = collection.resources().len(),
            "loaded rule collection"
        );
        Ok(collection)
    }
}

impl fmt::Debug for DelegatingLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingLoader")
            .field("locator", &self.locator)
            .field("formats", &self.formats.len())
            .finish()
    }
}

/// Import state for one top-level load: tracks the chain of files being
/// loaded so a file that imports itself is reported instead of recursing.
pub struct Importer<'a> {
    loader: &'a DelegatingLoader,
    stack: Vec<PathBuf>,
}

impl<'a> Importer<'a> {
    fn new(loader: &'a DelegatingLoader) -> Self {
        Self {
            loader,
            stack: Vec::new(),
        }
    }

    /// Load `resource`, resolved relative to `current_dir` when given.
    ///
    /// # Errors
    ///
    /// Fails when the resource cannot be located, no format supports it,
    /// it is already being imported, or its format loader fails.
    pub fn import(
        &mut self,
        resource: &str,
        kind: Option<&str>,
        current_dir: Option<&Path>,
    ) -> Result<RuleCollection, LoadError> {
        let loader = self.loader;
        let path = loader.locator.locate(resource, current_dir)?;
        let format = loader
            .format_for(resource, kind)
            .ok_or_else(|| LoadError::UnsupportedResource {
                resource: resource.to_owned(),
                kind: kind.map(str::to_owned),
            })?;

        let canonical = path.canonicalize().map_err(|e| LoadError::io(&path, e))?;
        if self.stack.contains(&canonical) {
            let mut chain = self.stack.clone();
            chain.push(canonical);
            return Err(LoadError::CircularImport { chain });
        }

        trace!(path = %path.display(), depth = self.stack.len(), "importing");
        self.stack.push(canonical);
        let result = format.load_file(&path, self);
        self.stack.pop();
        result
    }
}

/// Read a file to a string, mapping failures onto [`LoadError::Io`].
pub(crate) fn read_source(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))
}

/// Parent directory of a located file, for resolving its imports.
pub(crate) fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Whether `resource` ends with one of `extensions` (without the dot).
pub(crate) fn has_extension(resource: &str, extensions: &[&str]) -> bool {
    Path::new(resource)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn locate_prefers_current_dir() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("rules.yml"), "").unwrap();
        fs::write(second.path().join("rules.yml"), "").unwrap();

        let locator = FileLocator::new([second.path()]);
        assert_eq!(
            locator.locate("rules.yml", Some(first.path())).unwrap(),
            first.path().join("rules.yml")
        );
        assert_eq!(
            locator.locate("rules.yml", None).unwrap(),
            second.path().join("rules.yml")
        );
    }

    #[test]
    fn locate_reports_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let locator = FileLocator::new([dir.path()]);
        match locator.locate("missing.yml", None) {
            Err(LoadError::NotFound { resource, searched }) => {
                assert_eq!(resource, "missing.yml");
                assert_eq!(searched, vec![dir.path().join("missing.yml")]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn locate_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("r.xml");
        fs::write(&file, "<rules/>").unwrap();
        let locator = FileLocator::default();
        assert_eq!(locator.locate(file.to_str().unwrap(), None).unwrap(), file);
    }

    #[test]
    fn unsupported_resource() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rules.ini"), "").unwrap();
        let loader = DelegatingLoader::new(FileLocator::new([dir.path()]));
        assert!(!loader.supports("rules.ini", None));
        let err = loader.load("rules.ini", None).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedResource { .. }));
        assert_eq!(
            err.to_string(),
            "no loader supports the resource \"rules.ini\""
        );
    }

    #[test]
    fn kind_must_match_format() {
        let loader = DelegatingLoader::new(FileLocator::default());
        assert!(loader.supports("rules.yml", Some("yaml")));
        assert!(!loader.supports("rules.yml", Some("xml")));
        assert!(loader.supports("rules.xml", None));
    }

    #[test]
    fn circular_import_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yml"), "b:\n  resource: b.yml\n").unwrap();
        fs::write(dir.path().join("b.yml"), "a:\n  resource: a.yml\n").unwrap();
        let loader = DelegatingLoader::new(FileLocator::new([dir.path()]));
        let err = loader.load("a.yml", None).unwrap_err();
        match err {
            LoadError::CircularImport { chain } => assert_eq!(chain.len(), 3),
            other => panic!("expected CircularImport, got {other:?}"),
        }
    }

    #[test]
    fn extension_check() {
        assert!(has_extension("a/b.yaml", &["yml", "yaml"]));
        assert!(!has_extension("a/b.yaml.bak", &["yml", "yaml"]));
        assert!(!has_extension("noext", &["yml"]));
    }
}
