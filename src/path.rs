//! Path newtypes tailored to the engine.
//!
//! The teacher (`hurry`) carries a four-way typestate path system (`Abs`/`Rel`
//! crossed with `File`/`Dir`) to serve a much larger surface area (remote CAS,
//! cross-compilation path algebra, cargo unit graphs). This engine only ever
//! deals in engine-root-relative absolute paths, so it keeps a single
//! [`AbsPath`] newtype instead. [`AbsFilePath`] and [`AbsDirPath`] are type
//! aliases: they document intent at call sites without adding a second type
//! parameter dimension nobody here needs.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{IoError, Result};

/// An absolute filesystem path.
///
/// Construction normalizes nothing; it only asserts the path is absolute.
/// Callers that need a path relative to the engine root go through
/// [`AbsPath::join`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AbsPath(PathBuf);

/// An absolute path that is expected (by convention, not enforcement) to name a file.
pub type AbsFilePath = AbsPath;
/// An absolute path that is expected (by convention, not enforcement) to name a directory.
pub type AbsDirPath = AbsPath;

impl AbsPath {
    /// Wrap an already-absolute path.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(IoError::NotAbsolute { path }.into());
        }
        Ok(Self(path))
    }

    /// Resolve `path` relative to the current working directory into an absolute path.
    pub fn from_cwd_relative(path: impl AsRef<Path>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| {
            crate::error::EngineError::io("get current directory", e)
        })?;
        Self::new(cwd.join(path))
    }

    pub fn as_std_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join a relative path segment onto this one.
    pub fn join(&self, segment: impl AsRef<Path>) -> Self {
        Self(self.0.join(segment))
    }

    /// The parent directory, if any.
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    /// The final path component as a string, if valid UTF-8.
    pub fn file_name_str(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }

    /// Compute `self` relative to `base`, returning the relative path.
    pub fn strip_prefix(&self, base: &Self) -> Option<PathBuf> {
        self.0.strip_prefix(&base.0).ok().map(Path::to_path_buf)
    }
}

impl fmt::Display for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl fmt::Debug for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl AsRef<Path> for AbsPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
