//! Error taxonomy for the engine.
//!
//! Each concern gets its own `thiserror` enum; [`EngineError`] rolls them all
//! up into one type so callers can match broadly or narrowly as they like.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// A target name was used before (or without) registration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("target {name:?} is not registered")]
    UnknownTarget { name: String },

    #[error("target {name:?} registered with an empty glob list")]
    EmptyGlobList { name: String },
}

/// Any unexpected filesystem failure during hash, promote, extract, or materialise.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IoError {
    #[error("io error at {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("path has no parent directory: {path}")]
    NoParent { path: PathBuf },

    #[error("path is not valid UTF-8: {path}")]
    NotUtf8 { path: PathBuf },

    #[error("path is not absolute: {path}")]
    NotAbsolute { path: PathBuf },

    #[error("could not determine a home/cwd-relative engine root")]
    NoEngineRoot,
}

/// Malformed archive, or an archive entry type the extractor doesn't understand.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unknown tar entry type {kind:?} at {path}")]
    UnknownTarEntryType { kind: String, path: String },

    #[error("failed to read archive entry {path}")]
    Entry {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open archive")]
    Open {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read zip archive")]
    Zip {
        #[source]
        source: zip::result::ZipError,
    },
}

/// Non-200 HTTP status, or a transport-level failure.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("GET {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("transport error fetching {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A user-supplied action signalled failure.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action for target {name:?} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// The umbrella error type returned by all public engine operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("failed to (de)serialize task records")]
    Records {
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        IoError::Io {
            context: context.into(),
            source,
        }
        .into()
    }
}
