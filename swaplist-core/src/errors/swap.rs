//! Recombination error types
//!
//! A closed set of failure kinds for the swap engine. Fatal kinds abort a
//! whole merge job; recoverable kinds describe a single playlist entry that
//! is logged and skipped while the job continues.
//!
//! # Examples
//!
//! ```rust
//! use swaplist::errors::SwapError;
//!
//! let err = SwapError::EmptyPlaylist;
//! assert!(err.is_fatal());
//!
//! let err = SwapError::MissingDocument("Metadata/slice_info.config".into());
//! assert!(err.is_recoverable());
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while recombining project archives
#[derive(Error, Debug)]
pub enum SwapError {
    /// The playlist handed to the engine has no entries
    #[error("Playlist is empty")]
    EmptyPlaylist,

    /// A playlist entry could not be parsed or violates its constraints
    #[error("Invalid playlist entry '{entry}': {reason}")]
    InvalidPlaylistEntry { entry: String, reason: String },

    /// A source is not a readable zip container
    #[error("Malformed archive {path}: {reason}")]
    MalformedArchive { path: PathBuf, reason: String },

    /// An expected file is absent from an extracted archive
    #[error("Missing document: {0}")]
    MissingDocument(PathBuf),

    /// A statistics document has no section for the requested plate
    #[error("No plate section with index {index} in {path}")]
    IndexMismatch { path: PathBuf, index: String },

    /// A document exists but cannot be parsed
    #[error("Unreadable source {path}: {reason}")]
    UnreadableSource { path: PathBuf, reason: String },

    /// None of the playlist entries yielded a usable statistics document
    #[error("No parsable slice statistics found in any playlist entry")]
    NoStatistics,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwapError {
    pub fn malformed_archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SwapError::MalformedArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SwapError::UnreadableSource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        SwapError::InvalidPlaylistEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort the whole job
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwapError::EmptyPlaylist
                | SwapError::InvalidPlaylistEntry { .. }
                | SwapError::MalformedArchive { .. }
                | SwapError::NoStatistics
                | SwapError::Io(_)
        )
    }

    /// Errors that only skip the entry they describe
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SwapError::MissingDocument(_)
                | SwapError::IndexMismatch { .. }
                | SwapError::UnreadableSource { .. }
        )
    }

    /// Stable code for callers that map failures onto their own responses
    pub fn error_code(&self) -> &'static str {
        match self {
            SwapError::EmptyPlaylist => "EMPTY_PLAYLIST",
            SwapError::InvalidPlaylistEntry { .. } => "INVALID_PLAYLIST_ENTRY",
            SwapError::MalformedArchive { .. } => "MALFORMED_ARCHIVE",
            SwapError::MissingDocument(_) => "MISSING_DOCUMENT",
            SwapError::IndexMismatch { .. } => "INDEX_MISMATCH",
            SwapError::UnreadableSource { .. } => "UNREADABLE_SOURCE",
            SwapError::NoStatistics => "NO_STATISTICS",
            SwapError::Io(_) => "IO_ERROR",
        }
    }
}
