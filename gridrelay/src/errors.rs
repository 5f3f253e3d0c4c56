use std::fmt;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Document store could not be reached during startup
    #[error("Failed to connect to document store at {target}: {message}")]
    Connection { target: String, message: String },

    /// Store cursor failed while enumerating records
    #[error("Failed to read next record from store: {source}")]
    Cursor {
        #[source]
        source: anyhow::Error,
    },

    /// Stored document lacks a usable `_id` or `filename`
    #[error("Malformed stored record: {message}")]
    Decode { message: String },

    /// Object bytes could not be fetched
    #[error("Failed to download object {id}: {source}")]
    Download {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write temp file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read temp file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote object could not be removed from the store
    #[error("Failed to delete object {id}: {source}")]
    DeleteObject {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to remove temp file {}: {source}", .path.display())]
    RemoveTempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filename does not follow `<brand>_<web id>?<phone>?<description>?<complications>`
    #[error("Filename '{filename}' is not a listing filename: {reason}")]
    MetadataFormat { filename: String, reason: String },

    /// Messaging API rejected or failed a send
    #[error("Failed to {operation}: {message}")]
    Send { operation: String, message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

/// Error taxonomy used for logging and the skip-or-abort decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Decode,
    Download,
    Write,
    Read,
    Delete,
    MetadataFormat,
    Send,
    Config,
}

impl ErrorKind {
    /// Whether the failure belongs to a single record, leaving the rest of the batch usable.
    pub fn is_record_scoped(self) -> bool {
        !matches!(self, ErrorKind::Connection | ErrorKind::Config)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Decode => "decode",
            ErrorKind::Download => "download",
            ErrorKind::Write => "write",
            ErrorKind::Read => "read",
            ErrorKind::Delete => "delete",
            ErrorKind::MetadataFormat => "metadata_format",
            ErrorKind::Send => "send",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } | Error::Cursor { .. } => ErrorKind::Connection,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Download { .. } => ErrorKind::Download,
            Error::Write { .. } => ErrorKind::Write,
            Error::Read { .. } => ErrorKind::Read,
            Error::DeleteObject { .. } | Error::RemoveTempFile { .. } => ErrorKind::Delete,
            Error::MetadataFormat { .. } => ErrorKind::MetadataFormat,
            Error::Send { .. } => ErrorKind::Send,
            Error::Config { .. } => ErrorKind::Config,
        }
    }
}

/// Type alias for relay operation results
pub type Result<T> = std::result::Result<T, Error>;
