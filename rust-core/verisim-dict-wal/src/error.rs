// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors that reach producers and operators. Corruption found while reading
// the log is deliberately absent: the reader turns it into a completeness
// flag instead of an error.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or writing a WAL segment file.
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization of a frame payload failed.
    #[error("JSON error in WAL payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Another live WAL instance holds the directory lock.
    #[error("WAL directory is already locked: {0}")]
    DirectoryLocked(String),

    /// The WAL directory does not exist or is not accessible.
    #[error("WAL directory not found or inaccessible: {0}")]
    DirectoryNotFound(String),

    /// The WAL has been closed; no further records are accepted.
    #[error("WAL is closed")]
    Closed,

    /// The background writer hit an unrecoverable I/O error. Every call made
    /// after the failure reports the same underlying error.
    #[error("WAL writer failure: {0}")]
    WriterFailed(#[source] Arc<io::Error>),

    /// A configuration value is out of range.
    #[error("invalid WAL configuration: {0}")]
    InvalidConfig(String),

    /// A frame payload exceeds the safety ceiling.
    #[error("frame payload of {length} bytes exceeds maximum {max_length}")]
    FrameTooLarge {
        /// Length of the offending payload.
        length: usize,
        /// The configured ceiling.
        max_length: usize,
    },
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file gone");
        let error = WalError::Io(io_error);
        let message = format!("{error}");
        assert!(message.contains("file gone"));
    }

    #[test]
    fn test_writer_failure_keeps_source() {
        let cause = Arc::new(io::Error::new(io::ErrorKind::Other, "disk full"));
        let error = WalError::WriterFailed(Arc::clone(&cause));
        assert!(format!("{error}").contains("disk full"));
        let source = std::error::Error::source(&error).expect("source");
        assert!(source.to_string().contains("disk full"));
    }

    #[test]
    fn test_error_display_frame_too_large() {
        let error = WalError::FrameTooLarge {
            length: 999_999_999,
            max_length: 536_870_912,
        };
        let message = format!("{error}");
        assert!(message.contains("999999999"));
        assert!(message.contains("536870912"));
    }
}
