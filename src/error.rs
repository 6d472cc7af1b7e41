//! Error types for the playback engine.
//!
//! Failures fall into two groups. Catalog failures (lookup, download, local
//! file handling) are recovered by the playback loop, which skips the bad
//! entry and keeps the session going. Everything else is reported to the
//! caller, which decides whether to retry.

use thiserror::Error;

/// Result type used across the engine.
pub type MusicResult<T> = Result<T, MusicError>;

#[derive(Error, Debug)]
pub enum MusicError {
    /// The resolver found nothing for a query or id.
    #[error("no match found for '{0}'")]
    NotFound(String),

    /// The resolver was reachable but the lookup failed.
    #[error("metadata lookup failed: {0}")]
    Resolution(String),

    /// Fetching the audio for an external id failed.
    #[error("download failed for {id}: {reason}")]
    Download { id: String, reason: String },

    /// Joining a channel or starting output failed.
    #[error("voice transport error: {0}")]
    Transport(String),

    #[error("index {index} is out of range for a queue of {len} songs")]
    OutOfRange { index: usize, len: usize },

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MusicError {
    /// Whether the playback loop should skip the current entry and continue.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            MusicError::NotFound(_)
                | MusicError::Resolution(_)
                | MusicError::Download { .. }
                | MusicError::Io(_)
        )
    }
}

impl From<serde_json::Error> for MusicError {
    fn from(err: serde_json::Error) -> Self {
        MusicError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_failures_are_skippable() {
        assert!(MusicError::NotFound("lofi".into()).is_skippable());
        assert!(MusicError::Download {
            id: "abc".into(),
            reason: "403".into()
        }
        .is_skippable());
        assert!(!MusicError::Transport("handshake".into()).is_skippable());
        assert!(!MusicError::NotConnected.is_skippable());
        assert!(!MusicError::OutOfRange { index: 4, len: 2 }.is_skippable());
    }

    #[test]
    fn out_of_range_message_names_bounds() {
        let err = MusicError::OutOfRange { index: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "index 7 is out of range for a queue of 3 songs"
        );
    }
}
