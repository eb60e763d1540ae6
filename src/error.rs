//! Crate-level error type.
//!
//! Every fallible operation in the library returns [`Result`]. The first three
//! variants and oversized archive entries are the user-recoverable conditions
//! a session turns into notices. The rest are store failures or wrap I/O and
//! codec errors from the ambient stack.

use thiserror::Error;

/// Errors produced by livepad operations.
#[derive(Debug, Error)]
pub enum LivepadError {
    /// The render target could not be reached; the render pass is skipped.
    #[error("preview unavailable: {0}")]
    RenderTargetUnavailable(String),

    /// An imported file's extension matches none of the recognised kinds.
    #[error("unsupported file format: {0}")]
    UnsupportedImportFormat(String),

    /// An action that needs a prior choice was invoked without one.
    #[error("please select a {0}")]
    MissingSelection(&'static str),

    /// No session is registered under the given code.
    #[error("session '{0}' not found")]
    UnknownSession(String),

    /// The session store lock was poisoned by a panicking holder.
    #[error("session store unavailable")]
    StoreUnavailable,

    /// An archive entry would decompress past the accepted size.
    #[error("archive entry '{name}' exceeds {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LivepadError {
    /// True for the conditions a user fixes by re-issuing the action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LivepadError::RenderTargetUnavailable(_)
                | LivepadError::UnsupportedImportFormat(_)
                | LivepadError::MissingSelection(_)
                | LivepadError::EntryTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LivepadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_selection_message() {
        let err = LivepadError::MissingSelection("conversion type");
        assert_eq!(err.to_string(), "please select a conversion type");
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = LivepadError::UnsupportedImportFormat("notes.txt".into());
        assert_eq!(err.to_string(), "unsupported file format: notes.txt");
    }

    #[test]
    fn test_recoverable_variants() {
        assert!(LivepadError::RenderTargetUnavailable("x".into()).is_recoverable());
        assert!(LivepadError::UnsupportedImportFormat("x".into()).is_recoverable());
        assert!(LivepadError::MissingSelection("x").is_recoverable());
        assert!(LivepadError::EntryTooLarge { name: "index.html".into(), limit: 1 }.is_recoverable());
        assert!(!LivepadError::UnknownSession("x".into()).is_recoverable());
        assert!(!LivepadError::StoreUnavailable.is_recoverable());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LivepadError = io.into();
        assert!(matches!(err, LivepadError::Io(_)));
    }
}
