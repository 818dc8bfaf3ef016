//! Unified error handling for the foiltrack library.
//!
//! Only the storage and session layers can fail. Motion estimation and
//! aggregation are infallible, and malformed rows in a persisted run are
//! reported as skipped rows rather than errors.

use thiserror::Error;

/// Unified error type for foiltrack operations.
#[derive(Debug, Error)]
pub enum FoilTrackError {
    /// Filesystem failure while reading or writing a run
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoder/decoder failure (not a single malformed row)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// SQLite failure in the structured run store
    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Run identifier is not a `yyMMddHHmm` stamp
    #[error("Invalid run id '{id}': {message}")]
    InvalidRunId { id: String, message: String },

    /// A recording session is already active
    #[error("Run '{run_id}' is already being recorded")]
    AlreadyRecording { run_id: String },

    /// Operation requires an active recording session
    #[error("No run is being recorded")]
    NotRecording,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for foiltrack operations.
pub type Result<T> = std::result::Result<T, FoilTrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FoilTrackError::InvalidRunId {
            id: "abc".to_string(),
            message: "expected 10 digits".to_string(),
        };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("10 digits"));
    }

    #[test]
    fn test_io_conversion() {
        fn open_missing() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/definitely/not/here.csv")?)
        }
        assert!(matches!(open_missing(), Err(FoilTrackError::Io(_))));
    }

    #[test]
    fn test_recording_state_messages() {
        let err = FoilTrackError::AlreadyRecording {
            run_id: "2405011030".to_string(),
        };
        assert!(err.to_string().contains("2405011030"));
        assert_eq!(FoilTrackError::NotRecording.to_string(), "No run is being recorded");
    }
}
