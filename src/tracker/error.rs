//! Error types for the tracking core.

use thiserror::Error;

/// Errors surfaced by a tracker call.
///
/// A call that returns an error has not modified the tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Frames must arrive in strictly increasing index order.
    #[error("frame {frame} is not after the last processed frame {last}")]
    OutOfOrderFrame { frame: u64, last: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The innovation covariance of a track's filter could not be inverted.
    #[error("innovation covariance of track {track_id} is singular")]
    SingularInnovation { track_id: u64 },

    #[error("assignment solver failed: {0}")]
    Assignment(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
