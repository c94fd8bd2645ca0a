//! # herdtrack-rs
//!
//! Multi-object tracker for animals in video, built on the ByteTrack idea of
//! associating every detection box: high-confidence detections are matched
//! first, low-confidence ones recover tracks the first pass missed, and lost
//! tracks get a final appearance-weighted chance to reclaim their identity.
//!
//! ## Example
//!
//! ```rust,ignore
//! use herdtrack_rs::{ByteTracker, Detection, TrackerConfig};
//!
//! let mut tracker = ByteTracker::new(TrackerConfig::default())?;
//! let dets = vec![Detection::new(100.0, 100.0, 200.0, 180.0, 0.9)];
//! let confirmed = tracker.update(0, dets)?;
//! ```

pub mod integration;
pub mod tracker;

pub use integration::{
    DetectionBuilder, DetectionSource, IdentityLookup, IdentityMatch, IntoDetections,
    PipelineError, TrackerPipeline,
};
pub use tracker::{
    ByteTracker, Detection, Rect, Result, Track, TrackRegistry, TrackSnapshot, TrackState,
    TrackerConfig, TrackerError, TrackerStats,
};
