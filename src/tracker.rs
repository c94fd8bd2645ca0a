mod byte_tracker;
mod error;
mod kalman_filter;
mod matching;
mod rect;
mod registry;
mod track;
mod track_state;

pub use byte_tracker::{ByteTracker, TrackerConfig, TrackerStats};
pub use error::{Result, TrackerError};
pub use kalman_filter::KalmanFilter;
pub use matching::{
    AssignmentResult, Association, Detection, associate, cosine_distance, iou_distance,
    linear_assignment,
};
pub use rect::{Rect, iou_batch};
pub use registry::TrackRegistry;
pub use track::{Track, TrackId, TrackSnapshot};
pub use track_state::TrackState;
