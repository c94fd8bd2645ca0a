//! Integration module for connecting the tracker to its external collaborators.
//!
//! Detection, appearance embedding and cross-video re-identification all live
//! outside this crate; this module defines the traits they plug in through
//! and a pipeline that drives a detector and the tracker together.

mod builder;
mod detector;
mod identity;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections};
pub use identity::{IdentityLookup, IdentityMatch};
pub use pipeline::{PipelineError, TrackerPipeline};
