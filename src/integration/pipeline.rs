//! TrackerPipeline for combining detection with tracking.

use thiserror::Error;

use crate::tracker::{ByteTracker, TrackId, TrackSnapshot, TrackerConfig, TrackerError};

use super::{DetectionSource, IdentityLookup, IdentityMatch};

/// Errors from a pipeline call.
#[derive(Error, Debug)]
pub enum PipelineError<E> {
    #[error("detection failed: {0:?}")]
    Detector(E),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("identity lookup failed: {0}")]
    Identity(String),
}

/// A combined tracker that bundles detection inference with the tracker.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    tracker: ByteTracker,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    /// Create a new tracking pipeline with the given detector and tracker config.
    pub fn new(detector: D, config: TrackerConfig) -> Result<Self, TrackerError> {
        Ok(Self {
            detector,
            tracker: ByteTracker::new(config)?,
        })
    }

    /// Create a new tracking pipeline with default tracker configuration.
    pub fn with_default_config(detector: D) -> Result<Self, TrackerError> {
        Self::new(detector, TrackerConfig::default())
    }

    /// Run detection on one frame and feed the result to the tracker.
    ///
    /// Returns the confirmed tracks after the frame. A detector failure leaves
    /// the tracker untouched.
    pub fn process_frame(
        &mut self,
        frame_idx: u64,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<TrackSnapshot>, PipelineError<D::Error>> {
        let detections = self
            .detector
            .detect(input, width, height)
            .map_err(PipelineError::Detector)?;
        Ok(self.tracker.update(frame_idx, detections)?)
    }

    /// Ask `lookup` who each confirmed track is, using its smoothed embedding.
    ///
    /// Tracks without an embedding are skipped, as are tracks the service
    /// does not recognise.
    pub fn identify<L>(
        &self,
        lookup: &mut L,
    ) -> Result<Vec<(TrackId, IdentityMatch)>, PipelineError<D::Error>>
    where
        L: IdentityLookup,
        L::Error: std::fmt::Display,
    {
        let mut identified = Vec::new();
        for track in self.tracker.active_tracks() {
            let Some(feature) = track.feature() else {
                continue;
            };
            if let Some(found) = lookup
                .lookup(feature)
                .map_err(|e| PipelineError::Identity(e.to_string()))?
            {
                identified.push((track.track_id, found));
            }
        }
        Ok(identified)
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &ByteTracker {
        &self.tracker
    }

    /// Get a mutable reference to the underlying tracker.
    pub fn tracker_mut(&mut self) -> &mut ByteTracker {
        &mut self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Detection;

    struct MockDetector {
        detections: Vec<Detection>,
        fail: bool,
    }

    impl DetectionSource for MockDetector {
        type Error = String;

        fn detect(
            &mut self,
            _input: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<Detection>, Self::Error> {
            if self.fail {
                return Err("camera offline".into());
            }
            Ok(self.detections.clone())
        }
    }

    struct SingleCow;

    impl IdentityLookup for SingleCow {
        type Error = std::convert::Infallible;

        fn lookup(&mut self, embedding: &[f32]) -> Result<Option<IdentityMatch>, Self::Error> {
            Ok((embedding[0] > 0.5).then(|| IdentityMatch {
                identity_id: "cow-17".into(),
                similarity: embedding[0],
            }))
        }
    }

    fn detector(embedding: Vec<f32>) -> MockDetector {
        MockDetector {
            detections: vec![Detection::new(10.0, 20.0, 50.0, 80.0, 0.9).with_embedding(embedding)],
            fail: false,
        }
    }

    #[test]
    fn test_tracker_pipeline() {
        let mut pipeline = TrackerPipeline::with_default_config(detector(vec![1.0, 0.0])).unwrap();

        // Spawned tentative, confirmed on the third hit.
        assert!(pipeline.process_frame(0, &[], 640, 480).unwrap().is_empty());
        assert!(pipeline.process_frame(1, &[], 640, 480).unwrap().is_empty());
        let tracks = pipeline.process_frame(2, &[], 640, 480).unwrap();
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].has_embedding);
    }

    #[test]
    fn test_detector_error_leaves_tracker_untouched() {
        let mut pipeline = TrackerPipeline::with_default_config(detector(vec![1.0])).unwrap();
        pipeline.process_frame(0, &[], 640, 480).unwrap();

        pipeline.detector_mut().fail = true;
        let err = pipeline.process_frame(1, &[], 640, 480).unwrap_err();
        assert!(matches!(err, PipelineError::Detector(_)));
        assert_eq!(pipeline.tracker().last_frame(), Some(0));
    }

    #[test]
    fn test_identify_confirmed_tracks() {
        let mut pipeline = TrackerPipeline::with_default_config(detector(vec![0.9, 0.1])).unwrap();
        for frame in 0..3 {
            pipeline.process_frame(frame, &[], 640, 480).unwrap();
        }
        let identified = pipeline.identify(&mut SingleCow).unwrap();
        assert_eq!(identified.len(), 1);
        assert_eq!(identified[0].1.identity_id, "cow-17");

        let mut unknown = TrackerPipeline::with_default_config(detector(vec![0.1, 0.9])).unwrap();
        for frame in 0..3 {
            unknown.process_frame(frame, &[], 640, 480).unwrap();
        }
        assert!(unknown.identify(&mut SingleCow).unwrap().is_empty());
    }
}
