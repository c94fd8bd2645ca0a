//! Trait for the detection front end feeding the tracker.

use crate::tracker::Detection;

/// Source of per-frame detections: an object detector, optionally followed by
/// an appearance-embedding model that fills [`Detection::embedding`].
///
/// # Example
///
/// ```ignore
/// use herdtrack_rs::{DetectionSource, Detection};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, input: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on raw image data and return detections.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes (format depends on implementation)
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    fn detect(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, Self::Error>;
}

/// Helper trait for converting model-specific outputs to `Detection`.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

/// Rows of `[x1, y1, x2, y2, confidence]`, the usual detector output layout.
impl IntoDetections for Vec<[f32; 5]> {
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter()
            .map(|[x1, y1, x2, y2, score]| Detection::new(x1, y1, x2, y2, score))
            .collect()
    }
}

/// Detector rows paired with the embedding computed for each crop.
impl IntoDetections for Vec<([f32; 5], Vec<f32>)> {
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter()
            .map(|([x1, y1, x2, y2, score], embedding)| {
                Detection::new(x1, y1, x2, y2, score).with_embedding(embedding)
            })
            .collect()
    }
}
