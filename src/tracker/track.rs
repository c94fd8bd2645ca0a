//! Single tracked object and its lifecycle.

use serde::{Deserialize, Serialize};

use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Registry-issued track identifier.
pub type TrackId = u64;

/// Momentum of the exponential moving average over appearance embeddings.
const EMBEDDING_MOMENTUM: f32 = 0.9;

/// Lifecycle thresholds a track is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lifecycle {
    pub confirm_after_hits: u32,
    pub tentative_timeout_frames: u32,
    pub confirmed_timeout_frames: u32,
    pub lost_timeout_frames: u32,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            confirm_after_hits: 3,
            tentative_timeout_frames: 3,
            confirmed_timeout_frames: 30,
            lost_timeout_frames: 90,
        }
    }
}

/// Single tracked object.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier
    pub track_id: TrackId,
    /// Current track state
    pub state: TrackState,
    /// Latest box: the matched detection, or the motion prediction on a miss
    pub bbox: Rect,
    /// Confidence of the last matched detection
    pub score: f32,
    /// Last raw appearance embedding
    pub embedding: Option<Vec<f32>>,
    /// Exponentially smoothed appearance embedding
    pub smoothed_embedding: Option<Vec<f32>>,
    /// Frames lived since creation
    pub age: u32,
    /// Matched detections, including the one that spawned the track
    pub hits: u32,
    /// Consecutive frames with a matched detection
    pub hit_streak: u32,
    /// Frames since the last matched detection
    pub time_since_update: u32,
    history: Vec<(u64, Rect)>,
    pub(crate) filter: KalmanFilter,
}

impl Track {
    /// Spawn a tentative track from an unmatched detection.
    ///
    /// The spawning detection counts as the first hit.
    pub(crate) fn new(track_id: TrackId, detection: &Detection, frame_idx: u64) -> Self {
        let embedding = detection.feature().map(<[f32]>::to_vec);
        Self {
            track_id,
            state: TrackState::Tentative,
            bbox: detection.bbox,
            score: detection.score,
            smoothed_embedding: embedding.clone(),
            embedding,
            age: 0,
            hits: 1,
            hit_streak: 1,
            time_since_update: 0,
            history: vec![(frame_idx, detection.bbox)],
            filter: KalmanFilter::new(&detection.bbox),
        }
    }

    /// Record the motion predictor's box for this frame.
    pub(crate) fn predict(&mut self, predicted: Rect) {
        self.bbox = predicted;
    }

    /// Apply a matched detection.
    pub(crate) fn update(&mut self, detection: &Detection, frame_idx: u64, lifecycle: &Lifecycle) {
        self.bbox = detection.bbox;
        self.score = detection.score;
        self.age += 1;
        self.hits += 1;
        self.hit_streak += 1;
        self.time_since_update = 0;
        self.history.push((frame_idx, detection.bbox));

        if let Some(new) = detection.feature() {
            self.refresh_embedding(new);
        }

        match self.state {
            TrackState::Tentative if self.hits >= lifecycle.confirm_after_hits => {
                self.state = TrackState::Confirmed;
            }
            TrackState::Lost => self.state = TrackState::Confirmed,
            _ => {}
        }
    }

    /// Record a frame in which no detection matched.
    pub(crate) fn mark_missed(&mut self, lifecycle: &Lifecycle) {
        self.age += 1;
        self.time_since_update += 1;
        self.hit_streak = 0;

        match self.state {
            TrackState::Confirmed if self.time_since_update > lifecycle.confirmed_timeout_frames => {
                self.state = TrackState::Lost;
            }
            TrackState::Tentative if self.time_since_update > lifecycle.tentative_timeout_frames => {
                self.state = TrackState::Deleted;
            }
            TrackState::Lost if self.time_since_update > lifecycle.lost_timeout_frames => {
                self.state = TrackState::Deleted;
            }
            _ => {}
        }
    }

    fn refresh_embedding(&mut self, new: &[f32]) {
        self.smoothed_embedding = match self.smoothed_embedding.take() {
            Some(mut smoothed) if smoothed.len() == new.len() => {
                for (s, n) in smoothed.iter_mut().zip(new) {
                    *s = EMBEDDING_MOMENTUM * *s + (1.0 - EMBEDDING_MOMENTUM) * n;
                }
                Some(smoothed)
            }
            _ => Some(new.to_vec()),
        };
        self.embedding = Some(new.to_vec());
    }

    /// Smoothed appearance feature used for association.
    pub fn feature(&self) -> Option<&[f32]> {
        self.smoothed_embedding.as_deref()
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }

    /// Matched `(frame index, box)` pairs in arrival order.
    pub fn history(&self) -> &[(u64, Rect)] {
        &self.history
    }

    pub fn start_frame(&self) -> u64 {
        self.history.first().map_or(0, |(frame, _)| *frame)
    }

    pub fn end_frame(&self) -> u64 {
        self.history.last().map_or(0, |(frame, _)| *frame)
    }

    /// Centre displacement between the last two matched boxes.
    pub fn velocity(&self) -> (f32, f32) {
        match self.history.as_slice() {
            [.., (_, prev), (_, curr)] => {
                let (px, py) = prev.center();
                let (cx, cy) = curr.center();
                (cx - px, cy - py)
            }
            _ => (0.0, 0.0),
        }
    }

    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    /// The track's motion predictor.
    pub fn motion(&self) -> &KalmanFilter {
        &self.filter
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.track_id,
            bbox: self.bbox.to_tlbr(),
            confidence: self.score,
            state: self.state,
            age: self.age,
            hits: self.hits,
            time_since_update: self.time_since_update,
            start_frame: self.start_frame(),
            end_frame: self.end_frame(),
            has_embedding: self.embedding.is_some(),
        }
    }
}

/// Serializable per-frame view of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    /// TLBR box
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub state: TrackState,
    pub age: u32,
    pub hits: u32,
    pub time_since_update: u32,
    pub start_frame: u64,
    pub end_frame: u64,
    pub has_embedding: bool,
}
