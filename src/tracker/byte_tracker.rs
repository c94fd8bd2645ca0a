//! Per-frame tracking pipeline.
//!
//! Each frame is planned first: every live track's motion predictor is
//! advanced on a copy, the three association stages run against the predicted
//! boxes, and the matched copies are corrected. Only when all of that has
//! succeeded is the plan committed to the registry, so a failing frame leaves
//! the tracker untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tracker::error::{Result, TrackerError};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, Association, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::registry::TrackRegistry;
use crate::tracker::track::{Lifecycle, Track, TrackId, TrackSnapshot};
use crate::tracker::track_state::TrackState;

/// Configuration for the ByteTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or above this confidence drive stage 1 and may spawn tracks
    pub high_confidence_threshold: f32,
    /// Detections below this confidence are discarded
    pub low_confidence_threshold: f32,
    /// Minimum IoU for a stage 1 match
    pub primary_match_iou: f32,
    /// Minimum IoU for a stage 2 (low confidence) match
    pub secondary_match_iou: f32,
    /// Minimum IoU for a stage 3 (lost track) match
    pub reactivation_match_iou: f32,
    /// Weight of appearance distance in the stage 1 cost
    pub appearance_weight_primary: f32,
    /// Weight of appearance distance in the stage 3 cost
    pub appearance_weight_reactivation: f32,
    /// Misses after which a confirmed track becomes lost
    pub confirmed_timeout_frames: u32,
    /// Misses after which a tentative track is deleted
    pub tentative_timeout_frames: u32,
    /// Misses after which a lost track is deleted
    pub lost_timeout_frames: u32,
    /// Hits needed to confirm a tentative track
    pub confirm_after_hits: u32,
    /// Upper bound on tracks kept after cleanup
    pub max_active_tracks: usize,
    /// Fuse appearance into stages 1 and 3 when embeddings are available
    pub use_appearance: bool,
    /// Expected embedding length; learned from the first embedding when unset
    pub embedding_dim: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.6,
            low_confidence_threshold: 0.1,
            primary_match_iou: 0.8,
            secondary_match_iou: 0.5,
            reactivation_match_iou: 0.3,
            appearance_weight_primary: 0.5,
            appearance_weight_reactivation: 0.7,
            confirmed_timeout_frames: 30,
            tentative_timeout_frames: 3,
            lost_timeout_frames: 90,
            confirm_after_hits: 3,
            max_active_tracks: 100,
            use_appearance: true,
            embedding_dim: None,
        }
    }
}

impl TrackerConfig {
    /// Parse a JSON document; keys it leaves out keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("primary_match_iou", self.primary_match_iou),
            ("secondary_match_iou", self.secondary_match_iou),
            ("reactivation_match_iou", self.reactivation_match_iou),
            ("appearance_weight_primary", self.appearance_weight_primary),
            (
                "appearance_weight_reactivation",
                self.appearance_weight_reactivation,
            ),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackerError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.low_confidence_threshold > self.high_confidence_threshold {
            return Err(TrackerError::InvalidConfig(format!(
                "low_confidence_threshold {} exceeds high_confidence_threshold {}",
                self.low_confidence_threshold, self.high_confidence_threshold
            )));
        }
        if self.confirm_after_hits == 0 {
            return Err(TrackerError::InvalidConfig(
                "confirm_after_hits must be at least 1".into(),
            ));
        }
        if self.max_active_tracks == 0 {
            return Err(TrackerError::InvalidConfig(
                "max_active_tracks must be at least 1".into(),
            ));
        }
        if self.embedding_dim == Some(0) {
            return Err(TrackerError::InvalidConfig(
                "embedding_dim must be positive".into(),
            ));
        }
        Ok(())
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            confirm_after_hits: self.confirm_after_hits,
            tentative_timeout_frames: self.tentative_timeout_frames,
            confirmed_timeout_frames: self.confirmed_timeout_frames,
            lost_timeout_frames: self.lost_timeout_frames,
        }
    }

    fn appearance_weight(&self, weight: f32) -> Option<f32> {
        self.use_appearance.then_some(weight)
    }
}

/// Tracker counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerStats {
    /// Last processed frame index
    pub frame_id: Option<u64>,
    /// Tracks created since construction or reset
    pub total_tracks: u64,
    /// Confirmed tracks reported by the last frame
    pub active_tracks: usize,
    pub confirmed: usize,
    pub tentative: usize,
    pub lost: usize,
    /// Detections dropped as malformed
    pub rejected_detections: u64,
}

/// Detections that survived validation, with the bookkeeping to commit.
struct Screened {
    detections: Vec<Detection>,
    embedding_dim: Option<usize>,
    rejected: u64,
}

/// A track's predictor advanced (and possibly corrected) for this frame.
struct Staged {
    filter: KalmanFilter,
    predicted: Rect,
}

/// Outcome of the association stages, keyed by track id.
struct FramePlan {
    staged: BTreeMap<TrackId, Staged>,
    matched: BTreeMap<TrackId, usize>,
    spawns: Vec<usize>,
}

pub struct ByteTracker {
    registry: TrackRegistry,
    config: TrackerConfig,
    lifecycle: Lifecycle,
    last_frame: Option<u64>,
    embedding_dim: Option<usize>,
    rejected_detections: u64,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: TrackRegistry::new(config.max_active_tracks),
            lifecycle: config.lifecycle(),
            embedding_dim: config.embedding_dim,
            last_frame: None,
            rejected_detections: 0,
            config,
        })
    }

    /// Process one frame of detections and return the confirmed tracks.
    ///
    /// `frame_idx` must be strictly greater than the previous call's.
    /// Malformed detections are dropped with a warning; any error leaves the
    /// tracker as it was before the call.
    pub fn update(
        &mut self,
        frame_idx: u64,
        detections: Vec<Detection>,
    ) -> Result<Vec<TrackSnapshot>> {
        if let Some(last) = self.last_frame {
            if frame_idx <= last {
                return Err(TrackerError::OutOfOrderFrame {
                    frame: frame_idx,
                    last,
                });
            }
        }

        let screened = self.screen(frame_idx, detections);
        let plan = self.plan(&screened.detections)?;
        self.commit(frame_idx, &screened.detections, plan);

        self.last_frame = Some(frame_idx);
        self.embedding_dim = screened.embedding_dim;
        self.rejected_detections += screened.rejected;

        Ok(self.snapshots())
    }

    /// Process the frame after the last one (frame 0 on the first call).
    pub fn step(&mut self, detections: Vec<Detection>) -> Result<Vec<TrackSnapshot>> {
        let frame_idx = self.last_frame.map_or(0, |last| last + 1);
        self.update(frame_idx, detections)
    }

    fn screen(&self, frame_idx: u64, detections: Vec<Detection>) -> Screened {
        let mut embedding_dim = self.embedding_dim;
        let mut rejected = 0;
        let mut accepted = Vec::with_capacity(detections.len());

        for (index, mut det) in detections.into_iter().enumerate() {
            if det.embedding.as_ref().is_some_and(|e| e.is_empty()) {
                det.embedding = None;
            }

            let reason = if !det.bbox.is_well_formed() {
                Some("box must satisfy x1 < x2 and y1 < y2".to_string())
            } else if !det.score.is_finite() {
                Some("confidence is not finite".to_string())
            } else if let Some(embedding) = det.feature() {
                let expected = embedding_dim;
                match expected {
                    _ if embedding.iter().any(|v| !v.is_finite()) => {
                        Some("embedding contains non-finite values".to_string())
                    }
                    Some(dim) if dim != embedding.len() => Some(format!(
                        "embedding has {} dimensions, expected {dim}",
                        embedding.len()
                    )),
                    Some(_) => None,
                    None => {
                        embedding_dim = Some(embedding.len());
                        None
                    }
                }
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    warn!(frame_idx, index, %reason, "rejecting detection");
                    rejected += 1;
                }
                None => accepted.push(det),
            }
        }

        Screened {
            detections: accepted,
            embedding_dim,
            rejected,
        }
    }

    fn plan(&self, detections: &[Detection]) -> Result<FramePlan> {
        let mut staged: BTreeMap<TrackId, Staged> = self
            .registry
            .tracks()
            .filter(|t| t.state.is_live())
            .map(|t| {
                let mut filter = t.filter.clone();
                let predicted = filter.predict();
                (t.track_id, Staged { filter, predicted })
            })
            .collect();

        let mut plan_matches: BTreeMap<TrackId, usize> = BTreeMap::new();

        if detections.is_empty() {
            return Ok(FramePlan {
                staged,
                matched: plan_matches,
                spawns: vec![],
            });
        }

        let mut high = Vec::new();
        let mut low = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            if det.score >= self.config.high_confidence_threshold {
                high.push(i);
            } else if det.score >= self.config.low_confidence_threshold {
                low.push(i);
            }
        }

        // Stage 1: high confidence detections against every live track.
        let pool: Vec<TrackId> = staged.keys().copied().collect();
        let (stage1, unmatched_high, unmatched_pool) = self.match_stage(
            detections,
            &high,
            &pool,
            &staged,
            self.config.appearance_weight(self.config.appearance_weight_primary),
            self.config.primary_match_iou,
        )?;
        plan_matches.extend(stage1);

        // Stage 2: low confidence detections against what stage 1 left, geometry only.
        let (stage2, _, leftover) = self.match_stage(
            detections,
            &low,
            &unmatched_pool,
            &staged,
            None,
            self.config.secondary_match_iou,
        )?;
        plan_matches.extend(stage2);

        // Stage 3: remaining high confidence detections against lost tracks
        // that neither earlier stage claimed.
        let lost: Vec<TrackId> = leftover
            .into_iter()
            .filter(|id| self.state_of(*id) == Some(TrackState::Lost))
            .collect();
        let (stage3, spawns, _) = self.match_stage(
            detections,
            &unmatched_high,
            &lost,
            &staged,
            self.config
                .appearance_weight(self.config.appearance_weight_reactivation),
            self.config.reactivation_match_iou,
        )?;
        plan_matches.extend(stage3);

        for (&track_id, &det_idx) in &plan_matches {
            if let Some(entry) = staged.get_mut(&track_id) {
                entry
                    .filter
                    .update(&detections[det_idx].bbox)
                    .ok_or(TrackerError::SingularInnovation { track_id })?;
            }
        }

        Ok(FramePlan {
            staged,
            matched: plan_matches,
            spawns,
        })
    }

    /// Run one association stage. Returns the matches as `track id -> detection
    /// index`, the unmatched detection indices and the unmatched track ids.
    fn match_stage(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_ids: &[TrackId],
        staged: &BTreeMap<TrackId, Staged>,
        appearance_weight: Option<f32>,
        iou_threshold: f32,
    ) -> Result<(Vec<(TrackId, usize)>, Vec<usize>, Vec<TrackId>)> {
        if det_indices.is_empty() || track_ids.is_empty() {
            return Ok((vec![], det_indices.to_vec(), track_ids.to_vec()));
        }

        let det_boxes: Vec<Rect> = det_indices.iter().map(|&i| detections[i].bbox).collect();
        let track_boxes: Vec<Rect> = track_ids
            .iter()
            .map(|id| staged.get(id).map(|s| s.predicted).unwrap_or_default())
            .collect();

        let det_features: Vec<Option<&[f32]>> =
            det_indices.iter().map(|&i| detections[i].feature()).collect();
        let track_features: Vec<Option<&[f32]>> = track_ids
            .iter()
            .map(|id| self.registry.get(*id).and_then(Track::feature))
            .collect();
        let association = Association::select(&det_features, &track_features, appearance_weight);

        let result = matching::associate(&det_boxes, &track_boxes, &association, iou_threshold)?;

        Ok((
            result
                .matches
                .iter()
                .map(|&(d, t)| (track_ids[t], det_indices[d]))
                .collect(),
            result
                .unmatched_detections
                .iter()
                .map(|&d| det_indices[d])
                .collect(),
            result
                .unmatched_tracks
                .iter()
                .map(|&t| track_ids[t])
                .collect(),
        ))
    }

    fn state_of(&self, track_id: TrackId) -> Option<TrackState> {
        self.registry.get(track_id).map(|t| t.state)
    }

    fn commit(&mut self, frame_idx: u64, detections: &[Detection], mut plan: FramePlan) {
        let lifecycle = self.lifecycle;

        for track in self.registry.tracks_mut() {
            let Some(staged) = plan.staged.remove(&track.track_id) else {
                continue;
            };
            track.filter = staged.filter;
            track.predict(staged.predicted);

            let previous = track.state;
            match plan.matched.get(&track.track_id) {
                Some(&det_idx) => track.update(&detections[det_idx], frame_idx, &lifecycle),
                None => track.mark_missed(&lifecycle),
            }

            if previous != track.state {
                debug!(
                    track_id = track.track_id,
                    frame_idx,
                    from = %previous,
                    to = %track.state,
                    "track state changed"
                );
            }
        }

        for det_idx in plan.spawns {
            let track_id = self.registry.create(&detections[det_idx], frame_idx);
            debug!(track_id, frame_idx, "spawned track");
        }

        let removed = self.registry.cleanup();
        if removed > 0 {
            debug!(frame_idx, removed, "removed tracks");
        }
    }

    /// Confirmed tracks as serializable records, in id order.
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.registry.active_tracks().map(Track::snapshot).collect()
    }

    /// Confirmed tracks, in id order.
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.registry.active_tracks()
    }

    /// Every track the registry holds, whatever its state.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.registry.tracks()
    }

    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.registry.get(track_id)
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            frame_id: self.last_frame,
            total_tracks: self.registry.total_created(),
            active_tracks: self.registry.active_tracks().count(),
            confirmed: self.registry.count_in_state(TrackState::Confirmed),
            tentative: self.registry.count_in_state(TrackState::Tentative),
            lost: self.registry.count_in_state(TrackState::Lost),
            rejected_detections: self.rejected_detections,
        }
    }

    /// Forget every track and restart ids and frame numbering.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.last_frame = None;
        self.embedding_dim = self.config.embedding_dim;
        self.rejected_detections = 0;
        info!("tracker reset");
    }
}
