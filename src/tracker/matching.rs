//! Matching utilities for multi-object tracking.
//!
//! Matrices produced here are laid out with detections as rows and tracks as
//! columns, and every index pair is `(detection, track)`.

use ndarray::Array2;

use crate::tracker::error::{Result, TrackerError};
use crate::tracker::rect::{EPS, Rect, iou_batch};

/// Cost assigned to padding cells and to non-finite costs before solving.
const INFEASIBLE: f64 = 1e6;

/// Detection input for the tracker.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box, supplied in TLBR format (x1, y1, x2, y2)
    pub bbox: Rect,
    /// Detection confidence score in [0, 1]
    pub score: f32,
    /// Appearance embedding from the re-identification model, if computed
    pub embedding: Option<Vec<f32>>,
    /// Detector class; a single class is tracked
    pub class_id: u32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            score,
            embedding: None,
            class_id: 0,
        }
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            embedding: None,
            class_id: 0,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Embedding as a slice, treating an empty vector as absent.
    pub fn feature(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }
}

/// Compute IoU distance (`1 - IoU`) between detections and tracks.
pub fn iou_distance(det_boxes: &[Rect], track_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(det_boxes, track_boxes).mapv(|iou| 1.0 - iou)
}

/// Pairwise cosine distance (`1 - cos`) between two sets of feature vectors.
///
/// Norms are floored so an all-zero vector yields distance 1 instead of NaN.
pub fn cosine_distance(a: &[&[f32]], b: &[&[f32]]) -> Array2<f32> {
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt().max(EPS as f32);
    let a_norms: Vec<f32> = a.iter().map(|v| norm(*v)).collect();
    let b_norms: Vec<f32> = b.iter().map(|v| norm(*v)).collect();

    let mut dists = Array2::zeros((a.len(), b.len()));
    for (i, u) in a.iter().enumerate() {
        for (j, v) in b.iter().enumerate() {
            let dot: f32 = u.iter().zip(v.iter()).map(|(x, y)| x * y).sum();
            let cos = dot / (a_norms[i] * b_norms[j]);
            dists[[i, j]] = (1.0 - cos).clamp(0.0, 2.0);
        }
    }
    dists
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// Accepted `(detection, track)` pairs.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_detections: Vec<usize>,
    pub unmatched_tracks: Vec<usize>,
}

/// Solve a minimum-cost bipartite assignment over `cost_matrix`
/// (detections x tracks) and keep the pairs for which `accept` holds.
///
/// Rejected pairs are reported unmatched on both sides.
pub fn linear_assignment<F>(cost_matrix: &Array2<f32>, accept: F) -> Result<AssignmentResult>
where
    F: Fn(usize, usize) -> bool,
{
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return Ok(AssignmentResult {
            matches: vec![],
            unmatched_detections: (0..num_rows).collect(),
            unmatched_tracks: (0..num_cols).collect(),
        });
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), INFEASIBLE);

    for i in 0..num_rows {
        for j in 0..num_cols {
            let c = cost_matrix[[i, j]] as f64;
            padded[[i, j]] = if c.is_finite() { c } else { INFEASIBLE };
        }
    }

    let (row_to_col, _) =
        lapjv::lapjv(&padded).map_err(|e| TrackerError::Assignment(format!("{e:?}")))?;

    let mut matches = vec![];
    let mut unmatched_detections = vec![];
    let mut unmatched_tracks_mask = vec![true; num_cols];

    for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
        if col_idx < num_cols && accept(row_idx, col_idx) {
            matches.push((row_idx, col_idx));
            unmatched_tracks_mask[col_idx] = false;
        } else {
            unmatched_detections.push(row_idx);
        }
    }

    let unmatched_tracks = unmatched_tracks_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    Ok(AssignmentResult {
        matches,
        unmatched_detections,
        unmatched_tracks,
    })
}

/// How detections and tracks are compared in one association call.
#[derive(Debug, Clone)]
pub enum Association<'a> {
    /// Cost is `1 - IoU`.
    Geometric,
    /// Cost is `(1 - w) * (1 - IoU) + w * cosine_distance`.
    Fused {
        detection_features: Vec<&'a [f32]>,
        track_features: Vec<&'a [f32]>,
        appearance_weight: f32,
    },
}

impl<'a> Association<'a> {
    /// Pick the strategy for one association call.
    ///
    /// Appearance is fused only when a weight is given, every detection and
    /// every track carries an embedding, and all embeddings share one length.
    pub fn select(
        detection_features: &[Option<&'a [f32]>],
        track_features: &[Option<&'a [f32]>],
        appearance_weight: Option<f32>,
    ) -> Self {
        let Some(appearance_weight) = appearance_weight else {
            return Association::Geometric;
        };

        let detection_features: Option<Vec<&[f32]>> = detection_features.iter().copied().collect();
        let track_features: Option<Vec<&[f32]>> = track_features.iter().copied().collect();

        match (detection_features, track_features) {
            (Some(dets), Some(tracks)) if !dets.is_empty() && !tracks.is_empty() => {
                let dim = dets[0].len();
                if dets.iter().chain(tracks.iter()).all(|f| f.len() == dim) {
                    Association::Fused {
                        detection_features: dets,
                        track_features: tracks,
                        appearance_weight,
                    }
                } else {
                    Association::Geometric
                }
            }
            _ => Association::Geometric,
        }
    }

    pub fn is_fused(&self) -> bool {
        matches!(self, Association::Fused { .. })
    }
}

/// Match detections to tracks.
///
/// A solved pair is accepted only when its IoU reaches `iou_threshold`,
/// whatever the strategy.
pub fn associate(
    det_boxes: &[Rect],
    track_boxes: &[Rect],
    association: &Association<'_>,
    iou_threshold: f32,
) -> Result<AssignmentResult> {
    let ious = iou_batch(det_boxes, track_boxes);
    let geometric = ious.mapv(|iou| 1.0 - iou);

    let cost = match association {
        Association::Geometric => geometric,
        Association::Fused {
            detection_features,
            track_features,
            appearance_weight,
        } => {
            let appearance = cosine_distance(detection_features, track_features);
            let w = *appearance_weight;
            geometric * (1.0 - w) + appearance * w
        }
    };

    linear_assignment(&cost, |d, t| ious[[d, t]] >= iou_threshold)
}
