//! Id-keyed store of tracks.
//!
//! Tracks live in a map keyed by their id, so a frame can hold on to ids
//! while tracks are updated and only insert or remove at the end of the frame.

use std::collections::BTreeMap;

use tracing::debug;

use crate::tracker::matching::Detection;
use crate::tracker::track::{Track, TrackId};
use crate::tracker::track_state::TrackState;

#[derive(Debug, Clone)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    max_tracks: usize,
    total_created: u64,
}

impl TrackRegistry {
    pub fn new(max_tracks: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            max_tracks,
            total_created: 0,
        }
    }

    /// Spawn a tentative track from `detection` under a fresh id.
    ///
    /// Ids strictly increase and are never handed out twice, even after the
    /// track they named has been removed.
    pub fn create(&mut self, detection: &Detection, frame_idx: u64) -> TrackId {
        let track_id = self.next_id;
        self.next_id += 1;
        self.total_created += 1;
        self.tracks
            .insert(track_id, Track::new(track_id, detection, frame_idx));
        track_id
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, track_id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&track_id)
    }

    /// All tracks in id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub(crate) fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    /// Snapshot of every id, in id order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    /// Snapshot of the ids of tracks in `state`.
    pub fn ids_in_state(&self, state: TrackState) -> Vec<TrackId> {
        self.tracks
            .values()
            .filter(|t| t.state == state)
            .map(|t| t.track_id)
            .collect()
    }

    /// Snapshot of the ids of every non-deleted track.
    pub fn live_ids(&self) -> Vec<TrackId> {
        self.tracks
            .values()
            .filter(|t| t.state.is_live())
            .map(|t| t.track_id)
            .collect()
    }

    /// Confirmed tracks in id order.
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values().filter(|t| t.is_confirmed())
    }

    /// Drop deleted tracks, then evict beyond capacity.
    ///
    /// When more than `max_tracks` remain, the tracks missed most recently
    /// (smallest `time_since_update`) are kept; ties keep the older id.
    /// Returns the number of tracks removed.
    pub fn cleanup(&mut self) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|_, t| !t.is_deleted());

        if self.tracks.len() > self.max_tracks {
            let mut ranked: Vec<(u32, TrackId)> = self
                .tracks
                .values()
                .map(|t| (t.time_since_update, t.track_id))
                .collect();
            ranked.sort_unstable();
            for &(time_since_update, track_id) in &ranked[self.max_tracks..] {
                debug!(track_id, time_since_update, "evicting track over capacity");
                self.tracks.remove(&track_id);
            }
        }

        before - self.tracks.len()
    }

    /// Remove every track and restart id issuance.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.total_created = 0;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks created since construction or the last reset.
    pub fn total_created(&self) -> u64 {
        self.total_created
    }

    pub fn max_tracks(&self) -> usize {
        self.max_tracks
    }

    pub fn count_in_state(&self, state: TrackState) -> usize {
        self.tracks.values().filter(|t| t.state == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32) -> Detection {
        Detection::new(x, 0.0, x + 10.0, 10.0, 0.9)
    }

    #[test]
    fn test_ids_strictly_increase_and_are_not_reused() {
        let mut registry = TrackRegistry::new(10);
        let a = registry.create(&det(0.0), 0);
        let b = registry.create(&det(20.0), 0);
        assert!(b > a);

        registry.get_mut(b).unwrap().state = TrackState::Deleted;
        assert_eq!(registry.cleanup(), 1);
        assert!(registry.get(b).is_none());

        let c = registry.create(&det(40.0), 1);
        assert!(c > b);
        assert_eq!(registry.total_created(), 3);
    }

    #[test]
    fn test_cleanup_removes_only_deleted() {
        let mut registry = TrackRegistry::new(10);
        let ids: Vec<_> = (0..4).map(|i| registry.create(&det(i as f32 * 20.0), 0)).collect();
        registry.get_mut(ids[0]).unwrap().state = TrackState::Confirmed;
        registry.get_mut(ids[1]).unwrap().state = TrackState::Lost;
        registry.get_mut(ids[2]).unwrap().state = TrackState::Deleted;

        registry.cleanup();
        assert_eq!(registry.ids(), vec![ids[0], ids[1], ids[3]]);
        assert_eq!(registry.ids_in_state(TrackState::Lost), vec![ids[1]]);
        assert_eq!(registry.active_tracks().count(), 1);
    }

    #[test]
    fn test_eviction_keeps_least_recently_missed() {
        let mut registry = TrackRegistry::new(2);
        let ids: Vec<_> = (0..4).map(|i| registry.create(&det(i as f32 * 20.0), 0)).collect();
        registry.get_mut(ids[0]).unwrap().time_since_update = 5;
        registry.get_mut(ids[1]).unwrap().time_since_update = 1;
        registry.get_mut(ids[2]).unwrap().time_since_update = 9;
        registry.get_mut(ids[3]).unwrap().time_since_update = 1;

        assert_eq!(registry.cleanup(), 2);
        assert_eq!(registry.ids(), vec![ids[1], ids[3]]);
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut registry = TrackRegistry::new(10);
        let first = registry.create(&det(0.0), 0);
        registry.create(&det(20.0), 0);
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.create(&det(0.0), 0), first);
    }
}
