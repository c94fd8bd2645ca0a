use herdtrack_rs::{ByteTracker, Detection, TrackState, TrackerConfig, TrackerError};

fn cow(x: f32, y: f32, score: f32) -> Detection {
    Detection::new(x, y, x + 120.0, y + 80.0, score)
}

fn tracker() -> ByteTracker {
    ByteTracker::new(TrackerConfig::default()).unwrap()
}

/// Feed the same box at frames 0, 1 and 2 and return the confirmed track id.
fn confirmed_track(tracker: &mut ByteTracker, det: &Detection) -> u64 {
    for frame in 0..3 {
        tracker.update(frame, vec![det.clone()]).unwrap();
    }
    let tracks = tracker.snapshots();
    assert_eq!(tracks.len(), 1);
    tracks[0].track_id
}

#[test]
fn test_basic_tracking() {
    let mut tracker = tracker();

    // Frame 0: spawned, still tentative
    let tracks0 = tracker.update(0, vec![cow(100.0, 100.0, 0.9)]).unwrap();
    assert!(tracks0.is_empty());
    let id = tracker.tracks().next().unwrap().track_id;

    // Frame 1: second hit, not yet confirmed
    let tracks1 = tracker.update(1, vec![cow(102.0, 101.0, 0.9)]).unwrap();
    assert!(tracks1.is_empty());
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Tentative);

    // Frame 2: third hit confirms
    let tracks2 = tracker.update(2, vec![cow(104.0, 102.0, 0.9)]).unwrap();
    assert_eq!(tracks2.len(), 1);
    assert_eq!(tracks2[0].track_id, id);
    assert_eq!(tracks2[0].state, TrackState::Confirmed);
    assert_eq!(tracks2[0].start_frame, 0);
    assert_eq!(tracks2[0].end_frame, 2);

    // Frame 3: occluded, only a low-confidence box; stage 2 keeps the identity
    let tracks3 = tracker.update(3, vec![cow(106.0, 103.0, 0.3)]).unwrap();
    assert_eq!(tracks3.len(), 1);
    assert_eq!(tracks3[0].track_id, id);
    assert_eq!(tracks3[0].time_since_update, 0);

    // Frame 4: nothing detected, the track coasts
    let tracks4 = tracker.update(4, vec![]).unwrap();
    assert_eq!(tracks4.len(), 1);
    assert_eq!(tracks4[0].time_since_update, 1);

    // Frame 5: seen again
    let tracks5 = tracker.update(5, vec![cow(110.0, 105.0, 0.9)]).unwrap();
    assert_eq!(tracks5.len(), 1);
    assert_eq!(tracks5[0].track_id, id);
}

#[test]
fn test_confirmed_after_three_hits_and_not_before() {
    let mut tracker = tracker();
    let det = cow(50.0, 50.0, 0.95);

    tracker.update(0, vec![det.clone()]).unwrap();
    let id = tracker.tracks().next().unwrap().track_id;
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Tentative);

    tracker.update(1, vec![det.clone()]).unwrap();
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Tentative);

    let tracks = tracker.update(2, vec![det]).unwrap();
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Confirmed);
    assert_eq!(tracks[0].track_id, id);
    assert_eq!(tracks[0].hits, 3);
}

#[test]
fn test_confirmed_track_lost_at_31st_miss_then_reactivated() {
    let mut tracker = tracker();
    let embedding = vec![0.6, 0.8, 0.0, 0.0];
    let det = cow(200.0, 150.0, 0.9).with_embedding(embedding.clone());
    let id = confirmed_track(&mut tracker, &det);

    // Frames 3..=32: 30 misses, still confirmed
    for frame in 3..=32 {
        tracker.update(frame, vec![]).unwrap();
    }
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Confirmed);

    // Frame 33: 31st miss
    let tracks = tracker.update(33, vec![]).unwrap();
    assert!(tracks.is_empty());
    assert_eq!(tracker.track(id).unwrap().state, TrackState::Lost);
    assert_eq!(tracker.track(id).unwrap().time_since_update, 31);

    // Frame 34: shifted box (IoU ~0.5, too low for stage 1) with the same appearance
    let reappeared = cow(240.0, 150.0, 0.9).with_embedding(embedding);
    let tracks = tracker.update(34, vec![reappeared]).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].track_id, id);
    assert_eq!(tracks[0].state, TrackState::Confirmed);
    assert_eq!(tracks[0].time_since_update, 0);
    assert_eq!(tracker.registry().len(), 1, "no new track should be spawned");
}

#[test]
fn test_lost_track_deleted_after_91_misses() {
    let mut tracker = tracker();
    let id = confirmed_track(&mut tracker, &cow(0.0, 0.0, 0.9));

    // Frame 2 + k leaves time_since_update == k.
    for frame in 3..=92 {
        tracker.update(frame, vec![]).unwrap();
    }
    let track = tracker.track(id).unwrap();
    assert_eq!(track.state, TrackState::Lost);
    assert_eq!(track.time_since_update, 90);

    tracker.update(93, vec![]).unwrap();
    assert!(tracker.track(id).is_none());
    assert!(tracker.registry().is_empty());
}

#[test]
fn test_tentative_track_deleted_after_four_misses() {
    let mut tracker = tracker();
    tracker.update(0, vec![cow(0.0, 0.0, 0.9)]).unwrap();
    let id = tracker.tracks().next().unwrap().track_id;

    for frame in 1..=3 {
        tracker.update(frame, vec![]).unwrap();
        assert_eq!(tracker.track(id).unwrap().state, TrackState::Tentative);
    }
    tracker.update(4, vec![]).unwrap();
    assert!(tracker.track(id).is_none());
}

#[test]
fn test_track_ids_never_reused() {
    let mut tracker = tracker();
    let mut seen = Vec::new();

    for round in 0..5u64 {
        let start = round * 10;
        tracker.update(start, vec![cow(0.0, 0.0, 0.9)]).unwrap();
        seen.extend(tracker.tracks().map(|t| t.track_id));
        // Let the tentative track die before the next round.
        for frame in start + 1..start + 6 {
            tracker.update(frame, vec![]).unwrap();
        }
        assert!(tracker.registry().is_empty());
    }

    assert_eq!(seen.len(), 5);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_two_objects_one_match_each() {
    let mut tracker = tracker();
    let a = cow(0.0, 0.0, 0.9);
    let b = cow(400.0, 0.0, 0.9);
    for frame in 0..3 {
        tracker.update(frame, vec![a.clone(), b.clone()]).unwrap();
    }
    let ids: Vec<u64> = tracker.snapshots().iter().map(|t| t.track_id).collect();
    assert_eq!(ids.len(), 2);

    // Slight motion keeps IoU around 0.9 with each object's own track.
    let tracks = tracker
        .update(3, vec![cow(404.0, 2.0, 0.9), cow(4.0, 2.0, 0.9)])
        .unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracker.registry().len(), 2);

    let first = tracker.track(ids[0]).unwrap();
    let second = tracker.track(ids[1]).unwrap();
    assert_eq!(first.bbox.x, 4.0);
    assert_eq!(second.bbox.x, 404.0);
    assert_eq!(first.time_since_update, 0);
    assert_eq!(second.time_since_update, 0);
}

#[test]
fn test_constant_motion_keeps_identity() {
    let mut tracker = tracker();
    let mut ids = Vec::new();
    for frame in 0..40u64 {
        let x = 10.0 + frame as f32 * 6.0;
        let tracks = tracker.update(frame, vec![cow(x, 300.0, 0.85)]).unwrap();
        ids.extend(tracks.iter().map(|t| t.track_id));
    }
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|&id| id == ids[0]));
    assert_eq!(tracker.stats().total_tracks, 1);
}

#[test]
fn test_out_of_order_frame_is_fatal() {
    let mut tracker = tracker();
    tracker.update(3, vec![cow(0.0, 0.0, 0.9)]).unwrap();
    let err = tracker.update(2, vec![cow(0.0, 0.0, 0.9)]).unwrap_err();
    assert!(matches!(err, TrackerError::OutOfOrderFrame { frame: 2, last: 3 }));
    assert_eq!(tracker.registry().len(), 1);
    assert_eq!(tracker.tracks().next().unwrap().hits, 1);
}

#[test]
fn test_deterministic_output() {
    let frames: Vec<Vec<Detection>> = (0..20)
        .map(|f| {
            let f = f as f32;
            vec![
                cow(10.0 + 3.0 * f, 10.0, 0.9),
                cow(300.0 - 2.0 * f, 40.0, 0.7),
                cow(150.0, 200.0 + f, 0.4),
            ]
        })
        .collect();

    let run = || {
        let mut tracker = tracker();
        frames
            .iter()
            .enumerate()
            .map(|(i, dets)| tracker.update(i as u64, dets.clone()).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_output_record_shape() {
    let mut tracker = tracker();
    let det = cow(10.0, 20.0, 0.9).with_embedding(vec![1.0, 0.0]);
    confirmed_track(&mut tracker, &det);

    let json = serde_json::to_value(tracker.snapshots()).unwrap();
    let record = &json[0];
    for key in [
        "track_id",
        "bbox",
        "confidence",
        "state",
        "age",
        "hits",
        "time_since_update",
        "start_frame",
        "end_frame",
        "has_embedding",
    ] {
        assert!(record.get(key).is_some(), "missing {key}");
    }
    assert_eq!(record["state"], "CONFIRMED");
    assert_eq!(record["has_embedding"], true);
    assert_eq!(record["end_frame"], 2);
}
