use tracklabel::{ByteTracker, Detection, TrackerConfig};

#[test]
fn test_basic_tracking() {
    let mut tracker = ByteTracker::new(TrackerConfig::default());

    // Frame 1: one detection, confirmed immediately on the first frame
    let tracks1 = tracker.update(vec![Detection::new(100.0, 100.0, 200.0, 200.0, 0.9)]);
    assert_eq!(tracks1.len(), 1);
    let id1 = tracks1[0].track_id;
    assert_eq!(id1, 1);

    // Frame 2: same object moved slightly
    let tracks2 = tracker.update(vec![Detection::new(105.0, 105.0, 205.0, 205.0, 0.9)]);
    assert_eq!(tracks2.len(), 1);
    assert_eq!(tracks2[0].track_id, id1);

    // Frame 3: partially occluded, recovered by the low-score association
    let tracks3 = tracker.update(vec![Detection::new(110.0, 110.0, 210.0, 210.0, 0.2)]);
    assert_eq!(tracks3.len(), 1);
    assert_eq!(tracks3[0].track_id, id1);

    // Frame 4: object disappears
    assert!(tracker.update(vec![]).is_empty());

    // Frame 5: object reappears within the track buffer and keeps its id
    let tracks5 = tracker.update(vec![Detection::new(115.0, 115.0, 215.0, 215.0, 0.9)]);
    assert_eq!(tracks5.len(), 1);
    assert_eq!(tracks5[0].track_id, id1);
}

#[test]
fn test_lost_track_expires_after_buffer() {
    let config = TrackerConfig {
        track_buffer: 2,
        ..Default::default()
    };
    let mut tracker = ByteTracker::new(config);

    let first = tracker.update(vec![Detection::new(100.0, 100.0, 200.0, 200.0, 0.9)]);
    let id = first[0].track_id;

    for _ in 0..5 {
        assert!(tracker.update(vec![]).is_empty());
    }

    // Expired: the reappearing object is a new candidate with a fresh id.
    // It is not confirmed until seen a second time.
    assert!(
        tracker
            .update(vec![Detection::new(100.0, 100.0, 200.0, 200.0, 0.9)])
            .is_empty()
    );
    let again = tracker.update(vec![Detection::new(101.0, 101.0, 201.0, 201.0, 0.9)]);
    assert_eq!(again.len(), 1);
    assert_ne!(again[0].track_id, id);
}
