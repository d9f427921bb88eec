use nalgebra::Point2;
use proptest::prelude::*;

use trackfuse_rs::frame::blank_frame;
use trackfuse_rs::fusion::{FusionError, RegistryConfig};
use trackfuse_rs::{
    CountDirection, CountingLine, FusionState, HandoffQueue, LineConfig, LineOrientation,
    TrackRegistry,
};

fn horizontal(direction: CountDirection, position: f64) -> CountingLine {
    CountingLine::new(LineConfig {
        orientation: LineOrientation::Horizontal,
        direction,
        position,
        frame_width: 400,
        frame_height: 300,
    })
    .unwrap()
}

#[test]
fn test_crossing_direction() {
    // 0.5 of 300 puts the line at y=150.
    let before = Point2::new(50.0, 100.0);
    let after = Point2::new(50.0, 200.0);

    let mut down = horizontal(CountDirection::Down, 0.5);
    assert!(down.check_crossing(1, after, Some(before)));

    let mut up = horizontal(CountDirection::Up, 0.5);
    assert!(!up.check_crossing(1, after, Some(before)));
    assert!(!up.is_counted(1));
}

#[test]
fn test_unknown_track_classification_rejected() {
    let mut registry = TrackRegistry::new(RegistryConfig::default());
    assert_eq!(
        registry.record_classification(42, 1),
        Err(FusionError::UnknownTrack(42))
    );
    assert!(registry.is_empty());
}

#[test]
fn test_queue_bounded_drop() {
    let queue = HandoffQueue::new(4);
    for i in 0..5u32 {
        queue.push(i);
    }
    assert_eq!(queue.size(), 4);
    assert_eq!(queue.snapshot(), vec![0, 1, 2, 3]);
    assert!(!queue.snapshot().contains(&4));
}

proptest! {
    #[test]
    fn prop_fusion_is_sticky(
        before in proptest::collection::vec(0u32..2, 0..20),
        after in proptest::collection::vec(0u32..2, 0..20),
    ) {
        let mut registry = TrackRegistry::new(RegistryConfig::default());
        registry.update(1, blank_frame(2, 2), 0.0);

        for label in before.iter().copied().chain(std::iter::once(1)).chain(after.iter().copied()) {
            registry.record_classification(1, label).unwrap();
        }

        let buffer = registry.get(1).unwrap();
        prop_assert_eq!(buffer.fusion(), FusionState::Positive);
        prop_assert_eq!(
            buffer.positive_frames() + buffer.negative_frames(),
            (before.len() + after.len() + 1) as u64
        );
    }

    #[test]
    fn prop_negative_only_never_positive(labels in proptest::collection::vec(Just(0u32), 1..20)) {
        let mut registry = TrackRegistry::new(RegistryConfig::default());
        registry.update(9, blank_frame(2, 2), 0.0);
        for label in labels {
            registry.record_classification(9, label).unwrap();
        }
        prop_assert_eq!(registry.get(9).unwrap().fusion(), FusionState::Negative);
    }

    #[test]
    fn prop_counted_at_most_once(ys in proptest::collection::vec(0.0f32..300.0, 2..40)) {
        let mut line = horizontal(CountDirection::Down, 0.5);
        let mut previous = None;
        let mut crossings = 0;

        for y in ys {
            let centroid = Point2::new(10.0, y);
            if line.check_crossing(3, centroid, previous) {
                crossings += 1;
                line.increment("rotten");
            }
            previous = Some(centroid);
        }

        prop_assert!(crossings <= 1);
        prop_assert_eq!(line.counts().total(), crossings);
        prop_assert_eq!(line.counts().get("rotten"), crossings);
    }

    #[test]
    fn prop_fresh_update_never_expires(timeout in 0.0f64..10.0, now in 0.0f64..1000.0) {
        let mut registry = TrackRegistry::new(RegistryConfig::default());
        registry.update(5, blank_frame(2, 2), now);
        prop_assert!(registry.expire(timeout, now).is_empty());
        prop_assert!(registry.contains(5));
    }
}
