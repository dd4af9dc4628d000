//! Boundary tracer scenarios against a synthetic disk-shaped set

use edgetrail::cancel::NeverCancel;
use edgetrail::config::{RefineConfig, TraceConfig};
use edgetrail::oracle::{Escape, MembershipOracle};
use edgetrail::trace::{BorderClassifier, BoundaryTracer, TraceStep};
use edgetrail::PlanePoint;
use std::sync::Arc;

/// Points strictly inside a disk of the given radius are members
pub struct Disk(pub f64);

impl MembershipOracle for Disk {
    fn calc(&self, point: PlanePoint, _julia: Option<PlanePoint>, max_iter: u32) -> Escape {
        let r = point.distance(&PlanePoint::ORIGIN);
        if r < self.0 {
            Escape::MEMBER
        } else {
            // Farther out escapes sooner
            let escaped_at = max_iter.saturating_sub(((r - self.0) * 100.0) as u32);
            Escape {
                in_set: false,
                escaped_at,
                final_sq_dist: 25.0,
            }
        }
    }
}

pub fn unit_disk_config() -> TraceConfig {
    TraceConfig {
        scale: 100.0,
        border_iter: 10,
        checkpoint_interval: 25,
        min_spacing: 0.02,
        seen_threshold: 500,
        unleash_x: -0.5,
        use_shortcuts: false,
        ..TraceConfig::default()
    }
}

fn trace(config: &TraceConfig) -> Vec<PlanePoint> {
    let mut tracer =
        BoundaryTracer::new(Arc::new(Disk(1.0)), config, &RefineConfig::default()).unwrap();
    tracer.run(&NeverCancel).unwrap().into_points()
}

#[test]
fn test_unit_disk_trail_is_closed() {
    let points = trace(&unit_disk_config());
    assert!(points.len() > 100, "got {} points", points.len());
    assert_eq!(points.first(), points.last());
}

#[test]
fn test_unit_disk_trail_points_are_on_the_border() {
    let scale = unit_disk_config().scale;
    for point in trace(&unit_disk_config()) {
        let r = point.distance(&PlanePoint::ORIGIN);
        assert!(r >= 1.0, "{:?} is inside the disk", point);
        assert!(r <= 1.0 + 1.5 / scale, "{:?} is not next to the disk", point);
    }
}

#[test]
fn test_every_trail_point_classifies_as_border() {
    let config = unit_disk_config();
    let mut classifier = BorderClassifier::new(Arc::new(Disk(1.0)), config.scale, config.border_iter, 0);
    for point in trace(&config) {
        let lattice = point.to_lattice(config.scale);
        assert!(
            classifier.is_border(lattice).is_some(),
            "{:?} is not a border point",
            point
        );
    }
}

#[test]
fn test_radius_ten_disk_at_fine_scale() {
    let config = TraceConfig {
        scale: 1000.0,
        border_iter: 10,
        checkpoint_interval: 5000,
        min_spacing: 0.2,
        seen_threshold: 100_000,
        unleash_x: -5.0,
        scan_limit: 20.0,
        use_shortcuts: false,
        ..TraceConfig::default()
    };
    let mut tracer =
        BoundaryTracer::new(Arc::new(Disk(10.0)), &config, &RefineConfig::default()).unwrap();
    let points = tracer.run(&NeverCancel).unwrap().into_points();
    assert_eq!(points.first(), points.last());
    // Circumference 20 pi at 0.2 spacing
    assert!(points.len() > 250, "got {} points", points.len());

    let mut classifier = BorderClassifier::new(Arc::new(Disk(10.0)), config.scale, config.border_iter, 0);
    for point in &points {
        let r = point.distance(&PlanePoint::ORIGIN);
        assert!((10.0..=10.0 + 1.5 / config.scale).contains(&r), "{:?} is off the circle", point);
        assert!(classifier.is_border(point.to_lattice(config.scale)).is_some());
    }
    for pair in points[..points.len() - 1].windows(2) {
        assert!(pair[0].distance(&pair[1]) >= config.min_spacing);
    }
}

#[test]
fn test_unit_disk_trail_respects_spacing() {
    let config = unit_disk_config();
    let points = trace(&config);
    let open = &points[..points.len() - 1];
    for pair in open.windows(2) {
        assert!(
            pair[0].distance(&pair[1]) >= config.min_spacing,
            "{:?} and {:?} are too close",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_unit_disk_trail_goes_the_long_way() {
    let points = trace(&unit_disk_config());
    // Starts on the right, heads up and round before coming back from below
    assert!(points[1].y >= 0.0);
    assert!(points.iter().any(|p| p.x < -0.95));
    assert!(points.iter().any(|p| p.y > 0.95));
    assert!(points.iter().any(|p| p.y < -0.95));
}

#[test]
fn test_small_seen_cache_still_closes() {
    let config = TraceConfig {
        seen_threshold: 200,
        ..unit_disk_config()
    };
    let mut tracer =
        BoundaryTracer::new(Arc::new(Disk(1.0)), &config, &RefineConfig::default()).unwrap();
    let mut progress_steps = 0;
    let trail = loop {
        match tracer.step().unwrap() {
            TraceStep::Progress(_) => progress_steps += 1,
            TraceStep::Completed(trail) => break trail,
        }
    };
    assert!(progress_steps > 0);
    assert!(trail.is_closed(1e-12));
    assert!(tracer.seen().rotations() > 0);
}

#[test]
fn test_respaced_trail_is_shorter_and_closed() {
    let trail = {
        let mut tracer = BoundaryTracer::new(
            Arc::new(Disk(1.0)),
            &unit_disk_config(),
            &RefineConfig::default(),
        )
        .unwrap();
        tracer.run(&NeverCancel).unwrap()
    };
    let coarse = trail.respace(0.1);
    assert!(coarse.len() < trail.len());
    assert!(coarse.is_closed(0.0));

    let rows = trail.survey(5..=20);
    assert!(rows.windows(2).all(|w| w[0].points <= w[1].points));
}
