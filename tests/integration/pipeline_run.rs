//! End-to-end runs through the pipeline and the CLI route table

use super::tracer_scenarios::{unit_disk_config, Disk};
use edgetrail::cli::{Commands, RunContext};
use edgetrail::config::RunConfig;
use edgetrail::pipeline::{read_final, run_all, Pipeline};
use edgetrail::store::{FrameFilter, FrameStore};
use edgetrail::trace::Trail;
use edgetrail::{ApiError, PlanePoint};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn disk_run_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.trace = unit_disk_config();
    config.render.width = 8;
    config.render.height = 8;
    config.render.max_iter = 20;
    config.thin.target_frames = 20;
    // Every escape map is identical, so only spacing could block a removal
    config.thin.spacing_threshold = 10.0;
    config
}

#[test]
fn test_run_all_traces_when_no_trail_exists() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline =
        Pipeline::with_oracle(temp_dir.path(), disk_run_config(), Arc::new(Disk(1.0))).unwrap();
    let trail_path = temp_dir.path().join("trail.json");
    let output = temp_dir.path().join("final.json");

    let report = run_all(&pipeline, &trail_path, &output).unwrap();
    assert!(report.traced);
    assert!(trail_path.exists());
    assert!(report.trail_points > 100);
    assert!(report.reloaded);
    assert_eq!(report.rendered, report.trail_points);
    assert_eq!(report.diffs_computed, report.trail_points - 1);

    let thin = report.thin.unwrap();
    assert_eq!(thin.live, 20);
    assert_eq!(thin.shortfall, 0);
    assert_eq!(thin.removed, report.trail_points - 20);
    assert_eq!(report.written, Some(20));

    let trail = Trail::read_json(&trail_path).unwrap();
    let survivors = read_final(&output).unwrap();
    assert_eq!(survivors.len(), 20);
    assert_eq!(survivors.first(), trail.points().first());
    assert_eq!(survivors.last(), trail.points().last());

    // A second run reuses the saved trail and finds nothing left to do
    let again = run_all(&pipeline, &trail_path, &output).unwrap();
    assert!(!again.traced);
    assert!(!again.reloaded);
    assert_eq!(again.rendered, 0);
    assert_eq!(again.thin.unwrap().removed, 0);
}

#[test]
fn test_abort_file_stops_render_step() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline =
        Pipeline::with_oracle(temp_dir.path(), disk_run_config(), Arc::new(Disk(1.0))).unwrap();
    let trail_path = temp_dir.path().join("trail.json");
    Trail::closed_from_path(
        &[
            PlanePoint::new(1.0, 0.0),
            PlanePoint::new(0.0, 1.0),
            PlanePoint::new(-1.0, 0.0),
        ],
        0.0,
    )
    .write_json(&trail_path)
    .unwrap();
    pipeline.load(&Trail::read_json(&trail_path).unwrap()).unwrap();
    std::fs::write(pipeline.abort().path(), b"").unwrap();

    let rendered = pipeline.render().unwrap();
    assert!(rendered.cancelled);
    assert_eq!(rendered.rendered, 0);
    assert_eq!(pipeline.store().stats().unwrap().with_data, 0);
}

#[test]
fn test_cli_commands_against_one_workspace() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = disk_run_config();
    config.render.width = 16;
    config.render.height = 16;
    config.thin.target_frames = 3;
    let context = RunContext::with_config(temp_dir.path().to_path_buf(), config).unwrap();

    let path: Vec<PlanePoint> = (0..6)
        .map(|i| PlanePoint::new(-0.75, 0.05 + i as f64 * 0.02))
        .collect();
    Trail::closed_from_path(&path, 0.0)
        .write_json(&temp_dir.path().join("trail.json"))
        .unwrap();

    let loaded = context
        .execute(&Commands::Load {
            trail: PathBuf::from("trail.json"),
            spacing: None,
        })
        .unwrap();
    assert_eq!(loaded, "Created 7 frames");

    let rendered = context.execute(&Commands::Render).unwrap();
    assert_eq!(rendered, "Rendered 7 of 7 pending frames");
    assert!(context
        .execute(&Commands::Diffs)
        .unwrap()
        .starts_with("Computed 6 diffs"));

    context
        .execute(&Commands::Thin {
            target: None,
            percent: None,
            history: Some(PathBuf::from("thin-history.jsonl")),
        })
        .unwrap();
    // Four removals, one history line each
    let history = std::fs::read_to_string(temp_dir.path().join("thin-history.jsonl")).unwrap();
    assert_eq!(history.lines().count(), 4);

    let stats = context
        .execute(&Commands::Stats {
            format: "json".to_string(),
        })
        .unwrap();
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats["total"], 7);
    assert_eq!(stats["with_data"], 7);
    assert_eq!(stats["diffs"].as_u64().map(|d| d >= 6), Some(true));
    // The first, last and topmost frames are extremes and always survive
    let in_use = stats["in_use"].as_u64().unwrap();
    assert_eq!(in_use, 3);

    let exported = context
        .execute(&Commands::Export {
            output: PathBuf::from("out/final.json"),
        })
        .unwrap();
    assert_eq!(exported, format!("Created data file of {} frames", in_use));
    assert_eq!(
        read_final(&temp_dir.path().join("out/final.json")).unwrap().len() as u64,
        in_use
    );

    let reset = context.execute(&Commands::ResetUse).unwrap();
    assert_eq!(reset, format!("Re-enabled {} frames", 7 - in_use));
    assert_eq!(
        context.execute(&Commands::ResetDiffs).unwrap(),
        format!("Removed {} diffs", stats["diffs"])
    );

    let pipeline = Pipeline::open(temp_dir.path(), context.config().clone()).unwrap();
    assert_eq!(pipeline.store().iterate(FrameFilter::LIVE).unwrap().len(), 7);
}

#[test]
fn test_thin_rejects_bad_percent_before_touching_frames() {
    let temp_dir = TempDir::new().unwrap();
    let context = RunContext::with_config(temp_dir.path().to_path_buf(), disk_run_config()).unwrap();
    let path: Vec<PlanePoint> = (0..4)
        .map(|i| PlanePoint::new(-0.75, 0.05 + i as f64 * 0.02))
        .collect();
    Trail::closed_from_path(&path, 0.0)
        .write_json(&temp_dir.path().join("trail.json"))
        .unwrap();
    context
        .execute(&Commands::Load {
            trail: PathBuf::from("trail.json"),
            spacing: None,
        })
        .unwrap();

    let result = context.execute(&Commands::Thin {
        target: Some(2),
        percent: Some(-50.0),
        history: None,
    });
    match result {
        Err(ApiError::ConfigError(message)) => assert!(message.contains("target_percent")),
        other => panic!("expected a configuration error, got {:?}", other),
    }
    let stats = context
        .execute(&Commands::Stats {
            format: "json".to_string(),
        })
        .unwrap();
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats["total"], 5);
}
