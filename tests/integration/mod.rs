//! Integration tests for edgetrail

mod config_layering;
mod coordinator;
mod frame_store;
mod pipeline_run;
mod thinning;
mod tracer_scenarios;
