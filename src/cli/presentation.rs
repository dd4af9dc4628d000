//! CLI presentation: text and json formatters per command.

use crate::error::ApiError;
use crate::pipeline::RunReport;
use crate::store::StoreStats;
use crate::thin::ThinReport;
use crate::trace::SurveyRow;
use comfy_table::Table;

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        "-".to_string()
    } else {
        format!("{:.2}%", part as f64 / whole as f64 * 100.0)
    }
}

fn table_with_header(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

pub fn format_stats(stats: &StoreStats, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "total": stats.total,
            "with_data": stats.with_data,
            "in_use": stats.in_use,
            "diffs": stats.diffs,
        }))?);
    }
    let mut table = table_with_header(vec!["Frames", "Count", "Share"]);
    table.add_row(vec!["Total".to_string(), stats.total.to_string(), "-".to_string()]);
    table.add_row(vec![
        "With frame data".to_string(),
        stats.with_data.to_string(),
        percent(stats.with_data, stats.total),
    ]);
    table.add_row(vec![
        "Set to use".to_string(),
        stats.in_use.to_string(),
        percent(stats.in_use, stats.with_data),
    ]);
    table.add_row(vec!["Cached diffs".to_string(), stats.diffs.to_string(), "-".to_string()]);
    Ok(table.to_string())
}

pub fn format_survey(rows: &[SurveyRow], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(rows)?);
    }
    let mut table = table_with_header(vec!["Trail length", "Spacing", "Points"]);
    for row in rows {
        table.add_row(vec![
            row.trail_len.to_string(),
            format!("{:.6}", 1.0 / row.trail_len as f64),
            row.points.to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_thin_report(report: &ThinReport) -> String {
    let mut out = format!(
        "Removed {} of {} frames, {} left (target {})",
        report.removed, report.starting, report.live, report.target
    );
    if report.shortfall > 0 {
        out.push_str(&format!(
            "\nShortfall: {} frames could not be removed within the spacing threshold",
            report.shortfall
        ));
    }
    if report.cancelled {
        out.push_str("\nStopped by abort file");
    }
    out
}

pub fn format_run_report(report: &RunReport) -> String {
    let mut table = table_with_header(vec!["Step", "Result"]);
    let trail = if report.traced {
        format!("traced {} points", report.trail_points)
    } else {
        format!("loaded {} points", report.trail_points)
    };
    table.add_row(vec!["Trail".to_string(), trail]);
    table.add_row(vec![
        "Frames".to_string(),
        if report.reloaded { "created" } else { "kept" }.to_string(),
    ]);
    table.add_row(vec!["Rendered".to_string(), report.rendered.to_string()]);
    table.add_row(vec!["Diffs".to_string(), report.diffs_computed.to_string()]);
    if let Some(thin) = &report.thin {
        table.add_row(vec![
            "Thinned".to_string(),
            format!("{} removed, {} live", thin.removed, thin.live),
        ]);
    }
    if let Some(written) = report.written {
        table.add_row(vec!["Written".to_string(), written.to_string()]);
    }
    if let Some(step) = report.aborted_before {
        table.add_row(vec!["Aborted before".to_string(), step.to_string()]);
    }
    table.to_string()
}
