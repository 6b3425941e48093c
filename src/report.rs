/*!
 * Terminal summary of a pipeline run
 */

use crate::pipeline::PipelineSummary;
use crate::stats::format_duration;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

/// Key-value table of run statistics
pub fn summary_table(summary: &PipelineSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let status = if summary.cancelled {
        "interrupted"
    } else {
        "complete"
    };
    let rows = [
        ("Status", status.to_string()),
        ("Selected pairs", summary.selected_pairs.to_string()),
        ("Unique routes", summary.unique_routes.to_string()),
        ("Generated", summary.routes_generated.to_string()),
        ("Failed", summary.routes_failed.to_string()),
        (
            "Skipped (no coordinates)",
            summary.skipped_missing_coordinates.to_string(),
        ),
        ("HTTP requests", summary.total_requests.to_string()),
        ("Success rate", format!("{:.2}%", summary.success_rate_pct)),
        (
            "Elapsed",
            format_duration(summary.elapsed.as_millis() as u64),
        ),
        ("Files written", summary.files_written.len().to_string()),
        ("Output", summary.output_dir.display().to_string()),
    ];

    for (key, value) in rows {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value).add_attribute(Attribute::Bold),
        ]);
    }
    table
}

/// Failures grouped by reason, or `None` when every route succeeded
pub fn failure_table(summary: &PipelineSummary) -> Option<Table> {
    let by_reason = summary.statistics.failures_by_reason();
    if by_reason.is_empty() {
        return None;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Reason").add_attribute(Attribute::Bold),
            Cell::new("Routes").add_attribute(Attribute::Bold),
        ]);
    for (reason, count) in by_reason {
        table.add_row(vec![
            Cell::new(reason.to_string()).fg(Color::Yellow),
            Cell::new(count),
        ]);
    }
    Some(table)
}

pub fn print_summary(summary: &PipelineSummary) {
    println!("\nRoute generation summary");
    println!("{}", summary_table(summary));
    if let Some(failures) = failure_table(summary) {
        println!("\nFailures");
        println!("{}", failures);
    }
}
