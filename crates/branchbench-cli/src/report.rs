use comfy_table::Table;

use branchbench_core::driver::BranchReport;

/// Timing names across all reports, in first-seen order.
fn timing_columns(reports: &[BranchReport]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for timing in reports.iter().flat_map(|r| &r.timings) {
        if !columns.contains(&timing.name.as_str()) {
            columns.push(&timing.name);
        }
    }
    columns
}

/// One row per branch, one column per timing name, values in seconds.
///
/// A timing a branch did not produce shows as `-`. A `Status` column is added
/// only when some branch failed.
pub fn render_table(reports: &[BranchReport]) -> String {
    let columns = timing_columns(reports);
    let any_failed = reports.iter().any(|r| !r.succeeded());

    let mut header = vec!["Branch"];
    header.extend(columns.iter().copied());
    if any_failed {
        header.push("Status");
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);

    for report in reports {
        let mut row = vec![report.branch.clone()];
        for column in &columns {
            let cell = report
                .timings
                .iter()
                .find(|t| t.name == *column)
                .map(|t| t.format_as_seconds())
                .unwrap_or_else(|| "-".to_string());
            row.push(cell);
        }
        if any_failed {
            row.push(if report.succeeded() { "ok" } else { "FAILED" }.to_string());
        }
        table.add_row(row);
    }

    table.to_string()
}
