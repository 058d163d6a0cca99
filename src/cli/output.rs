//! Output formatting for the migration CLI

use aircraft_history::migration::progress::format_number;
use aircraft_history::{MigrationProgress, ValidationReport};

/// Final summary of a migration run
pub fn format_summary(progress: &MigrationProgress) -> String {
    let mut output = String::new();

    output.push_str("\n✅ Migration complete\n");
    output.push_str(&format!(
        "  Files processed:  {}/{}\n",
        format_number(progress.files_processed as u64),
        format_number(progress.files_total as u64)
    ));
    if progress.files_skipped > 0 {
        output.push_str(&format!(
            "  Files skipped:    {}\n",
            format_number(progress.files_skipped as u64)
        ));
    }
    output.push_str(&format!(
        "  Records loaded:   {}\n",
        format_number(progress.records_loaded)
    ));
    output.push_str(&format!(
        "  Records inserted: {}\n",
        format_number(progress.records_inserted)
    ));
    if progress.batches_failed > 0 {
        output.push_str(&format!(
            "  ⚠️  Batches rolled back: {}\n",
            progress.batches_failed
        ));
    }
    output.push_str(&format!(
        "  Duration:         {} ({:.0} records/s)\n",
        progress.duration_string(),
        progress.throughput()
    ));

    output
}

/// Validation report block
pub fn format_report(report: &ValidationReport) -> String {
    format!("\n📊 Validation\n{}\n", indent(&report.to_string()))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
