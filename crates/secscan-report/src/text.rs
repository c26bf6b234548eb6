use colored::Colorize;

use secscan_core::{OutcomeLedger, PluginRecord};

/// Format the outcome ledger for terminal output.
pub fn format_report(ledger: &OutcomeLedger) -> String {
    let mut out = String::new();

    // Header
    out.push_str(&format!("\n{}\n", "SecScan - Outcome Report".bold()));
    out.push_str(&format!("{}\n", "=".repeat(40)));

    if ledger.plugins.is_empty() {
        out.push_str(&format!("\n{}\n\n", "No plugins were run.".yellow()));
        return out;
    }

    for (name, record) in &ledger.plugins {
        out.push_str(&format_plugin_section(name, record));
    }

    // Summary
    out.push_str(&format!(
        "\n{}: {} succeeded, {} failed\n",
        "Summary".bold(),
        ledger.total_succeeded(),
        ledger.total_failed(),
    ));
    if let Some(finished) = ledger.finished_at {
        let elapsed = finished - ledger.started_at;
        out.push_str(&format!(
            "  Elapsed: {:.1}s\n",
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
    }

    if ledger.has_failures() {
        out.push_str(&format!("\n{}\n", "Some plugins reported failures.".red().bold()));
    } else {
        out.push_str(&format!("\n{}\n", "All plugins succeeded!".green().bold()));
    }

    out.push('\n');
    out
}

fn format_plugin_section(name: &str, record: &PluginRecord) -> String {
    let mut out = String::new();

    let failed_count = if record.failed.is_empty() {
        record.failed.len().to_string().normal()
    } else {
        record.failed.len().to_string().red()
    };
    out.push_str(&format!(
        "\n{} ({} succeeded, {} failed)\n{}\n",
        name.bold(),
        record.succeeded.len().to_string().green(),
        failed_count,
        "-".repeat(40),
    ));

    if record.is_empty() {
        out.push_str("  (no artifacts processed)\n");
        return out;
    }
    for artifact in &record.succeeded {
        out.push_str(&format!("  {} {artifact}\n", "OK".green().bold()));
    }
    for artifact in &record.failed {
        out.push_str(&format!("  {} {artifact}\n", "FAIL".red().bold()));
    }

    out
}
