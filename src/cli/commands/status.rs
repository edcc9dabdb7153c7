//! Status command.

use console::style;

use crate::layout::{DirectoryLayout, Stage};
use crate::status::collect_status;

/// Show files per stage, orphans and manifest totals.
pub async fn cmd_status(layout: &DirectoryLayout) -> anyhow::Result<()> {
    if !layout.inbox.exists() {
        println!(
            "{} No inbox at {}. Run 'scanbox init' first.",
            style("!").yellow(),
            layout.inbox.display()
        );
        return Ok(());
    }

    let report = collect_status(layout).await?;

    println!("\n{}", style("scanbox Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Inbox:", layout.inbox.display());
    for stage in Stage::all() {
        println!("{:<20} {}", format!("  {}:", stage.as_str()), report.count(stage));
    }
    println!(
        "{:<20} {} ({} processed, {} failed)",
        "Manifest entries:",
        report.manifest_total(),
        report.manifest_processed,
        report.manifest_failed
    );

    if !report.orphans.is_empty() {
        println!(
            "\n{} {} file(s) stuck in processing:",
            style("!").yellow(),
            report.orphans.len()
        );
        for name in &report.orphans {
            println!("  {} {}", style("→").dim(), name);
        }
        println!("  Move them back to inbox/ to retry, or to failed/ to give up.");
    }

    Ok(())
}
