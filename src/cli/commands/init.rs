//! Initialize command.

use console::style;

use crate::layout::{DirectoryLayout, Stage};

/// Create the stage and output directories.
pub async fn cmd_init(layout: &DirectoryLayout) -> anyhow::Result<()> {
    layout.ensure_directories()?;

    for stage in Stage::all() {
        println!(
            "  {} {:<12} {}",
            style("✓").green(),
            stage.as_str(),
            layout.stage_dir(stage).display()
        );
    }
    println!(
        "  {} {:<12} {}",
        style("✓").green(),
        "output",
        layout.output.display()
    );

    println!(
        "{} Initialized scanbox. Drop images into {}",
        style("✓").green(),
        layout.inbox.display()
    );

    Ok(())
}
