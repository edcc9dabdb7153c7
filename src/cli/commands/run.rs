//! Run command: one pipeline pass over the inbox.

use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{env_lookup, Config, LoadOptions, Settings};
use crate::extraction::VisionClient;
use crate::pipeline::{Pipeline, PipelineEvent};

pub async fn cmd_run(
    config: &Config,
    options: &LoadOptions,
    cwd: &Path,
    batch_json: Option<&Path>,
) -> anyhow::Result<()> {
    // Credential problems must surface before any directory is created.
    let settings = Settings::resolve(config, options.root.as_deref(), cwd, env_lookup)?;

    let client = VisionClient::new(settings.vision.clone())?;
    let mut pipeline = Pipeline::new(settings.layout.clone(), Arc::new(client));
    if let Some(path) = batch_json {
        pipeline = pipeline.with_batch_output(cwd.join(path));
    }

    println!(
        "{} Processing {} with {} ({})",
        style("→").cyan(),
        settings.layout.inbox.display(),
        settings.vision.provider,
        settings.vision.model
    );

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);

    let event_handler = tokio::spawn(async move {
        let mut progress: Option<ProgressBar> = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::RunStarted { total_files } => {
                    if total_files == 0 {
                        continue;
                    }
                    let bar = ProgressBar::new(total_files as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▓░"),
                    );
                    progress = Some(bar);
                }
                PipelineEvent::FileClaimed { file_name, .. } => {
                    if let Some(ref bar) = progress {
                        bar.set_message(file_name);
                    }
                }
                PipelineEvent::FileSkipped { file_name, reason } => {
                    report(
                        &progress,
                        format!("{} {} skipped: {}", style("↷").dim(), file_name, reason),
                    );
                }
                PipelineEvent::FileProcessed {
                    file_name,
                    output_path,
                    alphanumeric_chars,
                    orphaned,
                    ..
                } => {
                    let line = if orphaned {
                        format!(
                            "{} {} -> {} ({} chars, left in processing)",
                            style("!").yellow(),
                            file_name,
                            output_path.display(),
                            alphanumeric_chars
                        )
                    } else {
                        format!(
                            "{} {} -> {} ({} chars)",
                            style("✓").green(),
                            file_name,
                            output_path.display(),
                            alphanumeric_chars
                        )
                    };
                    report(&progress, line);
                }
                PipelineEvent::FileFailed {
                    file_name,
                    error,
                    orphaned,
                    ..
                } => {
                    let suffix = if orphaned { " (left in processing)" } else { "" };
                    report(
                        &progress,
                        format!("{} {}: {}{}", style("✗").red(), file_name, error, suffix),
                    );
                }
                PipelineEvent::RunCompleted { summary } => {
                    if let Some(bar) = progress.take() {
                        bar.finish_and_clear();
                    }
                    if summary.scanned == 0 {
                        println!("{} Inbox is empty", style("!").yellow());
                    }
                    println!(
                        "{} Run complete: {} processed, {} failed, {} skipped",
                        style("✓").green(),
                        summary.processed,
                        summary.failed,
                        summary.skipped
                    );
                    if summary.orphaned > 0 {
                        println!(
                            "  {} {} file(s) left in processing need attention",
                            style("!").yellow(),
                            summary.orphaned
                        );
                    }
                }
            }
        }
    });

    let result = pipeline.run(&event_tx).await;
    drop(event_tx);
    let _ = event_handler.await;
    result?;

    Ok(())
}

/// Print above the progress bar and advance it.
fn report(progress: &Option<ProgressBar>, line: String) {
    match progress {
        Some(bar) => {
            bar.println(line);
            bar.inc(1);
        }
        None => println!("{}", line),
    }
}
