use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use topical::{
    config, logging,
    processing::{Document, PipelineError, SummaryKind, SummaryOptions, SummaryService},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "topical-summarize",
    about = "Summarize a text file, or every .txt/.md file under a directory"
)]
struct Cli {
    /// File or directory to summarize.
    path: PathBuf,
    /// Subject passed to the model as context.
    #[arg(long)]
    topic: Option<String>,
    /// Chunk size in characters (defaults to the backend's configured size).
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Print one JSON object per document instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    path: &'a Path,
    model: &'a str,
    kind: SummaryKind,
    chunks: usize,
    unavailable_chunks: usize,
    summary: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_cli_tracing();
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    let service = SummaryService::new(&config.backend, config.pipeline.clone())
        .context("Failed to construct summarization backend")?;

    let files = collect_inputs(&cli.path)?;
    if files.is_empty() {
        bail!("No .txt or .md files found under {}", cli.path.display());
    }

    let options = SummaryOptions {
        chunk_size: cli.chunk_size,
    };
    let mut failures = 0usize;
    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let document = Document::new(String::from_utf8_lossy(&bytes), cli.topic.clone());

        let cancel = wait_for_interrupt(tokio::signal::ctrl_c());
        match service
            .generate_summary_until(&document, options, cancel)
            .await
        {
            Ok(outcome) => {
                if cli.json {
                    let report = Report {
                        path: file,
                        model: &outcome.model,
                        kind: outcome.kind,
                        chunks: outcome.chunk_count,
                        unavailable_chunks: outcome.unavailable_chunks,
                        summary: &outcome.summary,
                    };
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    if files.len() > 1 {
                        println!("== {} ==", file.display());
                    }
                    println!("{}\n", outcome.summary);
                }
            }
            Err(PipelineError::Cancelled) => bail!("Interrupted"),
            Err(error) => {
                failures += 1;
                tracing::error!(path = %file.display(), error = %error, "Failed to summarize");
                eprintln!("{}: {error}", file.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} documents failed", files.len());
    }
    Ok(())
}

/// Resolve when `signal` fires. A handler that cannot be installed never cancels the run.
async fn wait_for_interrupt(signal: impl Future<Output = io::Result<()>>) {
    if let Err(error) = signal.await {
        tracing::warn!(error = %error, "Ctrl-C handler unavailable; summaries run to completion");
        std::future::pending::<()>().await;
    }
}

/// A single file as given, or every `.txt`/`.md` file under a directory in path order.
fn collect_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && is_text_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"))
}
