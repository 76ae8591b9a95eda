use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use llm_relay::{
    api::UploadResponse,
    config,
    logging,
    processing::{BatchReport, DocumentOutcome, DocumentPipeline, UploadedFile},
};
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "llm-relay-scan",
    about = "Extract and redact local documents with the relay pipeline"
)]
struct Cli {
    /// Descend into subdirectories.
    #[arg(long, short)]
    recursive: bool,
    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
    /// Files or directories to scan.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_cli_tracing();
    let config = config::load().context("failed to load configuration")?;
    let pipeline = DocumentPipeline::new(config.extraction, &config.pii);

    let paths = collect_files(&cli.paths, cli.recursive)?;
    if paths.is_empty() {
        bail!("no files found");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for batch in paths.chunks(pipeline.limits().max_files) {
        let outcomes = batch
            .iter()
            .map(|path| scan_file(&pipeline, path))
            .collect::<Result<Vec<_>>>()?;
        let report = BatchReport::from_outcomes(outcomes);
        tracing::info!(
            total = report.summary.total_files,
            failed = report.summary.failed,
            "Scanned batch"
        );
        let response = UploadResponse::new(Uuid::new_v4(), &report);
        let rendered = if cli.pretty {
            serde_json::to_string_pretty(&response)?
        } else {
            serde_json::to_string(&response)?
        };
        writeln!(out, "{rendered}")?;
    }
    Ok(())
}

fn collect_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }
        let walker = WalkDir::new(path).sort_by_file_name();
        let walker = if recursive {
            walker
        } else {
            walker.max_depth(1)
        };
        for entry in walker {
            let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Run one file through the pipeline. Files over the byte cap are rejected from their metadata
/// without being read.
fn scan_file(pipeline: &DocumentPipeline, path: &Path) -> Result<DocumentOutcome> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let size = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    if let Some(rejected) = pipeline.reject_oversized(&filename, size) {
        return Ok(rejected);
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(pipeline.process_file(&UploadedFile::new(filename, None, bytes)))
}
