//! Analyze command - Ingest inventory files into a unified graph

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Args;
use pathweave_config::{ConfigOverrides, PathweaveConfig};
use pathweave_core::{Engine, GraphStatistics};
use tracing::debug;
use walkdir::WalkDir;

use super::print_info;
use crate::progress::{LoadProgress, Stage};
use crate::GlobalOptions;

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input files or directories (directories are walked recursively)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Worker threads per loader (default: number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Keep every directory attribute, not only the well-known ones
    #[arg(long)]
    import_all: bool,

    /// Output statistics as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the analyze command
pub fn execute(args: AnalyzeArgs, mut config: PathweaveConfig, global: GlobalOptions) -> Result<()> {
    let overrides = ConfigOverrides {
        workers: args.workers,
        import_all: args.import_all.then_some(true),
        log_level: None,
    };
    config.apply_overrides(&overrides);
    config.validate().context("Invalid configuration")?;

    let files = collect_inputs(&args.paths)?;
    if files.is_empty() {
        bail!("No input files found");
    }
    print_info(&format!("Ingesting {} files", files.len()), global.quiet);

    let quiet = global.quiet || args.json;
    let start = Instant::now();
    let loading = LoadProgress::new("Loading", quiet);
    let mut engine = Engine::with_defaults(config);
    let result = engine.run_with_progress(&files, loading.callback());
    let (done, expected) = loading.totals();
    debug!("Loaders reported {}/{} progress units", done, expected);
    loading.finish();
    let mut graph = result.context("Ingestion failed")?;

    let stage = Stage::start("Processing merged graph...", quiet);
    let stats = engine.post_process(&mut graph);
    stage.done(&format!(
        "Built graph in {:.2}s",
        start.elapsed().as_secs_f64()
    ));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_statistics(&stats);
    }
    Ok(())
}

/// Expand directories into the files below them, keeping explicit files.
fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            bail!("Input path does not exist: {}", path.display());
        }
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => debug!("Error walking directory: {}", e),
            }
        }
    }
    Ok(files)
}

fn print_statistics(stats: &GraphStatistics) {
    println!("Graph summary:");
    println!("  Objects: {}", stats.objects);
    println!("  Edges:   {}", stats.edges);

    if !stats.object_types.is_empty() {
        println!();
        println!("{:<28} {:>10}", "OBJECT TYPE", "COUNT");
        for count in &stats.object_types {
            println!("{:<28} {:>10}", count.name, count.count);
        }
    }

    if !stats.edge_types.is_empty() {
        println!();
        println!("{:<28} {:>10}", "EDGE TYPE", "COUNT");
        for count in &stats.edge_types {
            println!("{:<28} {:>10}", count.name, count.count);
        }
    }
}
