use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use ipmerge::{writer, Merger, SourcePaths};

#[derive(Parser)]
#[command(name = "ipmerge")]
#[command(about = "Merge GeoLite2, IPinfo Lite, DB-IP, and proxy datasets into one MMDB", long_about = None)]
#[command(version)]
struct Cli {
    /// Skip the external download step and use existing files under download/
    #[arg(long)]
    skip_download: bool,

    /// Output database path
    #[arg(short, long, value_name = "PATH", default_value = ipmerge::config::OUTPUT_FILE)]
    output: PathBuf,

    /// Worker thread count (0 = hardware parallelism)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("=== Merged IP Database Generator ===");
    println!("Output: {}\n", cli.output.display());

    let start = Instant::now();

    let paths = SourcePaths::default();
    if cli.skip_download {
        println!("Skipping database download (using existing files)");
    } else {
        // Fetching is an external step; all this binary can do without it
        // is verify the files are in place.
        println!("Expecting databases under download/ (fetching is a separate step)");
    }
    paths.verify_files().context("source files not ready")?;

    println!("\n=== Merging Databases ===");
    let mut merger = Merger::open(&paths)
        .context("failed to open source databases")?
        .with_workers(cli.jobs);
    merger.merge().context("merge failed")?;

    println!("\n=== Writing Output ===");
    let summary = writer::write_to_path(merger.into_tree(), &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    println!(
        "Database written: {} ({:.2} MB, {} nodes)",
        cli.output.display(),
        summary.bytes_written as f64 / 1024.0 / 1024.0,
        summary.node_count
    );

    println!("\n=== Complete ===");
    println!("Total time: {:.1?}", start.elapsed());
    Ok(())
}
