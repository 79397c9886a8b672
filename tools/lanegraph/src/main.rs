use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lanegraph::{
    check_invariants, AnnotationSet, Conversion, ConversionConfig, LaneNetworkView, NetworkInput,
    NetworkStats, Stage,
};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanegraph")]
#[command(about = "Build lane-level road networks from centerline topology", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a topology into a lane network snapshot
    Convert {
        /// Topology JSON (primary ways plus optional sublayer)
        #[arg(long)]
        input: PathBuf,
        /// Traffic sign and light records (JSON)
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Conversion options (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output snapshot file
        #[arg(long)]
        output: PathBuf,
        /// Also write the lane network as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        /// Stop after this stage
        #[arg(long)]
        until: Option<Stage>,
    },
    /// List the pipeline stages in execution order
    Stages,
    /// Print per-layer statistics of a snapshot
    Inspect {
        snapshot: PathBuf,
    },
    /// Re-run the invariant checks on a snapshot
    Check {
        snapshot: PathBuf,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Convert {
            input,
            annotations,
            config,
            output,
            json,
            until,
        } => {
            let start = Instant::now();
            let config = match config {
                Some(path) => ConversionConfig::from_path(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => ConversionConfig::default(),
            };
            let topology: NetworkInput = read_json(&input)?;
            let annotations: AnnotationSet = match annotations {
                Some(path) => read_json(&path)?,
                None => AnnotationSet::default(),
            };

            let mut conversion =
                Conversion::from_input(&topology, config).context("Failed to build graph")?;
            let report = conversion
                .run_until(annotations, until.unwrap_or_else(Stage::last))
                .context("Conversion failed")?;

            for record in &report.stages {
                println!(
                    "{:<26} {:<9} {:>8.1}ms  {}",
                    record.stage.name(),
                    record.layer,
                    record.elapsed.as_secs_f64() * 1000.0,
                    record.summary
                );
            }
            for (layer, stats) in &report.stats {
                println!("{layer}: {stats}");
            }

            conversion
                .save(&output)
                .with_context(|| format!("Failed to write snapshot {}", output.display()))?;
            if let Some(path) = json {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                LaneNetworkView::new(&conversion.network)
                    .write_json(BufWriter::new(file))
                    .context("Failed to write lane network JSON")?;
            }
            println!("Total time: {:.2}s", start.elapsed().as_secs_f64());
        }
        Commands::Stages => {
            for stage in Stage::ALL {
                println!("{} ({})", stage.name(), stage.group());
                println!("    requires: {}", stage.precondition());
                println!("    ensures:  {}", stage.postcondition());
            }
        }
        Commands::Inspect { snapshot } => {
            let conversion = Conversion::load(&snapshot)
                .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;
            for (layer, graph) in conversion.network.layers() {
                println!("{layer}: {}", NetworkStats::of(graph));
            }
        }
        Commands::Check { snapshot } => {
            let conversion = Conversion::load(&snapshot)
                .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;
            let mut failed = false;
            for (layer, graph) in conversion.network.layers() {
                let result = check_invariants(graph, !graph.lanes.is_empty());
                println!(
                    "{layer}: {}/{} checks passed",
                    result.checks_passed, result.checks_run
                );
                for warning in &result.warnings {
                    println!("  warning: {warning}");
                }
                for error in &result.errors {
                    println!("  error: {error}");
                }
                failed |= !result.passed;
            }
            if failed {
                anyhow::bail!("Invariant checks failed");
            }
        }
    }

    Ok(())
}
