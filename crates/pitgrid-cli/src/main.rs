//! pitgrid CLI - point-in-time grid simulations from the command line.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pitgrid_core::{aggregate, partition, Metric, NodeStatus, SkySpec};
use pitgrid_engine::grid_io::{
    concat_values, load_work_units, read_chunk_results, read_redist_info, write_chunk_grids,
    write_redist_info,
};
use pitgrid_engine::{Config, Layout, PointInTimeRecipe, RunReport, RunRequest, SplitMode};

/// pitgrid - point-in-time daylight simulation over sensor grids
#[derive(Parser)]
#[command(name = "pitgrid")]
#[command(about = "Partition, ray trace and merge point-in-time grid simulations", long_about = None)]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still applies)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole recipe
    Run {
        /// Building model file
        #[arg(short, long)]
        model: PathBuf,

        /// Sky string, e.g. "cie -alt 71.6 -az 185.2 -type 0"
        #[arg(short, long)]
        sky: SkySpec,

        /// Working directory for intermediate and published files
        #[arg(short, long, default_value = "pitgrid-run")]
        workdir: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Split a grid folder into chunk sensor files
    Partition {
        /// Folder holding `_info.json` and one `{id}.pts` per grid
        #[arg(short, long)]
        grid_dir: PathBuf,

        /// Output folder for chunk files and `_redist_info.json`
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Merge chunk result files back into one file per grid
    Merge {
        /// Folder of `{full_id}.res` chunk results
        #[arg(short, long)]
        results: PathBuf,

        /// `_redist_info.json` written when partitioning
        #[arg(short = 'i', long)]
        redist_info: PathBuf,

        /// Output folder for `{grid}.res`
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// Config values settable from the command line.
#[derive(Args)]
struct Overrides {
    /// Maximum number of parallel workers
    #[arg(long)]
    cpu_count: Option<usize>,

    /// Minimum sensors per chunk; takes precedence over cpu-count
    #[arg(long)]
    min_sensor_count: Option<usize>,

    /// Maximum sensors per chunk with --split fixed
    #[arg(long)]
    sensor_count: Option<usize>,

    /// Chunk sizing mode: balanced or fixed
    #[arg(long)]
    split: Option<SplitMode>,

    /// illuminance, irradiance, luminance or radiance
    #[arg(long)]
    metric: Option<Metric>,

    /// Grid identifier or pattern
    #[arg(long)]
    grid_filter: Option<String>,

    /// Ray tracing parameters
    #[arg(long, allow_hyphen_values = true)]
    radiance_parameters: Option<String>,

    /// Skip the visualization export
    #[arg(long)]
    no_visualize: bool,

    /// External simulation command
    #[arg(long)]
    tool: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.cpu_count {
            config.cpu_count = v;
        }
        if let Some(v) = self.min_sensor_count {
            config.min_sensor_count = v;
        }
        if let Some(v) = self.sensor_count {
            config.sensor_count = v;
        }
        if let Some(v) = self.split {
            config.split = v;
        }
        if let Some(v) = self.metric {
            config.metric = v;
        }
        if let Some(v) = self.grid_filter {
            config.grid_filter = v;
        }
        if let Some(v) = self.radiance_parameters {
            config.radiance_parameters = v;
        }
        if self.no_visualize {
            config.visualize = false;
        }
        if let Some(v) = self.tool {
            config.tool = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "pitgrid=debug" } else { "pitgrid=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let base = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Run {
            model,
            sky,
            workdir,
            overrides,
        } => {
            let config = configure(base, overrides)?;
            run(config, model, sky, workdir).await?;
        }
        Commands::Partition {
            grid_dir,
            out,
            overrides,
        } => {
            let config = configure(base, overrides)?;
            partition_folder(&config, &grid_dir, &out).await?;
        }
        Commands::Merge {
            results,
            redist_info,
            out,
        } => {
            merge_folder(&results, &redist_info, &out).await?;
        }
    }

    Ok(())
}

fn configure(mut config: Config, overrides: Overrides) -> Result<Config, Box<dyn std::error::Error>> {
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(
    config: Config,
    model: PathBuf,
    sky: SkySpec,
    workdir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let recipe = PointInTimeRecipe::honeybee(&config);
    let order: Vec<String> = recipe
        .build(&config)?
        .execution_order()
        .into_iter()
        .map(String::from)
        .collect();

    let request = RunRequest {
        model,
        sky,
        workdir: workdir.clone(),
    };
    let report = recipe.run(&config, &request).await?;

    print_report(&report, &order);
    if let Some(error) = report.error {
        return Err(error.into());
    }

    println!();
    println!(
        "Results ({}): {}",
        config.metric.unit(),
        Layout::new(&workdir).results_dir().display()
    );
    Ok(())
}

async fn partition_folder(
    config: &Config,
    grid_dir: &Path,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let units = load_work_units(grid_dir).await?;
    let manifest = partition(&units, config.partition_strategy())?;
    write_chunk_grids(&manifest, out).await?;
    write_redist_info(&manifest, &out.join("_redist_info.json")).await?;

    println!("Chunks ({}):", manifest.len());
    println!("{:<32}  {:<24}  {:>8}  {:>8}", "FULL ID", "GRID", "START", "COUNT");
    println!("{}", "-".repeat(80));
    for chunk in manifest.chunks() {
        println!(
            "{:<32}  {:<24}  {:>8}  {:>8}",
            chunk.full_id(),
            chunk.id.work_unit.as_str(),
            chunk.start,
            chunk.count
        );
    }
    Ok(())
}

async fn merge_folder(
    results: &Path,
    redist_info: &Path,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = read_redist_info(redist_info).await?;
    let chunk_results = read_chunk_results(results).await?;
    let merged = aggregate(&chunk_results, &manifest)?;

    for result in &merged {
        let path = out.join(format!("{}.res", result.work_unit));
        let sources: Vec<PathBuf> = manifest
            .chunks_of(&result.work_unit)
            .map(|chunk| results.join(chunk.result_file()))
            .collect();
        concat_values(&sources, &path).await?;
        info!(work_unit = %result.work_unit, values = result.len(), "Wrote merged result");
    }

    println!("Merged {} chunks into {} grids:", chunk_results.len(), merged.len());
    for result in &merged {
        println!("  {:<24}  {:>8} values", result.work_unit.as_str(), result.len());
    }
    Ok(())
}

fn print_report(report: &RunReport, order: &[String]) {
    println!("Run {} ({} ms):", report.run_id, report.duration_ms());
    println!("{:<24}  {:<10}", "NODE", "STATUS");
    println!("{}", "-".repeat(40));
    for node in order {
        println!("{:<24}  {:<10}", node, status_name(report.status(node)));
    }
    for (node, error) in &report.soft_failures {
        println!("warning: {} failed: {}", node, error);
    }
}

fn status_name(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "PENDING",
        NodeStatus::Running => "RUNNING",
        NodeStatus::Completed => "COMPLETED",
        NodeStatus::Failed => "FAILED",
        NodeStatus::Skipped => "SKIPPED",
    }
}
