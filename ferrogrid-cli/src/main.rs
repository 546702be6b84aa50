use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ferrogrid_core::algo::isochrone::{self, IsochroneRequest, RequestOutcome};
use ferrogrid_core::loading::load_csv_network;
use ferrogrid_core::matrix::{ArrowSinkFactory, HeatmapMatrix};
use ferrogrid_core::{Context, Error, RoutingMode};

mod config;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ferrogrid",
    version,
    about = "Isochrones and heatmap travel-time matrices on the H3 grid"
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Threads for the per-origin searches, all cores by default
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Overrides the street network cache directory
    #[arg(long, value_name = "PATH")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare the heatmap travel-time matrix of the configured regions
    Matrix {
        /// Routing mode, overrides the configuration
        #[arg(long)]
        mode: Option<RoutingMode>,

        /// Parallel workers, overrides the configuration
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Output directory, overrides the configuration
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Compute one isochrone request given as JSON
    Isochrone {
        /// Request file
        #[arg(long, value_name = "PATH")]
        request: PathBuf,

        /// GeoJSON output file, standard output if omitted
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Error> {
    let mut config = CliConfig::load(&cli.config)?;
    if let Some(dir) = cli.cache_dir {
        config.engine.cache.dir = dir;
    }
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| Error::InvalidData(format!("Failed to configure thread pool: {e}")))?;
    }

    match cli.command {
        Command::Matrix { mode, workers, out } => {
            if let Some(mode) = mode {
                config.engine.routing.mode = mode;
            }
            if let Some(workers) = workers {
                config.engine.matrix.workers = workers;
            }
            if let Some(out) = out {
                config.output.dir = out;
            }
            run_matrix(&config)
        }
        Command::Isochrone { request, out } => run_isochrone(&config, &request, out),
    }
}

fn open_context(config: &CliConfig) -> Result<Context, Error> {
    let network = &config.network;
    let source = load_csv_network(&network.id, &network.edges, &network.nodes)?;
    Context::new(config.engine.clone(), Arc::new(source))
}

fn run_matrix(config: &CliConfig) -> Result<ExitCode, Error> {
    let regions = config.regions()?;
    if regions.is_empty() {
        return Err(Error::InvalidData("No regions configured".to_string()));
    }

    let ctx = open_context(config)?;
    let mode = ctx.config.routing.mode;
    let table = format!("{}_{}", ctx.config.matrix.table, mode.as_str());
    let factory = ArrowSinkFactory::new(&config.output.dir, &table);
    info!(
        "Preparing {table} for {} regions with {} workers",
        regions.len(),
        ctx.config.matrix.workers
    );

    let report = HeatmapMatrix::new(&ctx, &factory).run(&regions)?;
    for region in &report.regions {
        info!(
            "{}: {} of {} cells, {} rows",
            region.name, region.processed, region.cells, region.rows
        );
        for failure in &region.failures {
            error!("{}: {failure}", region.name);
        }
    }

    if report.is_success() {
        info!(
            "Wrote {} rows to {}",
            report.rows(),
            config.output.dir.display()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_isochrone(
    config: &CliConfig,
    request: &Path,
    out: Option<PathBuf>,
) -> Result<ExitCode, Error> {
    let request = IsochroneRequest::from_json(&fs::read_to_string(request)?)?;
    let ctx = open_context(config)?;

    let status = isochrone::run(&ctx, &request);
    match status.outcome {
        RequestOutcome::Completed(result) => {
            let geojson = result.to_geojson_string()?;
            match out {
                Some(path) => {
                    fs::write(&path, geojson)?;
                    info!("Isochrone {} written to {}", status.request_id, path.display());
                }
                None => println!("{geojson}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        RequestOutcome::Failed(message) => {
            error!("Isochrone {} failed: {message}", status.request_id);
            Ok(ExitCode::FAILURE)
        }
    }
}
