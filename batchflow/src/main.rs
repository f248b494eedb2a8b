use anyhow::Context;
use batchflow::config::{PipelineOptions, DEFAULT_PARTITIONS, DEFAULT_WAREHOUSE_DIR};
use batchflow::errors::BatchflowError;
use batchflow::jobs::tornadoes;
use batchflow::warehouse::LocalWarehouse;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

/// Count tornado readings per month and load them into a warehouse table
#[derive(Parser, Debug)]
#[command(name = "batchflow")]
#[command(about = "batchflow - count tornadoes per month into a warehouse table", long_about = None)]
#[command(version)]
struct Cli {
    /// Destination table, as project:dataset.table or dataset.table
    #[arg(long, env = "BATCHFLOW_OUTPUT", value_name = "TABLE")]
    output: Option<String>,

    /// Default project for unqualified table references
    #[arg(long, env = "BATCHFLOW_PROJECT")]
    project: Option<String>,

    /// Runner to execute on (direct)
    #[arg(long, env = "BATCHFLOW_RUNNER")]
    runner: Option<String>,

    /// Execution region, recorded on the run
    #[arg(long, env = "BATCHFLOW_REGION")]
    region: Option<String>,

    /// Root directory of the local warehouse
    #[arg(long, env = "BATCHFLOW_WAREHOUSE_DIR", default_value = DEFAULT_WAREHOUSE_DIR)]
    warehouse_dir: PathBuf,

    /// Parallel partitions for filtering and counting
    #[arg(long, env = "BATCHFLOW_PARTITIONS", default_value_t = DEFAULT_PARTITIONS)]
    partitions: usize,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, env = "BATCHFLOW_JSON_LOGS")]
    json_logs: bool,
}

impl Cli {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            project: self.project.clone(),
            runner: self.runner.clone(),
            region: self.region.clone(),
            output: self.output.clone(),
            warehouse_dir: self.warehouse_dir.clone(),
            partitions: self.partitions,
        }
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 2);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli
        .options()
        .validate()
        .map_err(BatchflowError::from)
        .context("invalid pipeline options")?;
    debug!(?config, "validated options");

    let warehouse = Arc::new(LocalWarehouse::new(&config.warehouse_dir));
    let result = tornadoes::run(&config, warehouse.clone(), warehouse, None)
        .await
        .with_context(|| format!("job '{}' failed", tornadoes::JOB_NAME))?;

    info!(
        state = %result.state,
        successful_loads = result.load.successful_loads.len(),
        failed_inserts = result.load.failed_inserts,
        duration_ms = result.duration_ms,
        "Pipeline state: {}",
        result.state
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);
    trace!(?cli, "parsed arguments");

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<BatchflowError>()
                .map_or(1, BatchflowError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
