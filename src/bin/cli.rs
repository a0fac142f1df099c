use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chain_runner::prelude::*;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "chain-runner")]
#[command(about = "Run chains of templated HTTP requests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single chain file
    Run {
        /// Path to the chain YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path to runner.yaml config file (default: runner.yaml next to FILE)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run all chains in a directory
    RunDir {
        /// Path to the chains directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Path to runner.yaml config file (default: <DIR>/runner.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of parallel chains (overrides config)
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Filter chains by name prefix
        #[arg(short = 'F', long)]
        filter: Option<String>,
    },

    /// List chains in a directory
    List {
        /// Path to the chains directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Validate chain files without running them
    Validate {
        /// Path to chain file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let filter = if verbose {
        "chain_runner=debug"
    } else {
        "chain_runner=info"
    };

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()
        .expect("Failed to create OTLP exporter");

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("chain-runner");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
}

#[cfg(not(feature = "otel"))]
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "chain_runner=debug"
    } else {
        "chain_runner=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    init_otel_tracing(cli.verbose);

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "chain-runner failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run { file, config } => run_single(file, config).await,
        Commands::RunDir {
            dir,
            config,
            parallel,
            filter,
        } => run_directory(dir, config, parallel, filter).await,
        Commands::List { dir } => list_chains(dir),
        Commands::Validate { path } => validate(path),
    }
}

/// Explicit config path, or `runner.yaml` in `dir` when present
fn load_config(explicit: Option<PathBuf>, dir: &Path) -> anyhow::Result<RunnerConfig> {
    let config_file = explicit.unwrap_or_else(|| dir.join("runner.yaml"));
    if config_file.exists() {
        println!("Using config: {}\n", config_file.display());
        Ok(RunnerConfig::load(&config_file)?)
    } else {
        Ok(RunnerConfig::default())
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling running chains");
            token.cancel();
        }
    });
}

async fn run_single(file: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<bool> {
    if !file.exists() {
        anyhow::bail!("Chain file not found: {}", file.display());
    }

    println!("Running chain: {}\n", file.display());

    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let config = load_config(config_path, dir)?;
    let chain = ChainLoader::load_file(&file)?;
    let executor = ChainExecutor::from_config(&config)?;

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let result = executor.run_with_cancel(&chain, token).await?;
    print_chain_result(&result);
    Ok(result.is_success())
}

#[tracing::instrument(fields(chains_dir = %dir.display()))]
async fn run_directory(
    dir: PathBuf,
    config_path: Option<PathBuf>,
    parallel: Option<usize>,
    filter: Option<String>,
) -> anyhow::Result<bool> {
    if !dir.exists() {
        tracing::error!(path = %dir.display(), "Directory not found");
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    println!("Running chains from: {}\n", dir.display());

    let mut config = load_config(config_path, &dir)?;
    if let Some(p) = parallel {
        config.parallel = p;
    }

    let executor = Arc::new(ChainExecutor::from_config(&config)?);
    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let mut runner = ChainDirectoryRunner::with_config(&dir, config)
        .executor(executor)
        .cancellation(token);
    if let Some(prefix) = filter {
        runner = runner.name_prefix(prefix);
    }

    let result = runner.run().await?;

    for run in &result.runs {
        print_chain_result(run);
    }

    println!("\n=== Summary ===\n");
    for run in &result.runs {
        let mark = if run.is_success() { "✓" } else { "✗" };
        println!("{} {} ({})", mark, run.chain_name, run.status.as_str());
    }
    for failure in &result.failures {
        println!("✗ {}: {}", failure.source, failure.error);
    }

    if !result.failures.is_empty() {
        anyhow::bail!("{} chain(s) could not be run", result.failures.len());
    }

    Ok(result.success())
}

fn list_chains(dir: PathBuf) -> anyhow::Result<bool> {
    if !dir.exists() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let chains = ChainLoader::load_directory(&dir)?;

    if chains.is_empty() {
        println!("No chains found in: {}", dir.display());
        return Ok(true);
    }

    println!("Chains in {}:\n", dir.display());

    for chain in &chains {
        let enabled = chain.steps.iter().filter(|s| s.is_enabled).count();
        println!(
            "  {} ({} steps, {} enabled)",
            chain.name,
            chain.steps.len(),
            enabled
        );
    }

    Ok(true)
}

fn validate(path: PathBuf) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let (dir, chains) = if path.is_dir() {
        (path.clone(), ChainLoader::load_directory(&path)?)
    } else {
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        (dir, vec![ChainLoader::load_file(&path)?])
    };

    if chains.is_empty() {
        println!("No chains found in: {}", path.display());
        return Ok(true);
    }

    let config_file = dir.join("runner.yaml");
    let limits = if config_file.exists() {
        RunnerConfig::load(&config_file)?.limits
    } else {
        PlanLimits::default()
    };

    for chain in &chains {
        prepare(chain, &limits)
            .map_err(|e| anyhow::anyhow!("Chain '{}' is invalid: {}", chain.name, e))?;
    }

    println!("✓ {} chain(s) validated", chains.len());
    Ok(true)
}

fn print_chain_result(result: &ChainExecutionResult) {
    println!("\n=== Chain: {} ===\n", result.chain_name);
    println!("Status: {}", result.status.as_str());
    println!("Run ID: {}\n", result.run_id);

    for step in &result.steps {
        let mark = match step.status {
            StepStatus::Success => "✓",
            StepStatus::Skipped => "-",
            StepStatus::Cancelled => "!",
            _ => "✗",
        };
        let code = step
            .status_code()
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        println!(
            "  {} {}. {}{} ({}ms, {} attempt(s))",
            mark,
            step.order,
            step.name,
            code,
            step.duration_ms,
            step.attempts.len()
        );
        if let Some(err) = &step.error {
            println!("      Error: {}", err.message);
        }
        if let Some(reason) = &step.skip_reason {
            println!("      Reason: {:?}", reason);
        }
    }
}
