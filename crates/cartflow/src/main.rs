use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use cartflow_bucket::MemoryBucketStore;
use cartflow_core::config::PipelineConfig;
use cartflow_core::extract::HttpExtractor;
use cartflow_core::graph::{GraphRunner, TaskGraph};
use cartflow_core::load::WarehouseLoader;
use cartflow_core::pipeline::{build_daily_graph, connect_bucket, PipelineDeps};
use cartflow_core::schedule::run_daily;
use cartflow_core::secrets::{AwsCredentials, EnvSecrets, SecretProvider, WarehouseCredentials};
use cartflow_core::transform::{transform_directory, FailurePolicy};
use cartflow_core::upload::upload_all;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod report;

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily e-commerce extract, clean, upload and load pipeline", long_about = None)]
struct Cli {
    /// Pipeline configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole graph once
    Run,
    /// Fetch resources from the source API into the raw directory
    Extract(ExtractArgs),
    /// Clean every raw CSV into the cleaned directory
    Transform(TransformArgs),
    /// Upload cleaned files to the bucket
    Upload,
    /// Run the warehouse load script
    Load,
    /// Show the task graph levels without running anything
    Plan,
    /// Run the graph every day at the configured time
    Schedule,
}

#[derive(Args, Debug, Default)]
struct ExtractArgs {
    /// Resource to fetch; repeatable. Defaults to every configured resource.
    #[arg(long = "resource")]
    resources: Vec<String>,
}

#[derive(Args, Debug, Default)]
struct TransformArgs {
    /// Stop at the first malformed file instead of reporting and continuing
    #[arg(long)]
    abort_on_error: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command completed but reported a failure.
async fn execute(cli: Cli) -> Result<bool> {
    let secrets = EnvSecrets::with_dotenv();
    let base = std::env::current_dir().context("cannot determine working directory")?;
    let config = PipelineConfig::load_or_default(cli.config.as_deref(), &base)?;
    let json = cli.json;

    match cli.command {
        Command::Run => {
            let graph = daily_graph(&config, &secrets).await?;
            let run = GraphRunner::new(config.retry).run(&graph).await?;
            report::print_run(&run, json)?;
            Ok(run.is_success())
        }
        Command::Extract(args) => {
            let mut config = config;
            if !args.resources.is_empty() {
                config.source.resources = args.resources;
                config.validate()?;
            }
            let extractor = HttpExtractor::new(&config.source, config.raw_dir.clone())?;

            let mut summaries = Vec::with_capacity(config.source.resources.len());
            for resource in &config.source.resources {
                summaries.push(extractor.fetch(resource).await?);
            }
            report::print_extracts(&summaries, json)?;
            Ok(true)
        }
        Command::Transform(args) => {
            let mut options = config.transform.clone();
            if args.abort_on_error {
                options.failure_policy = FailurePolicy::Abort;
            }
            let raw_dir = config.raw_dir.clone();
            let cleaned_dir = config.cleaned_dir.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                transform_directory(&raw_dir, &cleaned_dir, &options)
            })
            .await
            .context("transform worker panicked")??;

            report::print_transform(&outcome, json)?;
            Ok(outcome.failures.is_empty())
        }
        Command::Upload => {
            let credentials = AwsCredentials::from_provider(&secrets);
            let store = connect_bucket(&config.bucket, &credentials).await?;
            let uploaded =
                upload_all(&store, &config.cleaned_dir, &config.bucket.key_prefix).await?;
            report::print_uploads(&uploaded, json)?;
            Ok(true)
        }
        Command::Load => {
            let outcome = warehouse_loader(&config, &secrets)?.load().await?;
            if !outcome.stdout.is_empty() {
                println!("{}", outcome.stdout.trim_end());
            }
            info!("load finished");
            Ok(true)
        }
        Command::Plan => {
            let graph = plan_graph(&config, &secrets)?;
            report::print_plan(&graph, json)?;
            Ok(true)
        }
        Command::Schedule => {
            let graph = daily_graph(&config, &secrets).await?;
            info!(
                hour = config.schedule.hour,
                minute = config.schedule.minute,
                "scheduler started"
            );
            run_daily(&GraphRunner::new(config.retry), &graph, config.schedule).await?;
            Ok(true)
        }
    }
}

async fn daily_graph(config: &PipelineConfig, secrets: &dyn SecretProvider) -> Result<TaskGraph> {
    let credentials = AwsCredentials::from_provider(secrets);
    let store = connect_bucket(&config.bucket, &credentials).await?;
    let deps = PipelineDeps {
        store: Arc::new(store),
        loader: warehouse_loader(config, secrets)?,
    };
    Ok(build_daily_graph(config, deps)?)
}

fn warehouse_loader(
    config: &PipelineConfig,
    secrets: &dyn SecretProvider,
) -> Result<WarehouseLoader> {
    let credentials = WarehouseCredentials::from_provider(secrets)
        .context("warehouse credentials are required for the load stage")?;
    Ok(WarehouseLoader::new(&config.warehouse, credentials))
}

/// Same shape as the daily graph, wired to an in-memory bucket so that planning
/// needs no cloud access. Its stages are never run.
fn plan_graph(config: &PipelineConfig, secrets: &dyn SecretProvider) -> Result<TaskGraph> {
    let credentials = WarehouseCredentials::from_provider(secrets).unwrap_or_else(|_| {
        WarehouseCredentials {
            account: "<unset>".into(),
            user: "<unset>".into(),
        }
    });
    let deps = PipelineDeps {
        store: Arc::new(MemoryBucketStore::new(config.bucket.name.clone())),
        loader: WarehouseLoader::new(&config.warehouse, credentials),
    };
    Ok(build_daily_graph(config, deps)?)
}
