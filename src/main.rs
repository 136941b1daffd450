//! Command-line interface for graph-loadtest
//!
//! # Usage Examples
//!
//! ```bash
//! # 200 calls/s for 10 minutes after a 1 minute warmup
//! graph-loadtest run \
//!   --neo4j-uri bolt://localhost:7687 \
//!   --id-query "MATCH p = (:Account)-[:OWNS*3]->() RETURN [n IN nodes(p) | id(n)] AS ids LIMIT 10000" \
//!   --template "MATCH (a)-[:OWNS]->(b) WHERE id(a) = %-2\$s AND id(b) = %-1\$s RETURN b" \
//!   --qps 200 --duration 10m --warmup 1m
//!
//! # Inline ids, workload settings from YAML
//! graph-loadtest run --id-path 1,2,3 --id-path 1,4 \
//!   --template "MATCH (n) WHERE id(n) = %s RETURN n" \
//!   --config workload.yaml --summary-json summary.json
//! ```
//!
//! The process exits with status 1 when the measurement run does not complete
//! (aborted, interrupted, or failed to start).

use anyhow::Context;
use clap::{Parser, Subcommand};
use graph_loadtest::{GraphQueryWorkload, Neo4jClient, RunArgs};
use loadtest_framework::{TracingSink, Workload, WorkloadRunner};
use loadtest_sampler::IdChainSampler;
use loadtest_template::QueryTemplate;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "graph-loadtest")]
#[command(about = "Run templated graph queries at a target rate against sampled ids")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load ids, then run an optional warmup and the measurement session
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => run_load(args).await,
    }
}

async fn run_load(args: RunArgs) -> anyhow::Result<()> {
    let template = QueryTemplate::compile(&args.template)
        .with_context(|| format!("Invalid query template: {}", args.template))?;
    let workload_config = args
        .workload_config()
        .context("Invalid workload configuration")?;
    let sampler_config = args.sampler_config();

    tracing::info!(
        "Template compiled to '{}' ({} distinct slots, positions up to {})",
        template.format(),
        template.arg_count(),
        template.max_args_position()
    );

    let sampler = Arc::new(IdChainSampler::new(sampler_config.clone()));
    let inline = args.ids.inline_paths();
    if !inline.is_empty() {
        let loaded = sampler.add_paths(&inline);
        tracing::info!("Loaded {loaded} inline id paths");
    }

    let client = Arc::new(Neo4jClient::connect(&args.neo4j).await?);
    let mut workload =
        GraphQueryWorkload::new(template, sampler, client, sampler_config.rng());
    if let Some(source) = args.ids.id_source() {
        workload = workload.with_id_source(source);
    }

    let runner = Arc::new(WorkloadRunner::new(
        workload_config,
        Arc::new(workload),
        Arc::new(TracingSink),
    ));
    let shutdown_handler = setup_shutdown_handler(Arc::clone(&runner));
    let result = runner.run().await;
    shutdown_handler.abort();
    let report = result?;

    for summary in report.summaries() {
        println!("{}", summary.format_table());
    }

    if let (Some(path), Some(summary)) = (&args.summary_json, &report.measurement) {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {path:?}"))?;
        tracing::info!("Wrote measurement summary to {path:?}");
    }

    match report.final_status() {
        _ if report.passed() => Ok(()),
        Some(status) => anyhow::bail!("Load run did not complete (status: {status})"),
        None => anyhow::bail!("Load run was interrupted before it started"),
    }
}

/// Request an orderly shutdown of the runner on Ctrl+C.
fn setup_shutdown_handler<W: Workload>(runner: Arc<WorkloadRunner<W>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install CTRL+C signal handler: {e}");
            return;
        }

        tracing::info!("Received interrupt signal (Ctrl+C), shutting down");
        runner.shutdown().await;
    })
}
