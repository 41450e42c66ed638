/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Balance report printed as JSON on stdout
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use debank_balance_adapter::TaskRunner;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use debank_balance_collector::{
    Aggregator, CollectorConfig, ReportMode, WorkerPool, discover_used_chains, report,
};

#[derive(Parser, Debug)]
#[command(name = "debank-balance-collector", version, about = "Collect wallet balances across chains and pools")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Only report this ticker
    #[arg(long = "ticker", value_name = "TICKER")]
    ticker: Option<String>,
    #[arg(long = "mode", value_enum)]
    mode: Option<ReportMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting debank-balance-collector"
    );

    let mut config = load_config(&args.config_path)?;
    if let Some(ticker) = args.ticker {
        config.ticker = Some(ticker);
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    config.validate().context("validate config")?;

    let wallets = config.load_wallets().context("load wallets")?;
    info!(
        wallets = wallets.len(),
        workers = config.workers,
        chains = config.chain_list().len(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let mut chains = config.chain_list();
    if chains.is_empty() {
        info!("no chains configured; discovering used chains");
        let mut runner = config
            .build_executor(shutdown.clone())
            .context("build discovery executor")?;
        chains = discover_used_chains(&mut runner, &wallets)
            .await
            .into_iter()
            .collect();
        runner.close().await;
    }
    if shutdown.is_cancelled() {
        bail!("interrupted before balance collection");
    }
    if chains.is_empty() && !config.pool_selection().enabled() {
        warn!("no chains to query and pools disabled; only wallet totals will be collected");
    }

    let pool = WorkerPool::spawn(config.workers, &shutdown, |worker_id| {
        config
            .build_executor(shutdown.clone())
            .with_context(|| format!("build executor for worker {worker_id}"))
    })?;

    let accumulator = Aggregator::new(pool)
        .with_min_usd(config.min_usd_filter())
        .run(&wallets, &chains, config.pool_selection(), config.ticker_filter())
        .await
        .context("collect balances")?;

    let summary = report::summary(&accumulator);
    info!(
        wallets = summary.wallets,
        total_balance = %summary.total_balance,
        nonzero_wallets = summary.nonzero_wallets,
        failed_queries = summary.failed_queries,
        "collection finished"
    );
    if shutdown.is_cancelled() {
        warn!("shutdown requested during collection; report is partial");
    }

    let rendered = match config.mode {
        ReportMode::Compact => {
            serde_json::to_string_pretty(&report::compact(&accumulator, &wallets))
        }
        ReportMode::Detailed => {
            serde_json::to_string_pretty(&report::detailed(
                &accumulator,
                &wallets,
                config.ticker_filter(),
            ))
        }
    }
    .context("render report")?;
    println!("{rendered}");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<CollectorConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    CollectorConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
