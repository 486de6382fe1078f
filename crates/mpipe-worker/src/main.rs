//! Media pipeline worker binary.

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mpipe_media::{HttpFetcher, ProcessToolRunner};
use mpipe_models::JobRequest;
use mpipe_storage::publisher_from_env;
use mpipe_worker::{Pipeline, PipelineConfig};

/// Run one media job and print its result as JSON.
#[derive(Debug, Parser)]
#[command(name = "mpipe-worker", version)]
struct Args {
    /// Job description file (JSON), or `-` for stdin
    #[arg(long, short)]
    job: PathBuf,

    /// Override the working directory
    #[arg(long, env = "MPIPE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("mpipe=info".parse()?);

    // Logs go to stderr; stdout carries the job result.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn read_job(path: &PathBuf) -> anyhow::Result<JobRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading job from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parsing job JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let args = Args::parse();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("invalid METRICS_ADDR")?;
        mpipe_worker::metrics::init_metrics(addr)?;
        info!("Metrics exporter listening on {}", addr);
    }

    let mut config = PipelineConfig::from_env();
    if let Some(dir) = args.work_dir {
        config = config.with_work_dir(dir);
    }
    info!("Pipeline config: {:?}", config);

    let job = read_job(&args.job)?;

    let fetcher =
        Arc::new(HttpFetcher::new(config.connect_timeout)?.allow_file_urls(config.allow_file_urls));
    let mut pipeline = Pipeline::new(config, fetcher, Arc::new(ProcessToolRunner::new()));
    if let Some(publisher) = publisher_from_env()? {
        pipeline = pipeline.with_publisher(publisher);
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling job");
            cancel_tx.send(true).ok();
        }
    });

    let result = pipeline.run(&job, cancel_rx).await;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", rendered);

    if !result.is_done() {
        std::process::exit(1);
    }
    Ok(())
}
