//! Frame extraction worker binary.
//!
//! With an event file argument the worker processes that event once and
//! exits non-zero if any record failed. Without arguments it consumes the
//! trigger stream until interrupted.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframe_media::{resolve_ffmpeg, FfmpegFrameSampler, FrameSampler};
use vframe_queue::{Notifier, NotifierConfig, RedisNotifier, TriggerQueue};
use vframe_storage::{ObjectStore, S3Store};
use vframe_worker::{metrics, process_event_file, FramePipeline, TriggerExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Already installed is fine; anything else surfaces on first TLS use
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("vframe-worker failed: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = match "vframe=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<i32> {
    info!("Starting vframe-worker");

    // Configuration problems stop the worker before any store is touched
    let config = WorkerConfig::from_env()?;
    let notifier_config = NotifierConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::install_exporter(addr)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let ffmpeg = resolve_ffmpeg(config.ffmpeg_path.as_deref())?;
    info!("Using transcoder {}", ffmpeg.display());

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::from_env().await?);
    let sampler: Arc<dyn FrameSampler> = Arc::new(FfmpegFrameSampler::new(ffmpeg));
    let notifier: Arc<dyn Notifier> = Arc::new(RedisNotifier::new(notifier_config)?);
    let pipeline = Arc::new(FramePipeline::new(config, store, sampler, Arc::clone(&notifier))?);

    if let Some(event_file) = std::env::args().nth(1) {
        let report = process_event_file(&pipeline, notifier.as_ref(), Path::new(&event_file)).await?;
        println!("{}", report.status_message());
        return Ok(if report.is_success() { 0 } else { 1 });
    }

    let queue = TriggerQueue::from_env()?;
    let executor = TriggerExecutor::new(pipeline, queue, notifier);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                warn!("Cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    executor.run(shutdown_rx).await?;

    info!("Worker shutdown complete");
    Ok(0)
}
