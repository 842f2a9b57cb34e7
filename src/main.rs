use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use voxnote::transcribe::WorkerHandle;
use voxnote::{create_router, AppState, Config, SqliteStore, Store};

#[derive(Parser)]
#[command(name = "voxnote", about = "Durable voice note capture and transcription service")]
struct Args {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/voxnote")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg.storage.database_path).await?);

    let worker = start_worker(&cfg, Arc::clone(&store));

    let state = AppState::new(Arc::clone(&store), cfg.audio.session_config());
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Some(worker) = worker {
        worker.shutdown().await?;
    }

    Ok(())
}

#[cfg(feature = "whisper")]
fn start_worker(cfg: &Config, store: Arc<dyn Store>) -> Option<WorkerHandle> {
    let Some(model_path) = cfg.transcription.model_path.clone() else {
        warn!("No transcription model configured; worker not started");
        return None;
    };

    let engine = Box::new(voxnote::transcribe::WhisperEngine::new(model_path));
    let worker =
        voxnote::TranscriptionWorker::new(store, engine, cfg.transcription.worker_config());
    Some(worker.start())
}

#[cfg(not(feature = "whisper"))]
fn start_worker(cfg: &Config, _store: Arc<dyn Store>) -> Option<WorkerHandle> {
    if cfg.transcription.model_path.is_some() {
        warn!("Built without the whisper feature; transcription worker not started");
    }
    None
}
