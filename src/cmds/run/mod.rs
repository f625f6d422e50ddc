// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! `camwatchd run` (§2.1): bind the combined media/RPC listener, register
//! schedules, and serve until a shutdown signal arrives.

use crate::config;
use crate::core::Core;
use crate::encoder::EncoderSelector;
use crate::events::EventBus;
use crate::recorder::RecordingManager;
use crate::rpc;
use crate::schedule::ScheduleEngine;
use crate::supervisor::Supervisor;
use base::{Error, ErrorKind};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Process-wide shutdown budget (§5): every session and job is asked to
/// stop and given this long, in total, before we give up waiting.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

pub async fn run(config_path: &Path) -> Result<(), Error> {
    let cfg = config::read(config_path)?;

    let (shutdown_tx, shutdown_rx) = base::shutdown::channel();
    let mut shutdown_tx = Some(shutdown_tx);

    let mut int = signal(SignalKind::interrupt())
        .map_err(|e| Error::wrap(ErrorKind::Internal, "installing SIGINT handler", e))?;
    let mut term = signal(SignalKind::terminate())
        .map_err(|e| Error::wrap(ErrorKind::Internal, "installing SIGTERM handler", e))?;

    tokio::pin! {
        let serving = serve(&cfg, shutdown_rx.clone());
    }

    tokio::select! {
        _ = int.recv() => {
            info!("received SIGINT; shutting down gracefully (send another signal to force)");
            shutdown_tx.take();
        }
        _ = term.recv() => {
            info!("received SIGTERM; shutting down gracefully (send another signal to force)");
            shutdown_tx.take();
        }
        result = &mut serving => return result,
    }

    tokio::select! {
        _ = int.recv() => Err(Error::new(ErrorKind::Internal, "immediate shutdown on second SIGINT")),
        _ = term.recv() => Err(Error::new(ErrorKind::Internal, "immediate shutdown on second SIGTERM")),
        result = &mut serving => result,
    }
}

async fn serve(cfg: &config::ConfigFile, shutdown_rx: base::shutdown::Receiver) -> Result<(), Error> {
    let db = db::Store::open(&cfg.db_path())?;

    let hls_dir = cfg.hls_dir();
    let recordings_dir = cfg.recordings_dir();
    let thumbnails_dir = cfg.thumbnails_dir();
    std::fs::create_dir_all(&hls_dir)?;
    std::fs::create_dir_all(recordings_dir.join("tmp"))?;
    std::fs::create_dir_all(&thumbnails_dir)?;

    let listener = TcpListener::bind(cfg.media_bind_addr)
        .await
        .map_err(|e| Error::wrap(ErrorKind::Internal, format!("binding {}", cfg.media_bind_addr), e))?;
    let media_port = listener
        .local_addr()
        .map_err(|e| Error::wrap(ErrorKind::Internal, "reading bound local address", e))?
        .port();

    let encoder = Arc::new(EncoderSelector::new(cfg.transcoder_binary.clone()));
    let events = EventBus::new();
    let encoder_policy = Arc::new(Mutex::new(cfg.encoder_policy));

    let supervisor = Arc::new(Supervisor::new(
        db.clone(),
        Arc::clone(&encoder),
        events.clone(),
        hls_dir.clone(),
        cfg.transcoder_binary.clone(),
        media_port,
        Arc::clone(&encoder_policy),
    ));
    let recorder = Arc::new(RecordingManager::new(
        db.clone(),
        Arc::clone(&encoder),
        events.clone(),
        recordings_dir.clone(),
        thumbnails_dir.clone(),
        cfg.transcoder_binary.clone(),
        Arc::clone(&encoder_policy),
    ));
    let schedules = Arc::new(ScheduleEngine::new(db.clone(), Arc::clone(&recorder)));
    schedules.load_all().await?;

    let core = Arc::new(Core::new(
        db,
        Arc::clone(&supervisor),
        Arc::clone(&recorder),
        Arc::clone(&schedules),
        encoder,
        events,
        encoder_policy,
        media_port,
        hls_dir,
        recordings_dir,
        thumbnails_dir,
    ));

    info!(port = media_port, "listening for media and RPC requests");

    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _peer) = accepted
                    .map_err(|e| Error::wrap(ErrorKind::Internal, "accepting connection", e))?;
                let io = TokioIo::new(stream);
                let core = Arc::clone(&core);
                let conn = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service_fn(move |req| {
                        let core = Arc::clone(&core);
                        async move { rpc::handle(req, core).await }
                    }));
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        warn!(err = %e, "connection error");
                    }
                });
            }
            _ = shutdown_rx.as_future() => break,
        }
    }

    info!("stopping streams and recordings");
    supervisor.stop_all().await;
    recorder.stop_all().await;

    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(SHUTDOWN_BUDGET) => {
            warn!("shutdown budget exceeded; dropping remaining connections");
        }
    }

    info!("exiting");
    Ok(())
}
