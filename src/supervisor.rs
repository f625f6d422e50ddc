// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Transcoder supervisor (§4.F): spawns/monitors/kills per-camera
//! transcoder children and owns their HLS working directories.

use crate::child::ManagedChild;
use crate::config::EncoderPolicy;
use crate::encoder::EncoderSelector;
use crate::events::{Event, EventBus};
use crate::source::{self, Source};
use base::Error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

const STOP_GRACE: Duration = Duration::from_secs(2);
const SEGMENT_SECONDS: u32 = 2;
const PLAYLIST_SEGMENTS: u32 = 6;

/// Sent through `StreamSession::stop_tx` to ask the watcher task to stop
/// the child; the watcher replies on the carried `StopAck` once it has.
type StopAck = oneshot::Sender<()>;
type StopSignal = oneshot::Sender<StopAck>;

struct StreamSession {
    working_dir: PathBuf,
    stop_tx: Option<StopSignal>,
}

pub struct Supervisor {
    db: db::Store,
    encoder: Arc<EncoderSelector>,
    events: EventBus,
    hls_dir: PathBuf,
    transcoder_binary: String,
    media_port: u16,
    encoder_policy: Arc<Mutex<EncoderPolicy>>,
    sessions: Arc<Mutex<HashMap<i64, StreamSession>>>,
}

impl Supervisor {
    pub fn new(
        db: db::Store,
        encoder: Arc<EncoderSelector>,
        events: EventBus,
        hls_dir: PathBuf,
        transcoder_binary: String,
        media_port: u16,
        encoder_policy: Arc<Mutex<EncoderPolicy>>,
    ) -> Self {
        Supervisor {
            db,
            encoder,
            events,
            hls_dir,
            transcoder_binary,
            media_port,
            encoder_policy,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_streaming(&self, camera_id: i64) -> bool {
        self.sessions.lock().contains_key(&camera_id)
    }

    /// Idempotent with respect to session existence (§4.F): if a session
    /// already exists, returns the same URL without spawning a new child.
    pub async fn start(&self, camera_id: i64) -> Result<String, Error> {
        if self.is_streaming(camera_id) {
            return Ok(self.hls_url(camera_id));
        }

        let camera = self.db.get_camera(camera_id).await?;
        let working_dir = self.hls_dir.join(camera_id.to_string());
        if working_dir.exists() {
            std::fs::remove_dir_all(&working_dir).map_err(Error::from)?;
        }
        std::fs::create_dir_all(&working_dir).map_err(Error::from)?;

        let src = source::resolve(&camera).await?;
        let fps = match &src {
            Source::DeviceNode { fps, .. } => *fps,
            Source::Url(_) => camera.fps.unwrap_or(15),
        };
        let policy = *self.encoder_policy.lock();
        let profile = self.encoder.select(&policy, 23).await;

        let mut args = Vec::new();
        args.push("-fflags".to_string());
        args.push("nobuffer".to_string());
        args.push("-flags".to_string());
        args.push("low_delay".to_string());
        match &src {
            Source::Url(url) => {
                if url.starts_with("rtsp://") {
                    args.push("-rtsp_transport".to_string());
                    args.push("tcp".to_string());
                }
                args.push("-i".to_string());
                args.push(url.clone());
            }
            Source::DeviceNode {
                path,
                pixel_format,
                width,
                height,
                fps,
            } => {
                args.push("-f".to_string());
                args.push("v4l2".to_string());
                args.push("-input_format".to_string());
                args.push(pixel_format.to_lowercase());
                args.push("-video_size".to_string());
                args.push(format!("{width}x{height}"));
                args.push("-framerate".to_string());
                args.push(fps.to_string());
                args.push("-i".to_string());
                args.push(path.clone());
            }
        }
        args.extend(profile.args());
        args.push("-g".to_string());
        args.push((fps.max(1) as u32 * 2).to_string());
        args.push("-c:a".to_string());
        args.push("aac".to_string());
        args.push("-ar".to_string());
        args.push("48000".to_string());
        args.push("-ac".to_string());
        args.push("2".to_string());
        args.push("-f".to_string());
        args.push("hls".to_string());
        args.push("-hls_time".to_string());
        args.push(SEGMENT_SECONDS.to_string());
        args.push("-hls_list_size".to_string());
        args.push(PLAYLIST_SEGMENTS.to_string());
        args.push("-hls_flags".to_string());
        args.push("delete_segments".to_string());
        args.push("-hls_segment_filename".to_string());
        args.push(working_dir.join("segment_%05d.ts").display().to_string());
        args.push(working_dir.join("stream.m3u8").display().to_string());

        let label = format!("stream-{camera_id}");
        let mut child = ManagedChild::spawn(label.clone(), &self.transcoder_binary, &args)?;

        // Give the child a moment to fail fast (missing binary, bad args)
        // before committing to a session, per §4.J's Starting->Running
        // transition proxy.
        tokio::time::sleep(Duration::from_millis(250)).await;

        let (stop_tx, stop_rx) = oneshot::channel::<StopAck>();
        self.sessions.lock().insert(
            camera_id,
            StreamSession {
                working_dir: working_dir.clone(),
                stop_tx: Some(stop_tx),
            },
        );

        let events = self.events.clone();
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    if sessions.lock().remove(&camera_id).is_none() {
                        return;
                    }
                    let reason = match status {
                        Ok(s) if s.success() => "transcoder exited".to_string(),
                        Ok(s) => format!("transcoder exited with {s}"),
                        Err(e) => format!("transcoder wait failed: {e}"),
                    };
                    warn!(camera_id, %reason, "stream session ended unexpectedly");
                    events.publish(Event::StreamDead { camera_id, reason });
                }
                ack_tx = stop_rx => {
                    sessions.lock().remove(&camera_id);
                    if let Ok(ack_tx) = ack_tx {
                        if let Err(e) = child.stop(STOP_GRACE).await {
                            warn!(camera_id, %e, "error stopping transcoder child");
                        }
                        let _ = ack_tx.send(());
                    }
                }
            }
        });

        info!(camera_id, "started stream session");
        Ok(self.hls_url(camera_id))
    }

    /// Signals the watcher task to stop the child through
    /// `ManagedChild::stop` (graceful SIGTERM, then SIGKILL after a grace
    /// period) and waits for it to confirm, then best-effort removes the
    /// working directory. Stopping a nonexistent session is idempotent
    /// success.
    pub async fn stop(&self, camera_id: i64) -> Result<(), Error> {
        let (stop_tx, working_dir) = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(&camera_id) else {
                return Ok(());
            };
            (session.stop_tx.take(), session.working_dir.clone())
        };
        let Some(stop_tx) = stop_tx else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
        let _ = std::fs::remove_dir_all(&working_dir);
        info!(camera_id, "stopped stream session");
        Ok(())
    }

    /// Stops every live session, for use during process shutdown (§5).
    pub async fn stop_all(&self) {
        let camera_ids: Vec<i64> = self.sessions.lock().keys().copied().collect();
        for camera_id in camera_ids {
            if let Err(e) = self.stop(camera_id).await {
                warn!(camera_id, %e, "error stopping stream session during shutdown");
            }
        }
    }

    fn hls_url(&self, camera_id: i64) -> String {
        format!("http://127.0.0.1:{}/hls/{camera_id}/stream.m3u8", self.media_port)
    }
}
