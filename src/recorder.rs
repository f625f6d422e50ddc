// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Recording manager (§4.G): runs a recorder child alongside (or
//! independent of) an active stream, and finalizes a capture into an
//! `.mp4` + thumbnail + database row.

use crate::child::ManagedChild;
use crate::config::EncoderPolicy;
use crate::encoder::EncoderSelector;
use crate::events::{Event, EventBus};
use crate::source::{self, Source};
use base::{Error, ErrorKind};
use db::recording::NewRecording;
use jiff::Timestamp;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{info, warn};

const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct StartOptions {
    pub fps_override: Option<i64>,
    pub duration_minutes: Option<i64>,
}

/// Sent through `RecordingJob::stop_tx` to ask the watcher task to stop
/// the child; the watcher replies on the carried `StopAck` once the
/// recording has been finalized.
type StopAck = oneshot::Sender<()>;
type StopSignal = oneshot::Sender<StopAck>;

struct RecordingJob {
    stop_tx: Option<StopSignal>,
}

pub struct RecordingManager {
    db: db::Store,
    encoder: Arc<EncoderSelector>,
    events: EventBus,
    recordings_dir: PathBuf,
    thumbnails_dir: PathBuf,
    transcoder_binary: String,
    encoder_policy: Arc<Mutex<EncoderPolicy>>,
    jobs: Arc<Mutex<HashMap<i64, RecordingJob>>>,
}

impl RecordingManager {
    pub fn new(
        db: db::Store,
        encoder: Arc<EncoderSelector>,
        events: EventBus,
        recordings_dir: PathBuf,
        thumbnails_dir: PathBuf,
        transcoder_binary: String,
        encoder_policy: Arc<Mutex<EncoderPolicy>>,
    ) -> Self {
        RecordingManager {
            db,
            encoder,
            events,
            recordings_dir,
            thumbnails_dir,
            transcoder_binary,
            encoder_policy,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_recording(&self, camera_id: i64) -> bool {
        self.jobs.lock().contains_key(&camera_id)
    }

    /// Cameras with an in-flight RecordingJob, for `get_recording_cameras`.
    pub fn recording_cameras(&self) -> Vec<i64> {
        self.jobs.lock().keys().copied().collect()
    }

    pub async fn start(&self, camera_id: i64, opts: StartOptions) -> Result<(), Error> {
        if self.is_recording(camera_id) {
            // Schedule-tick overlap policy (§4.I/§8): silently accept, no
            // second job. RPC callers that want an error for an explicit
            // double-start can check `is_recording` first.
            return Ok(());
        }

        let camera = self.db.get_camera(camera_id).await?;
        std::fs::create_dir_all(self.recordings_dir.join("tmp")).map_err(Error::from)?;
        std::fs::create_dir_all(&self.thumbnails_dir).map_err(Error::from)?;

        let start_secs = Timestamp::now().as_second();
        let ts_path = self
            .recordings_dir
            .join("tmp")
            .join(format!("{camera_id}_{start_secs}.ts"));

        let src = source::resolve(&camera).await?;
        let fps = opts
            .fps_override
            .or(camera.fps)
            .unwrap_or(match &src {
                Source::DeviceNode { fps, .. } => *fps,
                Source::Url(_) => 15,
            });
        let policy = *self.encoder_policy.lock();
        let profile = self.encoder.select(&policy, 23).await;

        let mut args = Vec::new();
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
                ..
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
        args.push("-f".to_string());
        args.push("mpegts".to_string());
        args.push(ts_path.display().to_string());

        let label = format!("record-{camera_id}");
        let mut child = ManagedChild::spawn(label, &self.transcoder_binary, &args)?;

        let (stop_tx, stop_rx) = oneshot::channel::<StopAck>();
        self.jobs
            .lock()
            .insert(camera_id, RecordingJob { stop_tx: Some(stop_tx) });

        if let Some(minutes) = opts.duration_minutes {
            let manager_for_timer = self.clone_handles();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs((minutes.max(0) as u64) * 60)).await;
                // A no-op if the job was already stopped explicitly or
                // crashed in the meantime (`stop` is idempotent).
                if let Err(e) = manager_for_timer.stop(camera_id).await {
                    warn!(camera_id, %e, "error stopping recording after scheduled duration");
                }
            });
        }

        let jobs = Arc::clone(&self.jobs);
        let manager = self.clone_handles();
        let ts_path_for_watch = ts_path.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    if jobs.lock().remove(&camera_id).is_none() {
                        return;
                    }
                    match status {
                        Ok(s) if s.success() => {
                            manager.finish(camera_id, ts_path_for_watch).await;
                        }
                        other => {
                            warn!(camera_id, ?other, "recorder child crashed; leaving .ts behind");
                        }
                    }
                }
                ack_tx = stop_rx => {
                    jobs.lock().remove(&camera_id);
                    if let Ok(ack_tx) = ack_tx {
                        if let Err(e) = child.stop(STOP_GRACE).await {
                            warn!(camera_id, %e, "error stopping recorder child");
                        }
                        manager.finish(camera_id, ts_path_for_watch).await;
                        let _ = ack_tx.send(());
                    }
                }
            }
        });

        info!(camera_id, "started recording job");
        Ok(())
    }

    /// Stops an in-flight recording by signaling the watcher task through
    /// `ManagedChild::stop` and waiting for it to finalize. A no-op
    /// (success) if no job exists, or if another caller (an explicit stop
    /// racing the duration timer) already claimed it, per §7's "recording
    /// stop when no job exists is idempotent".
    pub async fn stop(&self, camera_id: i64) -> Result<(), Error> {
        let stop_tx = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(&camera_id) else {
                return Ok(());
            };
            job.stop_tx.take()
        };
        let Some(stop_tx) = stop_tx else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
        Ok(())
    }

    /// Stops every in-flight recording job, for use during process
    /// shutdown (§5).
    pub async fn stop_all(&self) {
        let camera_ids: Vec<i64> = self.jobs.lock().keys().copied().collect();
        for camera_id in camera_ids {
            if let Err(e) = self.stop(camera_id).await {
                warn!(camera_id, %e, "error stopping recording job during shutdown");
            }
        }
    }

    fn clone_handles(&self) -> RecordingManager {
        RecordingManager {
            db: self.db.clone(),
            encoder: Arc::clone(&self.encoder),
            events: self.events.clone(),
            recordings_dir: self.recordings_dir.clone(),
            thumbnails_dir: self.thumbnails_dir.clone(),
            transcoder_binary: self.transcoder_binary.clone(),
            encoder_policy: Arc::clone(&self.encoder_policy),
            jobs: Arc::clone(&self.jobs),
        }
    }

    /// Remux, thumbnail, insert row, delete `.ts`, emit event (§4.G steps
    /// 2-6). Failures after the child exit leave the `.ts` behind and are
    /// logged rather than propagated, since this runs from a detached
    /// watcher/timer task with no caller to return an error to.
    async fn finish(&self, camera_id: i64, ts_path: PathBuf) {
        self.jobs.lock().remove(&camera_id);
        if let Err(e) = self.finish_inner(camera_id, &ts_path).await {
            warn!(camera_id, %e, "failed to finalize recording; leaving .ts in place");
        }
    }

    async fn finish_inner(&self, camera_id: i64, ts_path: &PathBuf) -> Result<(), Error> {
        let start_secs: i64 = ts_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('_').next())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::new(ErrorKind::Internal, "malformed temp recording filename"))?;
        let end_secs = Timestamp::now().as_second();

        let filename = format!("{camera_id}_{start_secs}.mp4");
        let mp4_path = self.recordings_dir.join(&filename);
        let status = Command::new(&self.transcoder_binary)
            .args([
                "-y",
                "-i",
                &ts_path.display().to_string(),
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                &mp4_path.display().to_string(),
            ])
            .status()
            .await
            .map_err(|e| Error::wrap(ErrorKind::ProcessFailed, "remuxing recording", e))?;
        if !status.success() {
            return Err(Error::new(
                ErrorKind::ProcessFailed,
                format!("remux exited with {status}"),
            ));
        }

        let thumbnail_filename = format!("{camera_id}_{start_secs}.jpg");
        let thumbnail_path = self.thumbnails_dir.join(&thumbnail_filename);
        let thumb_status = Command::new(&self.transcoder_binary)
            .args([
                "-y",
                "-ss",
                "1",
                "-i",
                &mp4_path.display().to_string(),
                "-frames:v",
                "1",
                "-vf",
                "scale=320:180:force_original_aspect_ratio=decrease",
                &thumbnail_path.display().to_string(),
            ])
            .status()
            .await
            .map_err(|e| Error::wrap(ErrorKind::ProcessFailed, "generating thumbnail", e))?;
        let thumbnail_filename = if thumb_status.success() {
            Some(thumbnail_filename)
        } else {
            warn!(camera_id, "thumbnail generation failed; recording row will have none");
            None
        };

        let recording_id = self
            .db
            .add_recording(NewRecording {
                camera_id,
                filename,
                start_time_secs: start_secs,
                end_time_secs: end_secs,
                thumbnail_filename,
            })
            .await?;

        let _ = tokio::fs::remove_file(ts_path).await;

        self.events.publish(Event::RecordingFinalized {
            recording_id,
            camera_id,
        });
        info!(camera_id, recording_id, "finalized recording");
        Ok(())
    }

    /// Removes the media file, the thumbnail, then the row, in that order;
    /// missing files are tolerated (§4.G `delete`).
    pub async fn delete(&self, recording_id: i64) -> Result<(), Error> {
        let recording = self.db.get_recording(recording_id).await?;
        let media_path = self.recordings_dir.join(&recording.filename);
        let _ = tokio::fs::remove_file(&media_path).await;
        if let Some(thumb) = &recording.thumbnail_filename {
            let _ = tokio::fs::remove_file(self.thumbnails_dir.join(thumb)).await;
        }
        self.db.delete_recording(recording_id).await
    }
}
