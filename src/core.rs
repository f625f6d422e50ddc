// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! The process-wide component aggregate (§9 "global mutable state": model
//! singletons as values threaded through the RPC façade, not ambient
//! globals). Constructed once in `cmds::run` and handed to the RPC façade.

use crate::config::EncoderPolicy;
use crate::encoder::EncoderSelector;
use crate::events::EventBus;
use crate::recorder::RecordingManager;
use crate::schedule::ScheduleEngine;
use crate::supervisor::Supervisor;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Core {
    pub db: db::Store,
    pub supervisor: Arc<Supervisor>,
    pub recorder: Arc<RecordingManager>,
    pub schedules: Arc<ScheduleEngine>,
    pub encoder: Arc<EncoderSelector>,
    pub events: EventBus,
    pub encoder_policy: Arc<Mutex<EncoderPolicy>>,
    pub media_port: u16,
    pub hls_dir: PathBuf,
    pub recordings_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
}

impl Core {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: db::Store,
        supervisor: Arc<Supervisor>,
        recorder: Arc<RecordingManager>,
        schedules: Arc<ScheduleEngine>,
        encoder: Arc<EncoderSelector>,
        events: EventBus,
        encoder_policy: Arc<Mutex<EncoderPolicy>>,
        media_port: u16,
        hls_dir: PathBuf,
        recordings_dir: PathBuf,
        thumbnails_dir: PathBuf,
    ) -> Self {
        Core {
            db,
            supervisor,
            recorder,
            schedules,
            encoder,
            events,
            encoder_policy,
            media_port,
            hls_dir,
            recordings_dir,
            thumbnails_dir,
        }
    }

    /// Stops any live session/job for `camera_id` and unregisters its
    /// schedules before a camera row is deleted, per §3 Camera lifecycle
    /// and §8's invariant that deleting a camera never leaves an orphan
    /// background task running against it. The store itself cannot do
    /// this: `ScheduleEngine.registrations` is in-memory state the DB
    /// layer has no visibility into, so the cascade-delete of the
    /// camera's `schedule` rows has to be paired with an explicit
    /// `unregister` here.
    pub async fn teardown_camera(&self, camera_id: i64) -> Result<(), base::Error> {
        self.supervisor.stop(camera_id).await?;
        self.recorder.stop(camera_id).await?;
        for schedule in self.db.list_schedules().await? {
            if schedule.camera_id == camera_id {
                self.schedules.unregister(schedule.id);
            }
        }
        Ok(())
    }
}
