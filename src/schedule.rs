// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Cron-driven schedule engine (§4.I), pinned to Asia/Tokyo per the
//! product decision recorded in SPEC_FULL.md §9.

use crate::recorder::{RecordingManager, StartOptions};
use base::{Error, ErrorKind};
use chrono::TimeZone;
use chrono_tz::Asia::Tokyo;
use cron::Schedule as CronSchedule;
use db::schedule::Schedule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct ScheduleEngine {
    db: db::Store,
    recorder: Arc<RecordingManager>,
    registrations: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl ScheduleEngine {
    pub fn new(db: db::Store, recorder: Arc<RecordingManager>) -> Self {
        ScheduleEngine {
            db,
            recorder,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Loads all schedules and registers every `enabled=true` row, per
    /// §2.1/§4.I startup behavior.
    pub async fn load_all(&self) -> Result<(), Error> {
        let schedules = self.db.list_schedules().await?;
        for s in schedules {
            if s.enabled {
                self.register(&s).await?;
            }
        }
        Ok(())
    }

    /// Re-registers a single schedule: unregisters any existing handle,
    /// then registers again if `enabled`. Called on create/edit/toggle
    /// (§4.I reconciliation policy).
    pub async fn reconcile(&self, schedule_id: i64) -> Result<(), Error> {
        self.unregister(schedule_id);
        match self.db.get_schedule(schedule_id).await {
            Ok(s) if s.enabled => self.register(&s).await,
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn unregister(&self, schedule_id: i64) {
        if let Some(handle) = self.registrations.lock().remove(&schedule_id) {
            handle.abort();
        }
    }

    async fn register(&self, schedule: &Schedule) -> Result<(), Error> {
        let normalized = normalize_cron(&schedule.cron_expr);
        let cron = CronSchedule::from_str(&normalized).map_err(|e| {
            Error::wrap(
                ErrorKind::InvalidInput,
                format!("invalid cron expression {:?}", schedule.cron_expr),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
            )
        })?;

        let schedule_id = schedule.id;
        let camera_id = schedule.camera_id;
        let duration_minutes = schedule.duration_minutes;
        let fps_override = schedule.fps_override;
        let db = self.db.clone();
        let recorder = Arc::clone(&self.recorder);

        let handle = tokio::spawn(async move {
            loop {
                let now = Tokyo.from_utc_datetime(&chrono::Utc::now().naive_utc());
                let Some(next) = cron.after(&now).next() else {
                    warn!(schedule_id, "cron expression has no future occurrences");
                    return;
                };
                let next_utc = next.with_timezone(&chrono::Utc);
                let _ = db
                    .set_schedule_next_run(schedule_id, Some(next_utc.timestamp()))
                    .await;

                let wait = (next_utc - chrono::Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(wait).await;

                if recorder.is_recording(camera_id) {
                    info!(schedule_id, camera_id, "schedule tick dropped: recording already in flight");
                    continue;
                }
                if let Err(e) = recorder
                    .start(
                        camera_id,
                        StartOptions {
                            fps_override,
                            duration_minutes: Some(duration_minutes),
                        },
                    )
                    .await
                {
                    warn!(schedule_id, camera_id, %e, "scheduled recording failed to start");
                }
            }
        });

        self.registrations.lock().insert(schedule_id, handle);
        info!(schedule_id = schedule.id, "registered schedule");
        Ok(())
    }
}

/// Stored schedules use 5-field POSIX cron (§3/§8, e.g. `"0 9 * * *"`),
/// but the `cron` crate requires a leading seconds field. Prepend one
/// when it's missing rather than requiring every caller to know this.
fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_four_field_cron() {
        assert!(CronSchedule::from_str(&normalize_cron("* * * *")).is_err());
    }

    #[test]
    fn normalizes_five_field_posix_cron() {
        // The exact worked example from SPEC_FULL.md §3/§8.
        assert_eq!(normalize_cron("0 9 * * *"), "0 0 9 * * *");
        assert!(CronSchedule::from_str(&normalize_cron("0 9 * * *")).is_ok());
    }

    #[test]
    fn leaves_six_field_cron_untouched() {
        assert_eq!(normalize_cron("0 */2 * * * *"), "0 */2 * * * *");
        assert!(CronSchedule::from_str(&normalize_cron("0 */2 * * * *")).is_ok());
    }

    #[test]
    fn weekday_range_parses() {
        // minutes hours day-of-month month day-of-week (5-field POSIX form)
        assert!(CronSchedule::from_str(&normalize_cron("0 9 * * Mon-Fri")).is_ok());
    }
}
