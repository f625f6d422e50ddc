// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! CRUD for the `schedule` table (§3 Schedule entity). Cron parsing and
//! registration with the scheduler (§4.I) live in the `camwatchd` binary
//! crate; this module only persists the rows.

use base::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub camera_id: i64,
    pub name: String,
    pub cron_expr: String,
    pub duration_minutes: i64,
    pub fps_override: Option<i64>,
    pub enabled: bool,
    pub next_run_secs: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSchedule {
    pub camera_id: i64,
    pub name: String,
    pub cron_expr: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub fps_override: Option<i64>,
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cron_expr: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub fps_override: Option<Option<i64>>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<Schedule> {
    let enabled: i64 = row.get("enabled")?;
    Ok(Schedule {
        id: row.get("id")?,
        camera_id: row.get("camera_id")?,
        name: row.get("name")?,
        cron_expr: row.get("cron_expr")?,
        duration_minutes: row.get("duration_minutes")?,
        fps_override: row.get("fps_override")?,
        enabled: enabled != 0,
        next_run_secs: row.get("next_run_secs")?,
    })
}

impl super::Store {
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, Error> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("select * from schedule order by id")
                .map_err(|e| Error::wrap(ErrorKind::Internal, "preparing query", e))?;
            let rows = stmt
                .query_map([], row_to_schedule)
                .map_err(|e| Error::wrap(ErrorKind::Internal, "listing schedules", e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "reading schedule row", e))
        })
        .await
    }

    pub async fn get_schedule(&self, id: i64) -> Result<Schedule, Error> {
        self.read(move |conn| {
            conn.query_row("select * from schedule where id = ?1", [id], row_to_schedule)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        Error::new(ErrorKind::NotFound, format!("no schedule with id {id}"))
                    }
                    e => Error::wrap(ErrorKind::Internal, "fetching schedule", e),
                })
        })
        .await
    }

    pub async fn add_schedule(&self, new: NewSchedule) -> Result<i64, Error> {
        if new.duration_minutes <= 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "schedule duration_minutes must be > 0",
            ));
        }
        self.write(move |conn| -> Result<i64, Error> {
            conn.execute(
                "insert into schedule (camera_id, name, cron_expr, duration_minutes, \
                 fps_override, enabled, next_run_secs) values (?1, ?2, ?3, ?4, ?5, ?6, null)",
                rusqlite::params![
                    new.camera_id,
                    new.name,
                    new.cron_expr,
                    new.duration_minutes,
                    new.fps_override,
                    new.enabled as i64,
                ],
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "inserting schedule", e))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Applies a partial update. Any field present in `patch` replaces the
    /// stored value; the RPC façade is responsible for re-registering the
    /// schedule afterward (§4.I reconciliation policy).
    pub async fn update_schedule(&self, id: i64, patch: SchedulePatch) -> Result<(), Error> {
        if let Some(d) = patch.duration_minutes {
            if d <= 0 {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "schedule duration_minutes must be > 0",
                ));
            }
        }
        self.write(move |conn| -> Result<(), Error> {
            let existing = conn
                .query_row("select * from schedule where id = ?1", [id], row_to_schedule)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        Error::new(ErrorKind::NotFound, format!("no schedule with id {id}"))
                    }
                    e => Error::wrap(ErrorKind::Internal, "fetching schedule", e),
                })?;
            let name = patch.name.unwrap_or(existing.name);
            let cron_expr = patch.cron_expr.unwrap_or(existing.cron_expr);
            let duration_minutes = patch.duration_minutes.unwrap_or(existing.duration_minutes);
            let fps_override = patch.fps_override.unwrap_or(existing.fps_override);
            let enabled = patch.enabled.unwrap_or(existing.enabled);
            conn.execute(
                "update schedule set name = ?1, cron_expr = ?2, duration_minutes = ?3, \
                 fps_override = ?4, enabled = ?5, next_run_secs = null where id = ?6",
                rusqlite::params![name, cron_expr, duration_minutes, fps_override, enabled as i64, id],
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "updating schedule", e))?;
            Ok(())
        })
        .await
    }

    pub async fn set_schedule_enabled(&self, id: i64, enabled: bool) -> Result<(), Error> {
        self.update_schedule(
            id,
            SchedulePatch {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_schedule_next_run(&self, id: i64, next_run_secs: Option<i64>) -> Result<(), Error> {
        self.write(move |conn| -> Result<(), Error> {
            conn.execute(
                "update schedule set next_run_secs = ?1 where id = ?2",
                rusqlite::params![next_run_secs, id],
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "updating next_run_secs", e))?;
            Ok(())
        })
        .await
    }

    pub async fn delete_schedule(&self, id: i64) -> Result<(), Error> {
        self.write(move |conn| -> Result<(), Error> {
            let n = conn
                .execute("delete from schedule where id = ?1", [id])
                .map_err(|e| Error::wrap(ErrorKind::Internal, "deleting schedule", e))?;
            if n == 0 {
                return Err(Error::new(
                    ErrorKind::NotFound,
                    format!("no schedule with id {id}"),
                ));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestDb;

    #[tokio::test]
    async fn toggle_round_trips() {
        let db = TestDb::new().await;
        let id = db
            .store
            .add_schedule(NewSchedule {
                camera_id: 1,
                name: "nightly".into(),
                cron_expr: "0 9 * * *".into(),
                duration_minutes: 30,
                fps_override: None,
                enabled: true,
            })
            .await
            .unwrap();
        db.store.set_schedule_enabled(id, false).await.unwrap();
        assert!(!db.store.get_schedule(id).await.unwrap().enabled);
        db.store.set_schedule_enabled(id, true).await.unwrap();
        assert!(db.store.get_schedule(id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn zero_duration_rejected() {
        let db = TestDb::new().await;
        let err = db
            .store
            .add_schedule(NewSchedule {
                camera_id: 1,
                name: "bad".into(),
                cron_expr: "0 9 * * *".into(),
                duration_minutes: 0,
                fps_override: None,
                enabled: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
