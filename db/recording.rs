// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! CRUD for the `recording` table (§3 Recording entity). Rows are only
//! ever inserted by the recording manager's finalize step (§4.G); there is
//! no "in-progress" row.

use base::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recording {
    pub id: i64,
    pub camera_id: i64,
    pub filename: String,
    pub start_time_secs: i64,
    pub end_time_secs: i64,
    pub thumbnail_filename: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewRecording {
    pub camera_id: i64,
    pub filename: String,
    pub start_time_secs: i64,
    pub end_time_secs: i64,
    pub thumbnail_filename: Option<String>,
}

fn row_to_recording(row: &rusqlite::Row) -> rusqlite::Result<Recording> {
    Ok(Recording {
        id: row.get("id")?,
        camera_id: row.get("camera_id")?,
        filename: row.get("filename")?,
        start_time_secs: row.get("start_time_secs")?,
        end_time_secs: row.get("end_time_secs")?,
        thumbnail_filename: row.get("thumbnail_filename")?,
    })
}

impl super::Store {
    pub async fn list_recordings(&self) -> Result<Vec<Recording>, Error> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("select * from recording order by start_time_secs desc")
                .map_err(|e| Error::wrap(ErrorKind::Internal, "preparing query", e))?;
            let rows = stmt
                .query_map([], row_to_recording)
                .map_err(|e| Error::wrap(ErrorKind::Internal, "listing recordings", e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "reading recording row", e))
        })
        .await
    }

    pub async fn get_recording(&self, id: i64) -> Result<Recording, Error> {
        self.read(move |conn| {
            conn.query_row("select * from recording where id = ?1", [id], row_to_recording)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        Error::new(ErrorKind::NotFound, format!("no recording with id {id}"))
                    }
                    e => Error::wrap(ErrorKind::Internal, "fetching recording", e),
                })
        })
        .await
    }

    /// Inserts a finalized recording row. `end_time_secs >= start_time_secs`
    /// is enforced by a check constraint in the schema.
    pub async fn add_recording(&self, new: NewRecording) -> Result<i64, Error> {
        if new.end_time_secs < new.start_time_secs {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "recording end_time must be >= start_time",
            ));
        }
        self.write(move |conn| -> Result<i64, Error> {
            conn.execute(
                "insert into recording (camera_id, filename, start_time_secs, end_time_secs, \
                 thumbnail_filename) values (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    new.camera_id,
                    new.filename,
                    new.start_time_secs,
                    new.end_time_secs,
                    new.thumbnail_filename,
                ],
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "inserting recording", e))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Deletes the row. Media/thumbnail file removal is the caller's
    /// responsibility (§4.G `delete`: file, then thumbnail, then row).
    pub async fn delete_recording(&self, id: i64) -> Result<(), Error> {
        self.write(move |conn| -> Result<(), Error> {
            let n = conn
                .execute("delete from recording where id = ?1", [id])
                .map_err(|e| Error::wrap(ErrorKind::Internal, "deleting recording", e))?;
            if n == 0 {
                return Err(Error::new(
                    ErrorKind::NotFound,
                    format!("no recording with id {id}"),
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
    async fn rejects_end_before_start() {
        let db = TestDb::new().await;
        let err = db
            .store
            .add_recording(NewRecording {
                camera_id: 1,
                filename: "x.mp4".into(),
                start_time_secs: 100,
                end_time_secs: 50,
                thumbnail_filename: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn insert_list_delete_round_trip() {
        let db = TestDb::new().await;
        let id = db
            .store
            .add_recording(NewRecording {
                camera_id: 1,
                filename: "1_123.mp4".into(),
                start_time_secs: 100,
                end_time_secs: 200,
                thumbnail_filename: Some("1_123.jpg".into()),
            })
            .await
            .unwrap();
        assert_eq!(db.store.list_recordings().await.unwrap().len(), 1);
        db.store.delete_recording(id).await.unwrap();
        assert!(db.store.list_recordings().await.unwrap().is_empty());
    }
}
