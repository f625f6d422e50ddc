// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! CRUD for the `camera` table (§3 Camera entity).

use base::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    Onvif,
    Rtsp,
    Uvc,
}

impl CameraKind {
    fn as_str(self) -> &'static str {
        match self {
            CameraKind::Onvif => "onvif",
            CameraKind::Rtsp => "rtsp",
            CameraKind::Uvc => "uvc",
        }
    }

    fn from_str(s: &str) -> Result<CameraKind, Error> {
        match s {
            "onvif" => Ok(CameraKind::Onvif),
            "rtsp" => Ok(CameraKind::Rtsp),
            "uvc" => Ok(CameraKind::Uvc),
            other => Err(Error::new(
                ErrorKind::Internal,
                format!("unknown camera kind {other:?} in database"),
            )),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    pub kind: CameraKind,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub xaddr: Option<String>,
    pub stream_path: Option<String>,
    pub device_node: Option<String>,
    pub pixel_format: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub fps: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub kind: CameraKindInput,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub xaddr: Option<String>,
    pub stream_path: Option<String>,
    pub device_node: Option<String>,
    pub pixel_format: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub fps: Option<i64>,
}

/// A separate, `Default`-able mirror of `CameraKind` so `NewCamera` can
/// derive `Default` for test construction; always converted to
/// `CameraKind` before validation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKindInput {
    Onvif,
    Rtsp,
    Uvc,
}

impl Default for CameraKindInput {
    fn default() -> Self {
        CameraKindInput::Rtsp
    }
}

impl From<CameraKindInput> for CameraKind {
    fn from(k: CameraKindInput) -> CameraKind {
        match k {
            CameraKindInput::Onvif => CameraKind::Onvif,
            CameraKindInput::Rtsp => CameraKind::Rtsp,
            CameraKindInput::Uvc => CameraKind::Uvc,
        }
    }
}

impl NewCamera {
    /// Validates kind-dependent required fields (§3 Camera invariants).
    fn validate(&self) -> Result<(), Error> {
        match CameraKind::from(self.kind) {
            CameraKind::Onvif => {
                if self.host.is_none() || self.xaddr.is_none() {
                    bail_missing("onvif cameras require host and xaddr")?;
                }
            }
            CameraKind::Rtsp => {
                if self.host.is_none() || self.stream_path.is_none() {
                    bail_missing("rtsp cameras require host and stream_path")?;
                }
            }
            CameraKind::Uvc => {
                if self.device_node.is_none() {
                    bail_missing("uvc cameras require device_node")?;
                }
            }
        }
        Ok(())
    }
}

fn bail_missing(msg: &str) -> Result<(), Error> {
    Err(Error::new(ErrorKind::InvalidInput, msg))
}

fn row_to_camera(row: &rusqlite::Row) -> rusqlite::Result<Camera> {
    let kind_str: String = row.get("kind")?;
    Ok(Camera {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: CameraKind::from_str(&kind_str).unwrap_or(CameraKind::Rtsp),
        host: row.get("host")?,
        port: row.get("port")?,
        username: row.get("username")?,
        password: row.get("password")?,
        xaddr: row.get("xaddr")?,
        stream_path: row.get("stream_path")?,
        device_node: row.get("device_node")?,
        pixel_format: row.get("pixel_format")?,
        width: row.get("width")?,
        height: row.get("height")?,
        fps: row.get("fps")?,
    })
}

impl super::Store {
    pub async fn list_cameras(&self) -> Result<Vec<Camera>, Error> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("select * from camera order by id")
                .map_err(|e| Error::wrap(ErrorKind::Internal, "preparing query", e))?;
            let rows = stmt
                .query_map([], row_to_camera)
                .map_err(|e| Error::wrap(ErrorKind::Internal, "listing cameras", e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "reading camera row", e))
        })
        .await
    }

    pub async fn get_camera(&self, id: i64) -> Result<Camera, Error> {
        self.read(move |conn| {
            conn.query_row("select * from camera where id = ?1", [id], row_to_camera)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        Error::new(ErrorKind::NotFound, format!("no camera with id {id}"))
                    }
                    e => Error::wrap(ErrorKind::Internal, "fetching camera", e),
                })
        })
        .await
    }

    pub async fn add_camera(&self, new: NewCamera) -> Result<i64, Error> {
        new.validate()?;
        self.write(move |conn| -> Result<i64, Error> {
            conn.execute(
                "insert into camera (name, kind, host, port, username, password, xaddr, \
                 stream_path, device_node, pixel_format, width, height, fps) \
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    new.name,
                    CameraKind::from(new.kind).as_str(),
                    new.host,
                    new.port,
                    new.username,
                    new.password,
                    new.xaddr,
                    new.stream_path,
                    new.device_node,
                    new.pixel_format,
                    new.width,
                    new.height,
                    new.fps,
                ],
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "inserting camera", e))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Deletes the camera row and any schedules referencing it. Callers
    /// (the RPC façade) must have already torn down any live StreamSession
    /// or RecordingJob for this camera — that is an in-memory invariant the
    /// store cannot see or enforce.
    pub async fn delete_camera(&self, id: i64) -> Result<(), Error> {
        self.write(move |conn| -> Result<(), Error> {
            let tx = conn
                .transaction()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "starting delete", e))?;
            tx.execute("delete from schedule where camera_id = ?1", [id])
                .map_err(|e| Error::wrap(ErrorKind::Internal, "deleting schedules", e))?;
            let n = tx
                .execute("delete from camera where id = ?1", [id])
                .map_err(|e| Error::wrap(ErrorKind::Internal, "deleting camera", e))?;
            tx.commit()
                .map_err(|e| Error::wrap(ErrorKind::Internal, "committing delete", e))?;
            if n == 0 {
                return Err(Error::new(
                    ErrorKind::NotFound,
                    format!("no camera with id {id}"),
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
    async fn add_get_delete_round_trip() {
        let db = TestDb::new().await;
        let id = db
            .store
            .add_camera(NewCamera {
                name: "Cam1".into(),
                kind: CameraKindInput::Rtsp,
                host: Some("192.0.2.10".into()),
                stream_path: Some("/stream".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let cam = db.store.get_camera(id).await.unwrap();
        assert_eq!(cam.name, "Cam1");
        assert_eq!(cam.kind, CameraKind::Rtsp);

        db.store.delete_camera(id).await.unwrap();
        assert_eq!(db.store.get_camera(id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn onvif_camera_without_xaddr_is_rejected() {
        let db = TestDb::new().await;
        let err = db
            .store
            .add_camera(NewCamera {
                name: "Cam2".into(),
                kind: CameraKindInput::Onvif,
                host: Some("192.0.2.10".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn deleting_camera_removes_its_schedules() {
        let db = TestDb::new().await;
        let cam_id = db
            .store
            .add_camera(NewCamera {
                name: "Cam3".into(),
                kind: CameraKindInput::Rtsp,
                host: Some("192.0.2.10".into()),
                stream_path: Some("/stream".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        db.store
            .add_schedule(crate::schedule::NewSchedule {
                camera_id: cam_id,
                name: "nightly".into(),
                cron_expr: "0 9 * * *".into(),
                duration_minutes: 30,
                fps_override: None,
                enabled: true,
            })
            .await
            .unwrap();
        db.store.delete_camera(cam_id).await.unwrap();
        assert!(db.store.list_schedules().await.unwrap().is_empty());
    }
}
