// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Read-only integrity check used by the `check` subcommand: reports
//! problems without mutating the database (§2.1).

use base::Error;
use std::path::Path;

#[derive(Debug, Default, serde::Serialize)]
pub struct CheckReport {
    /// Recording rows whose media file no longer exists on disk.
    pub missing_recording_files: Vec<i64>,
    /// Schedule rows referencing a camera id that no longer exists.
    pub orphan_schedules: Vec<i64>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.missing_recording_files.is_empty() && self.orphan_schedules.is_empty()
    }
}

impl super::Store {
    /// Scans recordings and schedules for inconsistencies. `recordings_dir`
    /// is used to check that each recording's file still exists.
    pub async fn check(&self, recordings_dir: &Path) -> Result<CheckReport, Error> {
        let recordings = self.list_recordings().await?;
        let schedules = self.list_schedules().await?;
        let cameras = self.list_cameras().await?;
        let camera_ids: std::collections::HashSet<i64> = cameras.iter().map(|c| c.id).collect();

        let mut report = CheckReport::default();
        for r in &recordings {
            if !recordings_dir.join(&r.filename).exists() {
                report.missing_recording_files.push(r.id);
            }
        }
        for s in &schedules {
            if !camera_ids.contains(&s.camera_id) {
                report.orphan_schedules.push(s.id);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraKindInput, NewCamera};
    use crate::recording::NewRecording;
    use crate::testutil::TestDb;

    #[tokio::test]
    async fn clean_database_reports_clean() {
        let db = TestDb::new().await;
        let dir = tempfile::tempdir().unwrap();
        let report = db.store.check(dir.path()).await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let db = TestDb::new().await;
        let dir = tempfile::tempdir().unwrap();
        db.store
            .add_camera(NewCamera {
                name: "Cam1".into(),
                kind: CameraKindInput::Rtsp,
                host: Some("192.0.2.10".into()),
                stream_path: Some("/stream".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        db.store
            .add_recording(NewRecording {
                camera_id: 1,
                filename: "missing.mp4".into(),
                start_time_secs: 0,
                end_time_secs: 1,
                thumbnail_filename: None,
            })
            .await
            .unwrap();
        let report = db.store.check(dir.path()).await.unwrap();
        assert_eq!(report.missing_recording_files, vec![1]);
    }
}
