// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! `camwatchd check` (§2.1): open the database and report integrity
//! issues without making any changes.

use crate::config;
use base::Error;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(config_path: &Path) -> Result<(), Error> {
    let cfg = config::read(config_path)?;
    let store = db::Store::open(&cfg.db_path())?;

    let report = store.check(&cfg.recordings_dir()).await?;

    if report.is_clean() {
        info!("database is clean");
        return Ok(());
    }

    for id in &report.missing_recording_files {
        warn!(recording_id = id, "recording file missing on disk");
    }
    for id in &report.orphan_schedules {
        warn!(schedule_id = id, "schedule references a deleted camera");
    }
    warn!(
        missing_files = report.missing_recording_files.len(),
        orphan_schedules = report.orphan_schedules.len(),
        "check found inconsistencies"
    );
    Ok(())
}
