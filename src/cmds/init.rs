// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! `camwatchd init` (§2.1): create the app-data root and an empty,
//! migrated database. Idempotent.

use crate::config;
use base::Error;
use std::path::Path;
use tracing::info;

pub async fn run(config_path: &Path) -> Result<(), Error> {
    let cfg = config::read(config_path)?;

    std::fs::create_dir_all(&cfg.app_data_root)?;
    std::fs::create_dir_all(cfg.hls_dir())?;
    std::fs::create_dir_all(cfg.recordings_dir().join("tmp"))?;
    std::fs::create_dir_all(cfg.thumbnails_dir())?;

    let store = db::Store::open(&cfg.db_path())?;
    info!(db_path = %store.db_path().display(), "database ready");
    Ok(())
}
