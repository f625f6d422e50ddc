// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! TOML configuration file (§6.2).

use base::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderPolicy {
    Auto,
    GpuOnly,
    CpuOnly,
}

impl Default for EncoderPolicy {
    fn default() -> Self {
        EncoderPolicy::Auto
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConfigFile {
    pub app_data_root: PathBuf,

    #[serde(default = "default_media_bind_addr")]
    pub media_bind_addr: SocketAddr,

    #[serde(default = "default_transcoder_binary")]
    pub transcoder_binary: String,

    #[serde(default)]
    pub encoder_policy: EncoderPolicy,
}

fn default_media_bind_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn default_transcoder_binary() -> String {
    "ffmpeg".to_string()
}

impl ConfigFile {
    pub fn db_path(&self) -> PathBuf {
        self.app_data_root.join("db.sqlite")
    }

    pub fn hls_dir(&self) -> PathBuf {
        self.app_data_root.join("hls")
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.app_data_root.join("recordings")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.app_data_root.join("thumbnails")
    }
}

/// Reads and parses the configuration file at `path`.
pub fn read(path: &Path) -> Result<ConfigFile, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::wrap(
            ErrorKind::NotFound,
            format!("reading config file {}", path.display()),
            e,
        )
    })?;
    toml::from_str(&text).map_err(|e| {
        Error::wrap(
            ErrorKind::InvalidInput,
            format!("parsing config file {}", path.display()),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            app_data_root = "/var/lib/camwatchd"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transcoder_binary, "ffmpeg");
        assert_eq!(cfg.media_bind_addr.port(), 0);
    }

    #[test]
    fn parses_full_config() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            app_data_root = "/var/lib/camwatchd"
            media_bind_addr = "127.0.0.1:8100"
            transcoder_binary = "/usr/local/bin/ffmpeg"
            encoder_policy = "gpu_only"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.media_bind_addr.port(), 8100);
        assert!(matches!(cfg.encoder_policy, EncoderPolicy::GpuOnly));
    }
}
