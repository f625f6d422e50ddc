// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Hardware-encoder selection (§4.B). Probes the transcoder binary for
//! candidate encoders and caches an ordered preference list for the
//! process lifetime.

use crate::config::EncoderPolicy;
use parking_lot::Mutex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Candidates in descending preference order, per §4.B.
const CANDIDATES: &[&str] = &[
    "h264_nvenc",
    "h264_qsv",
    "h264_amf",
    "h264_vaapi",
    "h264_videotoolbox",
    "libx264",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Codec {
    Nvenc,
    Qsv,
    Amf,
    Vaapi,
    VideoToolbox,
    SoftwareX264,
}

impl Codec {
    fn ffmpeg_name(self) -> &'static str {
        match self {
            Codec::Nvenc => "h264_nvenc",
            Codec::Qsv => "h264_qsv",
            Codec::Amf => "h264_amf",
            Codec::Vaapi => "h264_vaapi",
            Codec::VideoToolbox => "h264_videotoolbox",
            Codec::SoftwareX264 => "libx264",
        }
    }

    fn from_ffmpeg_name(s: &str) -> Option<Codec> {
        Some(match s {
            "h264_nvenc" => Codec::Nvenc,
            "h264_qsv" => Codec::Qsv,
            "h264_amf" => Codec::Amf,
            "h264_vaapi" => Codec::Vaapi,
            "h264_videotoolbox" => Codec::VideoToolbox,
            "libx264" => Codec::SoftwareX264,
            _ => return None,
        })
    }

    fn is_hardware(self) -> bool {
        !matches!(self, Codec::SoftwareX264)
    }
}

/// A chosen encoder profile plus the CLI arguments to pass to the
/// transcoder for a given output fps (GOP size depends on fps, §4.F).
#[derive(Clone, Debug)]
pub struct EncoderProfile {
    pub codec: Codec,
    pub crf_or_cq: u32,
}

impl EncoderProfile {
    /// Returns the codec + rate-control + pixel format argument set. GOP
    /// size and I/O-specific flags are added by the caller (§4.F step 4).
    pub fn args(&self) -> Vec<String> {
        let mut v = vec!["-c:v".to_string(), self.codec.ffmpeg_name().to_string()];
        match self.codec {
            Codec::SoftwareX264 => {
                v.push("-crf".to_string());
                v.push(self.crf_or_cq.to_string());
                v.push("-preset".to_string());
                v.push("veryfast".to_string());
            }
            _ => {
                v.push("-cq".to_string());
                v.push(self.crf_or_cq.to_string());
            }
        }
        v.push("-pix_fmt".to_string());
        v.push("yuv420p".to_string());
        v
    }
}

/// Clamps a quality setting to the `[18, 28]` range required by §4.B/§8.
pub fn clamp_quality(q: u32) -> u32 {
    q.clamp(18, 28)
}

struct ProbeResult {
    working: Vec<Codec>,
}

/// Caches the probe result for the process lifetime; a settings change
/// (policy change) invalidates it.
pub struct EncoderSelector {
    transcoder_binary: String,
    cache: Mutex<Option<ProbeResult>>,
}

impl EncoderSelector {
    pub fn new(transcoder_binary: String) -> Self {
        EncoderSelector {
            transcoder_binary,
            cache: Mutex::new(None),
        }
    }

    /// Invalidates the cached probe, forcing a re-probe on next `select`.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// The working hardware codecs' ffmpeg names, for `detect_gpu` (§6).
    pub async fn detect(&self) -> Vec<String> {
        self.probe()
            .await
            .into_iter()
            .filter(Codec::is_hardware)
            .map(|c| c.ffmpeg_name().to_string())
            .collect()
    }

    /// Chooses an encoder profile for `policy`. `quality` is the
    /// operator-requested CRF/CQ before clamping.
    pub async fn select(&self, policy: &EncoderPolicy, quality: u32) -> EncoderProfile {
        let quality = clamp_quality(quality);
        let working = self.probe().await;

        let codec = match policy {
            EncoderPolicy::CpuOnly => Codec::SoftwareX264,
            EncoderPolicy::GpuOnly => working
                .iter()
                .copied()
                .find(Codec::is_hardware)
                .unwrap_or(Codec::SoftwareX264),
            EncoderPolicy::Auto => working.first().copied().unwrap_or(Codec::SoftwareX264),
        };
        EncoderProfile {
            codec,
            crf_or_cq: quality,
        }
    }

    async fn probe(&self) -> Vec<Codec> {
        if let Some(cached) = &*self.cache.lock() {
            return cached.working.clone();
        }
        let available = self.list_encoders().await;
        let mut working = Vec::new();
        for &name in CANDIDATES {
            if !available.contains(name) {
                continue;
            }
            let Some(codec) = Codec::from_ffmpeg_name(name) else {
                continue;
            };
            if self.self_test(codec).await {
                working.push(codec);
            }
        }
        info!(?working, "encoder probe complete");
        let result = ProbeResult {
            working: working.clone(),
        };
        *self.cache.lock() = Some(result);
        working
    }

    async fn list_encoders(&self) -> Vec<String> {
        let out = Command::new(&self.transcoder_binary)
            .args(["-hide_banner", "-encoders"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;
        match out {
            Ok(o) => {
                let text = String::from_utf8_lossy(&o.stdout);
                CANDIDATES
                    .iter()
                    .filter(|c| text.contains(*c))
                    .map(|c| c.to_string())
                    .collect()
            }
            Err(e) => {
                warn!(%e, "unable to list transcoder encoders; assuming software only");
                vec!["libx264".to_string()]
            }
        }
    }

    /// Encodes ~0.5 s of a synthetic source to confirm the encoder works
    /// on this host, per §4.B.
    async fn self_test(&self, codec: Codec) -> bool {
        if codec == Codec::SoftwareX264 {
            return true;
        }
        let status = Command::new(&self.transcoder_binary)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=0.5:size=320x240:rate=10",
                "-c:v",
                codec.ffmpeg_name(),
                "-f",
                "null",
                "-",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_quality_bounds() {
        assert_eq!(clamp_quality(5), 18);
        assert_eq!(clamp_quality(50), 28);
        assert_eq!(clamp_quality(23), 23);
    }

    #[test]
    fn software_codec_uses_crf_flag() {
        let p = EncoderProfile {
            codec: Codec::SoftwareX264,
            crf_or_cq: 23,
        };
        assert!(p.args().contains(&"-crf".to_string()));
    }

    #[test]
    fn hardware_codec_uses_cq_flag() {
        let p = EncoderProfile {
            codec: Codec::Nvenc,
            crf_or_cq: 23,
        };
        assert!(p.args().contains(&"-cq".to_string()));
    }
}
