// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! USB Video Class device enumeration (§4.E). Platform-gated: Linux
//! shells out to `v4l2-ctl`; Windows/macOS enumeration is stubbed pending
//! a native backend, since this host only needs to run the Linux path in
//! practice.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct UvcDevice {
    pub device_node: String,
    pub name: String,
    pub pixel_format: String,
    pub width: i64,
    pub height: i64,
    pub fps: i64,
}

#[cfg(target_os = "linux")]
pub async fn list_devices() -> Vec<UvcDevice> {
    use tokio::process::Command;

    let Ok(out) = Command::new("v4l2-ctl").arg("--list-devices").output().await else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&out.stdout);
    let mut devices = Vec::new();
    let mut current_name: Option<String> = None;
    for line in text.lines() {
        if !line.starts_with('\t') && !line.trim().is_empty() {
            current_name = Some(line.trim_end_matches(':').trim().to_string());
            continue;
        }
        let node = line.trim();
        if !node.starts_with("/dev/video") {
            continue;
        }
        // Devices exposing only metadata streams (no usable format list)
        // are filtered out below via `best_format`.
        let Some(format) = best_format(node).await else {
            continue;
        };
        devices.push(UvcDevice {
            device_node: node.to_string(),
            name: current_name.clone().unwrap_or_else(|| node.to_string()),
            pixel_format: format.pixel_format,
            width: format.width,
            height: format.height,
            fps: format.fps,
        });
    }
    devices
}

#[cfg(target_os = "linux")]
struct Format {
    pixel_format: String,
    width: i64,
    height: i64,
    fps: i64,
}

/// Parses `v4l2-ctl --list-formats-ext` output for `node`, preferring
/// `MJPG` over `YUYV`, then largest resolution, then highest fps (§4.E).
/// Each `Size:` line opens a block of one or more `Interval: Discrete n/d`
/// lines (seconds per frame); a size's fps is the reciprocal of its
/// shortest interval, i.e. the highest frame rate the camera offers at
/// that size.
#[cfg(target_os = "linux")]
async fn best_format(node: &str) -> Option<Format> {
    use tokio::process::Command;

    let out = Command::new("v4l2-ctl")
        .args(["-d", node, "--list-formats-ext"])
        .output()
        .await
        .ok()?;
    let text = String::from_utf8_lossy(&out.stdout);
    let mut best: Option<Format> = None;
    let mut cur_fmt = String::new();
    let mut pending: Option<(i64, i64)> = None; // (width, height) awaiting its interval lines
    let mut pending_fps: i64 = 0;

    let mut consider = |best: &mut Option<Format>, fmt: &str, size: (i64, i64), fps: i64| {
        let (w, h) = size;
        let better = match best {
            None => true,
            Some(b) => rank(fmt, w, h, fps) > rank(&b.pixel_format, b.width, b.height, b.fps),
        };
        if better {
            *best = Some(Format {
                pixel_format: fmt.to_string(),
                width: w,
                height: h,
                fps,
            });
        }
    };

    for line in text.lines() {
        let line = line.trim();
        if line.contains("'MJPG'") {
            if let Some(size) = pending.take() {
                consider(&mut best, &cur_fmt, size, pending_fps.max(1));
            }
            cur_fmt = "MJPG".to_string();
        } else if line.contains("'YUYV'") {
            if let Some(size) = pending.take() {
                consider(&mut best, &cur_fmt, size, pending_fps.max(1));
            }
            cur_fmt = "YUYV".to_string();
        } else if let Some(size) = line.strip_prefix("Size: Discrete ") {
            if let Some(size) = pending.take() {
                consider(&mut best, &cur_fmt, size, pending_fps.max(1));
            }
            let Some((w, h)) = size.split_once('x') else {
                continue;
            };
            let (Ok(w), Ok(h)) = (w.parse::<i64>(), h.parse::<i64>()) else {
                continue;
            };
            pending = Some((w, h));
            pending_fps = 0;
        } else if let Some(interval) = line.strip_prefix("Interval: Discrete ") {
            let Some(fps) = parse_interval_fps(interval) else {
                continue;
            };
            pending_fps = pending_fps.max(fps);
        }
    }
    if let Some(size) = pending.take() {
        consider(&mut best, &cur_fmt, size, pending_fps.max(1));
    }
    best
}

/// Parses the `n/d` fraction out of an `"Interval: Discrete n/d (x.xxx
/// fps)"` line and returns its reciprocal, rounded to the nearest whole
/// fps. `n/d` is seconds per frame, so fps = d/n.
#[cfg(target_os = "linux")]
fn parse_interval_fps(rest: &str) -> Option<i64> {
    let fraction = rest.split_whitespace().next()?;
    let (n, d) = fraction.split_once('/')?;
    let n: f64 = n.parse().ok()?;
    let d: f64 = d.parse().ok()?;
    if n <= 0.0 {
        return None;
    }
    Some((d / n).round() as i64)
}

#[cfg(target_os = "linux")]
fn rank(pixel_format: &str, width: i64, height: i64, fps: i64) -> (i32, i64, i64) {
    let fmt_rank = if pixel_format == "MJPG" { 1 } else { 0 };
    (fmt_rank, width * height, fps)
}

#[cfg(not(target_os = "linux"))]
pub async fn list_devices() -> Vec<UvcDevice> {
    Vec::new()
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn mjpg_outranks_yuyv_at_equal_size() {
        assert!(rank("MJPG", 640, 480, 30) > rank("YUYV", 640, 480, 30));
    }

    #[test]
    fn larger_resolution_outranks_smaller() {
        assert!(rank("YUYV", 1280, 720, 30) > rank("YUYV", 640, 480, 30));
    }

    #[test]
    fn higher_fps_outranks_lower_at_equal_size_and_format() {
        assert!(rank("YUYV", 640, 480, 60) > rank("YUYV", 640, 480, 30));
    }

    #[test]
    fn parses_whole_fps_interval() {
        assert_eq!(parse_interval_fps("1/30 (30.000 fps)"), Some(30));
    }

    #[test]
    fn shortest_interval_gives_highest_fps() {
        assert!(parse_interval_fps("1/60 (60.000 fps)") > parse_interval_fps("1/30 (30.000 fps)"));
    }

    #[test]
    fn rejects_malformed_interval() {
        assert_eq!(parse_interval_fps("garbage"), None);
    }
}
