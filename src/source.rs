// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Resolves a camera row into a source URL/device node the transcoder can
//! read from (§4.F step 2).

use crate::onvif;
use base::{Error, ErrorKind};
use db::camera::{Camera, CameraKind};

/// Either an URL the transcoder's demuxer understands, or a local device
/// node for UVC cameras.
pub enum Source {
    Url(String),
    DeviceNode {
        path: String,
        pixel_format: String,
        width: i64,
        height: i64,
        fps: i64,
    },
}

pub async fn resolve(camera: &Camera) -> Result<Source, Error> {
    match camera.kind {
        CameraKind::Onvif => {
            let xaddr = camera
                .xaddr
                .clone()
                .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "onvif camera missing xaddr"))?;
            let credentials = match (&camera.username, &camera.password) {
                (Some(u), Some(p)) => Some(onvif::Credentials {
                    username: u.clone(),
                    password: p.clone(),
                }),
                _ => None,
            };
            let client = onvif::Client::new(xaddr, credentials)?;
            let profile_token = client.get_profiles().await?;
            let uri = client.get_stream_uri(&profile_token).await?;
            Ok(Source::Url(uri))
        }
        CameraKind::Rtsp => {
            let host = camera
                .host
                .clone()
                .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "rtsp camera missing host"))?;
            let path = camera
                .stream_path
                .clone()
                .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "rtsp camera missing stream_path"))?;
            let port = camera.port.unwrap_or(554);
            let authority = match (&camera.username, &camera.password) {
                (Some(u), Some(p)) => format!("{u}:{p}@{host}:{port}"),
                _ => format!("{host}:{port}"),
            };
            let path = path.strip_prefix('/').unwrap_or(&path);
            Ok(Source::Url(format!("rtsp://{authority}/{path}")))
        }
        CameraKind::Uvc => {
            let path = camera.device_node.clone().ok_or_else(|| {
                Error::new(ErrorKind::InvalidInput, "uvc camera missing device_node")
            })?;
            Ok(Source::DeviceNode {
                path,
                pixel_format: camera.pixel_format.clone().unwrap_or_else(|| "MJPG".into()),
                width: camera.width.unwrap_or(1280),
                height: camera.height.unwrap_or(720),
                fps: camera.fps.unwrap_or(30),
            })
        }
    }
}
