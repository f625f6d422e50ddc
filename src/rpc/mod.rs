// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! The RPC façade (§4.J): a typed command surface realized as an
//! HTTP/JSON API sharing the media server's listener (§6.1).

pub mod body;
pub mod json;
pub mod media;
pub mod path;

use crate::core::Core;
use crate::onvif;
use crate::uvc;
use base::{Error, ErrorKind};
use body::Body;
use db::camera::{CameraKind, NewCamera};
use db::schedule::{NewSchedule, SchedulePatch};
use http::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub async fn handle(
    req: Request<hyper::body::Incoming>,
    core: Arc<Core>,
) -> Result<Response<Body>, std::convert::Infallible> {
    let Some(route) = path::parse(req.uri().path()) else {
        return Ok(media::not_found());
    };

    let resp = match route {
        path::Route::Hls { camera_id, file } => {
            media::serve_hls(req, &core.hls_dir, &camera_id, &file).await
        }
        path::Route::Recording { file } => {
            media::serve_recording(req, &core.recordings_dir, &file).await
        }
        path::Route::Thumbnail { file } => {
            media::serve_thumbnail(req, &core.thumbnails_dir, &file).await
        }
        path::Route::Port => json::ok_json(json!({ "port": core.media_port })),
        path::Route::Events => serve_events(&core).await,
        path::Route::Rpc(command) => {
            if req.method() != Method::POST {
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .body(body::empty())
                    .unwrap()
            } else {
                match dispatch(&command, req, &core).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(command, %e, "rpc command failed");
                        json::error_response(&e)
                    }
                }
            }
        }
    };
    Ok(resp)
}

/// Chunked long-poll: writes each newly available event as a JSON line;
/// the collaborator reconnects on EOF (§6.1).
async fn serve_events(core: &Core) -> Response<Body> {
    use http_body_util::{BodyExt, StreamBody};
    use hyper::body::Frame;
    use tokio_stream::wrappers::BroadcastStream;
    use tokio_stream::StreamExt;

    let rx = core.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => {
            let mut line = serde_json::to_vec(&event).ok()?;
            line.push(b'\n');
            Some(Ok::<_, std::convert::Infallible>(Frame::data(
                bytes::Bytes::from(line),
            )))
        }
        Err(_lagged) => None,
    });
    let body = StreamBody::new(stream).boxed();
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/x-ndjson")
        .header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body)
        .unwrap()
}

#[derive(Deserialize)]
struct IdPayload {
    id: i64,
}

#[derive(Deserialize)]
struct StartRecordingPayload {
    id: i64,
    #[serde(default)]
    fps: Option<i64>,
    #[serde(default)]
    duration: Option<i64>,
}

#[derive(Deserialize)]
struct MovePtzPayload {
    id: i64,
    x: f32,
    y: f32,
    zoom: f32,
}

#[derive(Deserialize)]
struct TogglePayload {
    id: i64,
    enabled: bool,
}

#[derive(Deserialize)]
struct UpdateSchedulePayload {
    id: i64,
    #[serde(flatten)]
    patch: SchedulePatch,
}

#[derive(Deserialize)]
struct UpdateEncoderSettingsPayload {
    policy: crate::config::EncoderPolicy,
}

#[derive(Serialize)]
struct DiscoverResult {
    cameras: Vec<crate::discovery::DiscoveredCamera>,
}

async fn dispatch(
    command: &str,
    req: Request<hyper::body::Incoming>,
    core: &Core,
) -> Result<Response<Body>, Error> {
    match command {
        "get_cameras" => {
            let cameras = core.db.list_cameras().await?;
            Ok(json::ok_json(cameras))
        }
        "add_camera" => {
            let new: NewCamera = json::read_json(req).await?;
            let id = core.db.add_camera(new).await?;
            Ok(json::ok_json(json!({ "id": id })))
        }
        "delete_camera" => {
            let payload: IdPayload = json::read_json(req).await?;
            core.teardown_camera(payload.id).await?;
            core.db.delete_camera(payload.id).await?;
            Ok(json::ok_empty())
        }
        "discover_cameras" => {
            let base = local_ipv4_base()?;
            let cameras = crate::discovery::scan(base).await;
            Ok(json::ok_json(DiscoverResult { cameras }))
        }
        "start_stream" => {
            let payload: IdPayload = json::read_json(req).await?;
            let url = core.supervisor.start(payload.id).await?;
            Ok(json::ok_json(json!({ "streamUrl": url })))
        }
        "stop_stream" => {
            let payload: IdPayload = json::read_json(req).await?;
            core.supervisor.stop(payload.id).await?;
            Ok(json::ok_empty())
        }
        "start_recording" => {
            let payload: StartRecordingPayload = json::read_json(req).await?;
            core.recorder
                .start(
                    payload.id,
                    crate::recorder::StartOptions {
                        fps_override: payload.fps,
                        duration_minutes: payload.duration,
                    },
                )
                .await?;
            Ok(json::ok_empty())
        }
        "stop_recording" => {
            let payload: IdPayload = json::read_json(req).await?;
            core.recorder.stop(payload.id).await?;
            Ok(json::ok_empty())
        }
        "get_recordings" => {
            let recordings = core.db.list_recordings().await?;
            Ok(json::ok_json(recordings))
        }
        "delete_recording" => {
            let payload: IdPayload = json::read_json(req).await?;
            core.recorder.delete(payload.id).await?;
            Ok(json::ok_empty())
        }
        "get_recording_cameras" => Ok(json::ok_json(core.recorder.recording_cameras())),
        "check_ptz_capabilities" => {
            let payload: IdPayload = json::read_json(req).await?;
            let camera = core.db.get_camera(payload.id).await?;
            if camera.kind != CameraKind::Onvif || camera.xaddr.is_none() {
                return Ok(json::ok_json(json!({ "supported": false })));
            }
            let client = onvif_client(&camera)?;
            match client.get_capabilities().await {
                Ok(caps) => Ok(json::ok_json(json!({
                    "supported": caps.ptz_xaddr.is_some(),
                    "hasPanTilt": caps.ptz_xaddr.is_some(),
                    "hasZoom": caps.ptz_xaddr.is_some(),
                }))),
                Err(_) => Ok(json::ok_json(json!({ "supported": false }))),
            }
        }
        "move_ptz" => {
            let payload: MovePtzPayload = json::read_json(req).await?;
            if !(-1.0..=1.0).contains(&payload.x)
                || !(-1.0..=1.0).contains(&payload.y)
                || !(-1.0..=1.0).contains(&payload.zoom)
            {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "ptz magnitudes must be within [-1, 1]",
                ));
            }
            let camera = core.db.get_camera(payload.id).await?;
            let client = onvif_client(&camera)?;
            let profile_token = client.get_profiles().await?;
            client
                .continuous_move(
                    &profile_token,
                    &onvif::PtzVelocity {
                        x: payload.x,
                        y: payload.y,
                        zoom: payload.zoom,
                    },
                )
                .await?;
            Ok(json::ok_empty())
        }
        "stop_ptz" => {
            let payload: IdPayload = json::read_json(req).await?;
            let camera = core.db.get_camera(payload.id).await?;
            let client = onvif_client(&camera)?;
            let profile_token = client.get_profiles().await?;
            client.stop_ptz(&profile_token).await?;
            Ok(json::ok_empty())
        }
        "get_camera_time" => {
            let payload: IdPayload = json::read_json(req).await?;
            let camera = core.db.get_camera(payload.id).await?;
            let client = onvif_client(&camera)?;
            let time = client.get_system_date_and_time().await?;
            Ok(json::ok_json(json!({ "time": time.to_string() })))
        }
        "sync_camera_time" => {
            let payload: IdPayload = json::read_json(req).await?;
            let camera = core.db.get_camera(payload.id).await?;
            let client = onvif_client(&camera)?;
            match client.sync_system_date_and_time().await {
                Ok(before) => Ok(json::ok_json(json!({
                    "success": true,
                    "beforeTime": before.to_string(),
                    "serverTime": jiff::Timestamp::now().to_string(),
                    "message": "camera clock synchronized",
                }))),
                Err(e) => Ok(json::ok_json(json!({
                    "success": false,
                    "beforeTime": null,
                    "serverTime": jiff::Timestamp::now().to_string(),
                    "message": "camera clock synchronization failed",
                    "error": e.to_string(),
                }))),
            }
        }
        "get_recording_schedules" => Ok(json::ok_json(core.db.list_schedules().await?)),
        "add_recording_schedule" => {
            let new: NewSchedule = json::read_json(req).await?;
            let id = core.db.add_schedule(new).await?;
            core.schedules.reconcile(id).await?;
            Ok(json::ok_json(json!({ "id": id })))
        }
        "update_recording_schedule" => {
            let payload: UpdateSchedulePayload = json::read_json(req).await?;
            core.db.update_schedule(payload.id, payload.patch).await?;
            core.schedules.reconcile(payload.id).await?;
            Ok(json::ok_empty())
        }
        "delete_recording_schedule" => {
            let payload: IdPayload = json::read_json(req).await?;
            core.schedules.unregister(payload.id);
            core.db.delete_schedule(payload.id).await?;
            Ok(json::ok_empty())
        }
        "toggle_schedule" => {
            let payload: TogglePayload = json::read_json(req).await?;
            core.db.set_schedule_enabled(payload.id, payload.enabled).await?;
            core.schedules.reconcile(payload.id).await?;
            Ok(json::ok_empty())
        }
        "detect_gpu" => {
            let working = core.encoder.detect().await;
            Ok(json::ok_json(json!({ "working": working })))
        }
        "get_encoder_settings" => {
            let policy = *core.encoder_policy.lock();
            Ok(json::ok_json(json!({ "policy": policy })))
        }
        "update_encoder_settings" => {
            let payload: UpdateEncoderSettingsPayload = json::read_json(req).await?;
            *core.encoder_policy.lock() = payload.policy;
            core.encoder.invalidate();
            Ok(json::ok_empty())
        }
        "list_uvc_devices" => Ok(json::ok_json(uvc::list_devices().await)),
        other => Err(Error::new(
            ErrorKind::NotFound,
            format!("unknown rpc command {other:?}"),
        )),
    }
}

fn onvif_client(camera: &db::camera::Camera) -> Result<onvif::Client, Error> {
    let xaddr = camera
        .xaddr
        .clone()
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "camera has no onvif xaddr"))?;
    let credentials = match (&camera.username, &camera.password) {
        (Some(u), Some(p)) => Some(onvif::Credentials {
            username: u.clone(),
            password: p.clone(),
        }),
        _ => None,
    };
    onvif::Client::new(xaddr, credentials)
}

fn local_ipv4_base() -> Result<std::net::Ipv4Addr, Error> {
    // Best-effort: connect a UDP socket to a public address (no packets
    // sent) to learn which local interface the OS would route through,
    // per §4.D "the host's primary IPv4 interface."
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").map_err(Error::from)?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|e| Error::wrap(ErrorKind::Unreachable, "resolving local interface", e))?;
    match socket.local_addr().map_err(Error::from)?.ip() {
        std::net::IpAddr::V4(addr) => Ok(addr),
        std::net::IpAddr::V6(_) => Err(Error::new(
            ErrorKind::Unreachable,
            "no local IPv4 interface available",
        )),
    }
}
