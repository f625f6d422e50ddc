// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! JSON request/response plumbing for the `/rpc/<command>` surface
//! (§6.1). Every `ErrorKind` maps to an HTTP status per §7.

use super::body::{self, Body};
use base::{Error, ErrorKind};
use http::{header, Response, StatusCode};
use http_body_util::BodyExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

pub async fn read_json<T: DeserializeOwned>(
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<T, Error> {
    let collected = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::wrap(ErrorKind::Internal, "reading request body", e))?;
    serde_json::from_slice(&collected.to_bytes())
        .map_err(|e| Error::wrap(ErrorKind::InvalidInput, "decoding JSON request body", e))
}

pub fn ok_json(value: impl Serialize) -> Response<Body> {
    let bytes = serde_json::to_vec(&value).expect("serializing a response value never fails");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body::full(bytes))
        .unwrap()
}

pub fn ok_empty() -> Response<Body> {
    ok_json(json!({ "success": true }))
}

/// Maps an `Error` to its HTTP status (§7) with a small JSON error body.
pub fn error_response(err: &Error) -> Response<Body> {
    let status = StatusCode::from_u16(err.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = serde_json::to_vec(&json!({ "error": err.chain().to_string() }))
        .expect("serializing an error body never fails");
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body::full(bytes))
        .unwrap()
}
