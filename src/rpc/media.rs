// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Loopback media routes (§4.H): HLS segments, finalized recordings (with
//! range support), and thumbnails. No directory listing; anything outside
//! the three served roots is a 404.

use super::body::{self, Body};
use http::{header, HeaderMap, Request, Response, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub async fn serve_hls(req: Request<hyper::body::Incoming>, hls_dir: &Path, camera_id: &str, file: &str) -> Response<Body> {
    let path = hls_dir.join(camera_id).join(file);
    let content_type = if file.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if file.ends_with(".ts") {
        "video/mp2t"
    } else {
        return not_found();
    };
    serve_file(&req, &path, content_type, false).await
}

pub async fn serve_recording(req: Request<hyper::body::Incoming>, recordings_dir: &Path, file: &str) -> Response<Body> {
    let path = recordings_dir.join(file);
    serve_file(&req, &path, "video/mp4", true).await
}

pub async fn serve_thumbnail(req: Request<hyper::body::Incoming>, thumbnails_dir: &Path, file: &str) -> Response<Body> {
    let path = thumbnails_dir.join(file);
    serve_file(&req, &path, "image/jpeg", false).await
}

/// Rejects any filename that would escape the served root via `..` or an
/// absolute path component.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && name != ".."
        && name != "."
}

async fn serve_file(req: &Request<hyper::body::Incoming>, path: &PathBuf, content_type: &str, allow_range: bool) -> Response<Body> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return not_found();
    };
    if !is_safe_filename(name) {
        return not_found();
    }

    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        // The transcoder may have just rolled a segment away; the HLS
        // client retries (§5 ordering guarantees).
        Err(_) => return not_found(),
    };
    let len = match file.metadata().await {
        Ok(m) => m.len(),
        Err(_) => return not_found(),
    };

    let range = allow_range.then(|| parse_range(req.headers(), len)).flatten();
    let (start, end) = range.unwrap_or((0, len.saturating_sub(1)));
    if start > end || end >= len {
        return Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{len}"))
            .body(body::empty())
            .unwrap();
    }
    let chunk_len = end - start + 1;

    if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
        return internal_error();
    }
    let mut buf = vec![0u8; chunk_len as usize];
    if file.read_exact(&mut buf).await.is_err() {
        return internal_error();
    }

    let status = if range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, chunk_len.to_string())
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    if allow_range {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }
    if range.is_some() {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{len}"),
        );
    }
    builder.body(body::full(buf)).unwrap()
}

/// Parses a single-range `Range: bytes=start-end` header (§6 "ranges
/// supported for MP4"). Multi-range and malformed headers are ignored,
/// falling back to a full response.
fn parse_range(headers: &HeaderMap, len: u64) -> Option<(u64, u64)> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start_s, end_s) = spec.split_once('-')?;
    if start_s.is_empty() {
        let suffix_len: u64 = end_s.parse().ok()?;
        let start = len.saturating_sub(suffix_len);
        return Some((start, len.saturating_sub(1)));
    }
    let start: u64 = start_s.parse().ok()?;
    let end = if end_s.is_empty() {
        len.saturating_sub(1)
    } else {
        end_s.parse().ok()?
    };
    Some((start, end))
}

pub fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(body::empty())
        .unwrap()
}

fn internal_error() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(body::empty())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(range: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::RANGE, range.parse().unwrap());
        h
    }

    #[test]
    fn safe_filename_rejects_traversal() {
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b"));
        assert!(is_safe_filename("segment_00001.ts"));
    }

    #[test]
    fn parses_bounded_range() {
        assert_eq!(parse_range(&headers("bytes=0-99"), 1000), Some((0, 99)));
    }

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(parse_range(&headers("bytes=500-"), 1000), Some((500, 999)));
    }

    #[test]
    fn parses_suffix_range() {
        assert_eq!(parse_range(&headers("bytes=-100"), 1000), Some((900, 999)));
    }

    #[test]
    fn rejects_multi_range() {
        assert_eq!(parse_range(&headers("bytes=0-10,20-30"), 1000), None);
    }
}
