// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Manual path routing for the RPC/media HTTP surface (§4.H/§6.1), built
//! with `nom` rather than a routing framework dependency.

use nom::bytes::complete::{tag, take_while1};
use nom::combinator::rest;
use nom::sequence::{preceded, separated_pair};
use nom::IResult;

#[derive(Debug, Eq, PartialEq)]
pub enum Route {
    Rpc(String),
    Events,
    Port,
    Hls { camera_id: String, file: String },
    Recording { file: String },
    Thumbnail { file: String },
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '/')(input)
}

fn two_segments(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(segment, tag("/"), rest)(input)
}

pub fn parse(path: &str) -> Option<Route> {
    if path == "/rpc/events" {
        return Some(Route::Events);
    }
    if path == "/rpc/port" {
        return Some(Route::Port);
    }
    if let Ok((_, command)) = preceded(tag::<_, _, ()>("/rpc/"), rest)(path) {
        if !command.is_empty() {
            return Some(Route::Rpc(command.to_string()));
        }
    }
    if let Ok((_, (camera_id, file))) = preceded(tag::<_, _, ()>("/hls/"), two_segments)(path) {
        return Some(Route::Hls {
            camera_id: camera_id.to_string(),
            file: file.to_string(),
        });
    }
    if let Ok((_, file)) = preceded(tag::<_, _, ()>("/recordings/"), segment)(path) {
        return Some(Route::Recording {
            file: file.to_string(),
        });
    }
    if let Ok((_, file)) = preceded(tag::<_, _, ()>("/thumbnails/"), segment)(path) {
        return Some(Route::Thumbnail {
            file: file.to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rpc_command() {
        assert_eq!(parse("/rpc/get_cameras"), Some(Route::Rpc("get_cameras".into())));
    }

    #[test]
    fn parses_events_and_port() {
        assert_eq!(parse("/rpc/events"), Some(Route::Events));
        assert_eq!(parse("/rpc/port"), Some(Route::Port));
    }

    #[test]
    fn parses_hls_segment_path() {
        assert_eq!(
            parse("/hls/3/stream.m3u8"),
            Some(Route::Hls {
                camera_id: "3".into(),
                file: "stream.m3u8".into()
            })
        );
    }

    #[test]
    fn parses_recording_and_thumbnail_paths() {
        assert_eq!(
            parse("/recordings/1_1690000000.mp4"),
            Some(Route::Recording {
                file: "1_1690000000.mp4".into()
            })
        );
        assert_eq!(
            parse("/thumbnails/1_1690000000.jpg"),
            Some(Route::Thumbnail {
                file: "1_1690000000.jpg".into()
            })
        );
    }

    #[test]
    fn rejects_unknown_root() {
        assert_eq!(parse("/favicon.ico"), None);
    }
}
