// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Error kind, surfaced to RPC callers and mapped to an HTTP status at the
/// façade boundary.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Unauthorized,
    Unreachable,
    ProtocolError,
    ProcessFailed,
    Timeout,
    Conflict,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::ProtocolError => "protocol error",
            ErrorKind::ProcessFailed => "process failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl ErrorKind {
    /// The HTTP status this kind maps to at the RPC boundary.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Unreachable => 502,
            ErrorKind::ProtocolError => 502,
            ErrorKind::ProcessFailed => 500,
            ErrorKind::Timeout => 504,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

/// The crate-wide error type. Every fallible operation in the core returns
/// this (directly or via `?`), so callers only ever need to match on `kind()`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {msg}")]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Error {
            kind,
            msg: msg.into(),
            source: None,
        }
    }

    pub fn wrap(
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            msg: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// A `Display` of this error followed by its full `source()` chain,
    /// each separated by `": "` — used for top-level exit logging.
    pub fn chain(&self) -> Chain<'_> {
        Chain(self)
    }
}

pub struct Chain<'a>(&'a Error);

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cur: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self.0);
        while let Some(e) = cur {
            write!(f, ": {e}")?;
            cur = e.source();
        }
        Ok(())
    }
}

/// Extension methods for `Result`, mirroring the pattern of annotating a
/// foreign error with a kind at the point it crosses into our `Error` type.
pub trait ResultExt<T> {
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| {
            let msg = e.to_string();
            Error::wrap(k, msg, e)
        })
    }
}

/// Like `anyhow::bail!`, but the first argument names an `ErrorKind`.
#[macro_export]
macro_rules! bail_t {
    ($t:ident, $msg:expr) => {
        return Err($crate::Error::new($crate::ErrorKind::$t, $msg));
    };
    ($t:ident, $fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::new($crate::ErrorKind::$t, format!($fmt, $($arg)+)));
    };
}

/// Like `anyhow::anyhow!`, but the first argument names an `ErrorKind`.
#[macro_export]
macro_rules! format_err_t {
    ($t:ident, $msg:expr) => {
        $crate::Error::new($crate::ErrorKind::$t, $msg)
    };
    ($t:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::Error::new($crate::ErrorKind::$t, format!($fmt, $($arg)+))
    };
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            _ => ErrorKind::Internal,
        };
        Error::wrap(kind, "i/o error", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bail_t_sets_kind_and_message() {
        let e = (|| -> Result<(), Error> {
            bail_t!(Unauthorized, "unknown user: {}", "alice");
        })()
        .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);
        assert_eq!(e.to_string(), "unauthorized: unknown user: alice");
    }

    #[test]
    fn http_status_mapping_covers_conflict() {
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::Timeout.http_status(), 504);
    }
}
