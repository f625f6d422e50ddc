// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

mod error;
pub mod shutdown;
pub mod strutil;
pub mod tracing_setup;

pub use crate::error::{Error, ErrorKind, ResultExt};

/// Mutex/Condvar aliases used throughout the core; `parking_lot`'s are
/// faster and infallible (no poisoning) compared to the `std::sync` ones.
pub type Mutex<T> = parking_lot::Mutex<T>;
pub type Condvar = parking_lot::Condvar;
