//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.

use thiserror::Error;

/// Errors returned by operations on a [`crate::Histogram`] or by the
/// binary codec.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Construction-time configuration was invalid (`L < 1`, `H < 2L`, or
    /// `D` outside `[0, 5]`).
    #[error("invalid histogram configuration: {0}")]
    InvalidArgument(String),

    /// A value fell outside the histogram's trackable range and
    /// `auto_resize` was disabled (or resizing itself overflowed).
    #[error("value out of range")]
    OutOfRange,

    /// A counter at `index` could not hold `attempted` without exceeding
    /// its width, or could not be decremented below zero.
    #[error("counter at index {index} cannot represent {attempted}")]
    CounterOverflow { index: usize, attempted: u64 },

    /// The decoded payload was structurally invalid.
    #[error("malformed histogram payload: {0}")]
    MalformedPayload(String),

    /// The payload's cookie did not match the counter width being decoded
    /// into.
    #[error("unrecognized cookie: {0:#x}")]
    UnknownCookie(u32),

    /// The payload declared a length that does not match the bytes
    /// actually supplied.
    #[error("payload length mismatch: expected {expected} bytes, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
