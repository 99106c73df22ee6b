// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe wire protocol - Error types
//
// Every variant is request-scoped: a malformed frame is rejected and has no
// effect on the shard that received it.

use thiserror::Error;

/// Errors raised while decoding a wire frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame length is not the single accepted length.
    #[error("query frame must be exactly {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required frame length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// One or more reserved flag bits are set.
    #[error("reserved query flag bits set: {0:#06x}")]
    ReservedFlags(u16),

    /// `k` was zero.
    #[error("k must be at least 1")]
    ZeroK,

    /// A hit frame is shorter than its declared entry count requires.
    #[error("hit frame declares {declared} entries but carries {actual} bytes")]
    TruncatedHits {
        /// Entries declared in the header.
        declared: u32,
        /// Bytes present after the header.
        actual: usize,
    },
}

/// Convenience type alias for wire results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
