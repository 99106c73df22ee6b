// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe signature - Error types

use thiserror::Error;

/// Errors raised when a signature is reconstructed from external input.
///
/// Building a signature from text is infallible; only conversions from
/// words or bytes can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The input carried the wrong number of 64-bit words.
    #[error("signature must have {expected} words, got {actual}")]
    WordCount {
        /// Words required by the deployment width.
        expected: usize,
        /// Words actually supplied.
        actual: usize,
    },

    /// The input carried the wrong number of bytes.
    #[error("signature must be {expected} bytes, got {actual}")]
    ByteCount {
        /// Bytes required by the deployment width.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },
}

/// Convenience type alias for signature results.
pub type SignatureResult<T> = Result<T, SignatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_word_count() {
        let error = SignatureError::WordCount {
            expected: 64,
            actual: 3,
        };
        let message = format!("{error}");
        assert!(message.contains("64"));
        assert!(message.contains('3'));
    }
}
