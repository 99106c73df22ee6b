// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe signature crate
//
// Maps text to a fixed-width bit-signature (a Bloom-style sketch over
// character trigrams) and provides the word-parallel popcount kernels used
// to compare signatures.
//
// # Layout
//
// A signature is `SIGNATURE_WORDS` little-endian u64 words. Word `i` holds
// bits `[64 * i, 64 * i + 63]`; bit `b` of the signature is bit `b % 64` of
// word `b / 64`.
//
// ```text
// word 0          word 1                 word 63
// [bits 0..63]    [bits 64..127]   ...   [bits 4032..4095]
// ```
//
// ## Usage
//
// ```
// use strobe_signature::{similarity, SignatureBuilder};
//
// let builder = SignatureBuilder::default();
// let a = builder.build("tok47591");
// let b = builder.build("tok47591");
// assert_eq!(a, b);
// assert_eq!(similarity(&a, &b), 1.0);
// ```

pub mod builder;
pub mod error;
pub mod popcount;
pub mod signature;

pub use builder::{normalize, SignatureBuilder, DEFAULT_HASHES_PER_SHINGLE};
pub use error::{SignatureError, SignatureResult};
pub use popcount::{hamming, kernel, similarity, similarity_from_distance, Kernel};
pub use signature::Signature;

/// Width of every signature in bits. Fixed per deployment.
pub const SIGNATURE_BITS: usize = 4096;

/// Number of u64 words in a signature.
pub const SIGNATURE_WORDS: usize = SIGNATURE_BITS / 64;

/// Number of bytes in a serialized signature.
pub const SIGNATURE_BYTES: usize = SIGNATURE_BITS / 8;
