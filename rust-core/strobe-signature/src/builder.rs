// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe signature - Trigram signature builder
//
// Text is normalized, split into overlapping 3-character shingles with a
// boundary sentinel on each side, and every shingle sets a few bit
// positions chosen by double hashing of two independently seeded mixes.
// The union over all shingles is the signature.
//
// The builder has no process state: identical text produces an identical
// signature in every process, which is what makes exact-mode self-match
// work across restarts.

use crate::signature::Signature;
use crate::SIGNATURE_BITS;

/// Bit positions set per shingle by [`SignatureBuilder::default`].
pub const DEFAULT_HASHES_PER_SHINGLE: u32 = 4;

/// Smallest accepted hash count. Fewer than two projections per shingle
/// would collapse the sketch into a plain hash set.
pub const MIN_HASHES_PER_SHINGLE: u32 = 2;

/// Boundary sentinel. Never produced by [`normalize`], which only emits
/// alphanumerics and single spaces.
const SENTINEL: char = '\u{0}';

const SEED_PRIMARY: u64 = 0x9e37_79b9_7f4a_7c15;
const SEED_SECONDARY: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// Builds signatures from source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureBuilder {
    hashes_per_shingle: u32,
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self {
            hashes_per_shingle: DEFAULT_HASHES_PER_SHINGLE,
        }
    }
}

impl SignatureBuilder {
    /// Create a builder setting `hashes_per_shingle` bits per shingle
    /// (raised to [`MIN_HASHES_PER_SHINGLE`] if lower).
    pub fn new(hashes_per_shingle: u32) -> Self {
        Self {
            hashes_per_shingle: hashes_per_shingle.max(MIN_HASHES_PER_SHINGLE),
        }
    }

    /// Bit positions set per shingle.
    pub fn hashes_per_shingle(&self) -> u32 {
        self.hashes_per_shingle
    }

    /// Build the signature of `text`.
    pub fn build(&self, text: &str) -> Signature {
        let mut signature = Signature::zero();
        for_each_shingle(&normalize(text), |shingle| {
            self.accumulate(&mut signature, shingle);
        });
        signature
    }

    fn accumulate(&self, signature: &mut Signature, shingle: [char; 3]) {
        let packed = pack(shingle);
        let h1 = mix64(packed ^ SEED_PRIMARY);
        let h2 = mix64(packed ^ SEED_SECONDARY) | 1;
        for i in 0..u64::from(self.hashes_per_shingle) {
            let position = h1.wrapping_add(i.wrapping_mul(h2)) % SIGNATURE_BITS as u64;
            signature.set_bit(position as usize);
        }
    }
}

/// Normalize text for shingling.
///
/// Characters are lowercased; alphanumerics are kept and everything else
/// becomes a space. Whitespace runs collapse to one space and the result
/// is trimmed.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Call `f` for every trigram of the padded, normalized text.
fn for_each_shingle(normalized: &str, mut f: impl FnMut([char; 3])) {
    let mut padded: Vec<char> = Vec::with_capacity(normalized.len() + 3);
    padded.push(SENTINEL);
    padded.extend(normalized.chars());
    padded.push(SENTINEL);
    while padded.len() < 3 {
        padded.push(SENTINEL);
    }
    for window in padded.windows(3) {
        f([window[0], window[1], window[2]]);
    }
}

/// Pack three chars (21 significant bits each) into one word.
#[inline]
fn pack(shingle: [char; 3]) -> u64 {
    u64::from(u32::from(shingle[0]))
        | (u64::from(u32::from(shingle[1])) << 21)
        | (u64::from(u32::from(shingle[2])) << 42)
}

/// 64-bit finalizer (murmur3 fmix64 constants).
#[inline]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^ (x >> 33)
}
