// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe signature - Hamming distance and similarity kernels
//
// The fuzzy matcher calls `hamming` once per resident document, so this is
// the throughput-critical loop of the whole service. On x86_64 the kernel
// is compiled a second time with the `popcnt` target feature and selected
// at runtime; everywhere else the portable loop is used.

use std::sync::OnceLock;

use tracing::info;

use crate::signature::Signature;
use crate::{SIGNATURE_BITS, SIGNATURE_WORDS};

/// Which popcount implementation this process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Hardware `popcnt` instruction (x86_64 only).
    HardwarePopcnt,
    /// Portable `count_ones` loop.
    Scalar,
}

static KERNEL: OnceLock<Kernel> = OnceLock::new();

/// Detect (once) and return the kernel for this CPU.
pub fn kernel() -> Kernel {
    *KERNEL.get_or_init(|| {
        let chosen = detect();
        info!(kernel = ?chosen, "Selected signature popcount kernel");
        chosen
    })
}

fn detect() -> Kernel {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("popcnt") {
            return Kernel::HardwarePopcnt;
        }
    }
    Kernel::Scalar
}

/// Number of differing bits between `a` and `b`.
#[inline]
pub fn hamming(a: &Signature, b: &Signature) -> u32 {
    match kernel() {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: `HardwarePopcnt` is only selected after runtime detection
        // confirmed the CPU supports the instruction.
        Kernel::HardwarePopcnt => unsafe { hamming_popcnt(a.words(), b.words()) },
        _ => hamming_scalar(a.words(), b.words()),
    }
}

/// `1 - hamming(a, b) / W`. Reflexive (`similarity(a, a) == 1.0`) and
/// symmetric.
#[inline]
pub fn similarity(a: &Signature, b: &Signature) -> f32 {
    similarity_from_distance(hamming(a, b))
}

/// Convert a Hamming distance into a similarity score.
#[inline]
pub fn similarity_from_distance(distance: u32) -> f32 {
    1.0 - distance as f32 / SIGNATURE_BITS as f32
}

/// Four independent accumulators so consecutive words do not serialize on
/// one add chain.
#[inline(always)]
fn hamming_scalar(a: &[u64; SIGNATURE_WORDS], b: &[u64; SIGNATURE_WORDS]) -> u32 {
    let mut acc = [0u32; 4];
    for (xa, xb) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
        acc[0] += (xa[0] ^ xb[0]).count_ones();
        acc[1] += (xa[1] ^ xb[1]).count_ones();
        acc[2] += (xa[2] ^ xb[2]).count_ones();
        acc[3] += (xa[3] ^ xb[3]).count_ones();
    }
    acc[0] + acc[1] + acc[2] + acc[3]
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "popcnt")]
unsafe fn hamming_popcnt(a: &[u64; SIGNATURE_WORDS], b: &[u64; SIGNATURE_WORDS]) -> u32 {
    hamming_scalar(a, b)
}
