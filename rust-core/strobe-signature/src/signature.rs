// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe signature - Fixed-width bit-signature value type
//
// `Signature` owns exactly `SIGNATURE_WORDS` words. The width is a
// deployment constant, so every signature in a process is comparable with
// every other one without length checks in the hot path.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SignatureError, SignatureResult};
use crate::{SIGNATURE_BITS, SIGNATURE_BYTES, SIGNATURE_WORDS};

/// A fixed-width bit array summarizing a document or a query.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    words: [u64; SIGNATURE_WORDS],
}

impl Signature {
    /// The all-zero signature.
    pub const fn zero() -> Self {
        Self {
            words: [0u64; SIGNATURE_WORDS],
        }
    }

    /// Wrap an owned word array.
    pub const fn from_words(words: [u64; SIGNATURE_WORDS]) -> Self {
        Self { words }
    }

    /// Copy a word slice, checking it matches the deployment width.
    pub fn try_from_words(words: &[u64]) -> SignatureResult<Self> {
        let words: [u64; SIGNATURE_WORDS] =
            words.try_into().map_err(|_| SignatureError::WordCount {
                expected: SIGNATURE_WORDS,
                actual: words.len(),
            })?;
        Ok(Self { words })
    }

    /// Decode `SIGNATURE_BYTES` little-endian bytes (word 0 first).
    pub fn from_le_bytes(bytes: &[u8]) -> SignatureResult<Self> {
        if bytes.len() != SIGNATURE_BYTES {
            return Err(SignatureError::ByteCount {
                expected: SIGNATURE_BYTES,
                actual: bytes.len(),
            });
        }
        let mut words = [0u64; SIGNATURE_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }
        Ok(Self { words })
    }

    /// Append the little-endian byte form to `out`.
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(SIGNATURE_BYTES);
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }

    /// The backing words.
    #[inline]
    pub fn words(&self) -> &[u64; SIGNATURE_WORDS] {
        &self.words
    }

    /// Set the bit at `bit % SIGNATURE_BITS`.
    #[inline]
    pub fn set_bit(&mut self, bit: usize) {
        let bit = bit % SIGNATURE_BITS;
        self.words[bit >> 6] |= 1u64 << (bit & 63);
    }

    /// Test the bit at `bit % SIGNATURE_BITS`.
    #[cfg(test)]
    fn bit(&self, bit: usize) -> bool {
        let bit = bit % SIGNATURE_BITS;
        self.words[bit >> 6] & (1u64 << (bit & 63)) != 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// A 64-bit digest of the whole signature.
    ///
    /// Equal signatures always have equal fingerprints; the exact-match
    /// table keys on this and then compares the full words.
    pub fn fingerprint(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for (i, &word) in self.words.iter().enumerate() {
            h ^= word.rotate_left((i as u32 * 7) & 63);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
            h ^= h >> 29;
        }
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^ (h >> 33)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("ones", &self.count_ones())
            .field("fingerprint", &format_args!("{:#018x}", self.fingerprint()))
            .finish()
    }
}

// serde only derives arrays up to 32 elements, so the 64-word form is
// written out as a plain sequence.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(SIGNATURE_WORDS))?;
        for word in &self.words {
            seq.serialize_element(word)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WordsVisitor;

        impl<'de> Visitor<'de> for WordsVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a sequence of {SIGNATURE_WORDS} u64 words")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Signature, A::Error> {
                let mut words = [0u64; SIGNATURE_WORDS];
                for (index, word) in words.iter_mut().enumerate() {
                    *word = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &self))?;
                }
                if seq.next_element::<u64>()?.is_some() {
                    return Err(de::Error::invalid_length(SIGNATURE_WORDS + 1, &self));
                }
                Ok(Signature::from_words(words))
            }
        }

        deserializer.deserialize_seq(WordsVisitor)
    }
}
