// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe wire protocol - Query flags

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Validated query flag set.
///
/// Only bits named here can be constructed through [`QueryFlags::from_bits`];
/// any other bit is reserved and rejected so that future flags cannot be
/// silently misread by an older shard.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFlags(u16);

impl QueryFlags {
    /// No flags: exact matching.
    pub const EXACT: Self = Self(0);

    /// Approximate top-k by Hamming similarity.
    pub const FUZZY: Self = Self(1 << 0);

    /// Union of every defined bit.
    pub const KNOWN: u16 = Self::FUZZY.0;

    /// Validate raw bits.
    pub fn from_bits(bits: u16) -> ProtocolResult<Self> {
        let reserved = bits & !Self::KNOWN;
        if reserved != 0 {
            return Err(ProtocolError::ReservedFlags(reserved));
        }
        Ok(Self(bits))
    }

    /// Raw bits.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the FUZZY bit is set.
    pub const fn is_fuzzy(self) -> bool {
        self.contains(Self::FUZZY)
    }
}

impl BitOr for QueryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for QueryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fuzzy() {
            write!(f, "QueryFlags(FUZZY)")
        } else {
            write!(f, "QueryFlags(EXACT)")
        }
    }
}
