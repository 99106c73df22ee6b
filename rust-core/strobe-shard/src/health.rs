// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Health state machine
//
//   Starting --replay ok--> Serving --durability failure--> Degraded
//       \                      \                               |
//        +----------------------+------- shutdown -------> Stopped
//
// Serving and Degraded serve reads; only Serving accepts writes. No state
// is ever re-entered.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

/// Lifecycle state of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ShardHealth {
    /// Replaying the WAL; nothing is served.
    Starting = 0,
    /// Reads and writes accepted.
    Serving = 1,
    /// Writes refused after a durability failure; reads continue.
    Degraded = 2,
    /// Shut down.
    Stopped = 3,
}

impl ShardHealth {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ShardHealth::Starting,
            1 => ShardHealth::Serving,
            2 => ShardHealth::Degraded,
            _ => ShardHealth::Stopped,
        }
    }

    /// Whether searches are answered.
    pub fn is_readable(self) -> bool {
        matches!(self, ShardHealth::Serving | ShardHealth::Degraded)
    }

    /// Whether ingest is accepted.
    pub fn is_writable(self) -> bool {
        self == ShardHealth::Serving
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ShardHealth::Starting => "starting",
            ShardHealth::Serving => "serving",
            ShardHealth::Degraded => "degraded",
            ShardHealth::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ShardHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a shard's health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Current state.
    pub state: ShardHealth,
    /// When the state was entered.
    pub since: DateTime<Utc>,
    /// Why the shard left `Serving`, if it did so on failure.
    pub reason: Option<String>,
}

#[derive(Debug)]
struct Transition {
    since: DateTime<Utc>,
    reason: Option<String>,
}

/// Lock-free state word plus a record of the last transition.
#[derive(Debug)]
pub struct HealthCell {
    state: AtomicU8,
    last: Mutex<Transition>,
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCell {
    /// A cell in `Starting`.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShardHealth::Starting as u8),
            last: Mutex::new(Transition {
                since: Utc::now(),
                reason: None,
            }),
        }
    }

    /// Current state.
    #[inline]
    pub fn get(&self) -> ShardHealth {
        ShardHealth::from_u8(self.state.load(Ordering::Acquire))
    }

    /// State plus transition details.
    pub fn report(&self) -> HealthReport {
        let last = self.last.lock();
        HealthReport {
            state: self.get(),
            since: last.since,
            reason: last.reason.clone(),
        }
    }

    /// `Starting -> Serving`. Returns whether the transition happened.
    pub fn mark_serving(&self) -> bool {
        self.transition(ShardHealth::Starting, ShardHealth::Serving, None)
    }

    /// `Serving -> Degraded`. Returns whether the transition happened.
    pub fn degrade(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let moved = self.transition(
            ShardHealth::Serving,
            ShardHealth::Degraded,
            Some(reason.clone()),
        );
        if moved {
            error!(reason = %reason, "Shard degraded; writes disabled");
        }
        moved
    }

    /// Any state -> `Stopped`. Returns the state that was left.
    pub fn stop(&self) -> ShardHealth {
        let previous = ShardHealth::from_u8(
            self.state
                .swap(ShardHealth::Stopped as u8, Ordering::AcqRel),
        );
        if previous != ShardHealth::Stopped {
            self.last.lock().since = Utc::now();
            info!(from = %previous, "Shard stopped");
        }
        previous
    }

    fn transition(&self, from: ShardHealth, to: ShardHealth, reason: Option<String>) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            let mut last = self.last.lock();
            last.since = Utc::now();
            if reason.is_some() {
                last.reason = reason;
            }
            info!(from = %from, to = %to, "Shard health transition");
        }
        moved
    }
}
