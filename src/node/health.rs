//! # Node Health
//!
//! Per-node availability state machine. Lock-free: the only state mutated on
//! the request path lives in atomics.
//!
//! ```text
//!            success                   K failures in window
//! Unknown ───────────────▶ Up ─────────────────────────────▶ Down
//!    ▲  │                   ▲                                  │
//!    │  │ K failures        │ probe succeeds                   │ cooldown elapsed
//!    │  └──────────▶ Down   └───────── Unknown (probing) ◀─────┘
//!    │                                   │ probe fails
//!    └──── (never permanent) ───────────▶ Down
//! ```
//!
//! After the cooldown exactly one caller wins the `Down → Unknown` transition
//! and carries the probe request; everyone else keeps skipping the node until
//! that probe resolves or is itself older than a cooldown.
//!
//! The state and the time it was entered share one `AtomicU64`, so a Down
//! state is never observed without its cooldown start.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// Availability state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// No outcome observed yet, or probing after a cooldown
    Unknown = 0,
    /// Last request succeeded
    Up = 1,
    /// Skipped until the cooldown elapses
    Down = 2,
}

/// Internal encoding of Unknown with the post-cooldown probe in flight
const PROBING: u8 = 3;

/// Low bits of the packed status word hold the state
const STATE_MASK: u64 = 0b11;

#[inline]
fn pack(since_epoch_nanos: u64, state: u8) -> u64 {
    (since_epoch_nanos & !STATE_MASK) | u64::from(state)
}

#[inline]
fn unpack(status: u64) -> (u64, u8) {
    (status & !STATE_MASK, (status & STATE_MASK) as u8)
}

impl From<u8> for NodeState {
    fn from(value: u8) -> Self {
        match value {
            0 | PROBING => NodeState::Unknown,
            1 => NodeState::Up,
            _ => NodeState::Down,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Unknown => f.write_str("unknown"),
            NodeState::Up => f.write_str("up"),
            NodeState::Down => f.write_str("down"),
        }
    }
}

/// Thresholds driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Consecutive failures that mark a node Down
    pub failure_threshold: u32,
    /// Failures further apart than this do not accumulate
    pub failure_window: Duration,
    /// Time a Down node is skipped before a probe is allowed
    pub cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

#[inline]
fn epoch_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

/// Health tracker owned by one node
#[derive(Debug)]
pub struct NodeHealth {
    name: String,
    policy: HealthPolicy,
    /// State in the low two bits, epoch nanos it was entered above them
    status: AtomicU64,
    consecutive_failures: AtomicU32,
    /// Epoch nanos of the most recent failure (0 = never failed)
    last_failure_epoch_nanos: AtomicU64,
}

impl NodeHealth {
    pub fn new(name: impl Into<String>, policy: HealthPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            status: AtomicU64::new(pack(0, NodeState::Unknown as u8)),
            consecutive_failures: AtomicU32::new(0),
            last_failure_epoch_nanos: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> NodeState {
        NodeState::from(unpack(self.status.load(Ordering::Acquire)).1)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Time of the most recent failure, if any
    pub fn last_failure_at(&self) -> Option<SystemTime> {
        match self.last_failure_epoch_nanos.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(UNIX_EPOCH + Duration::from_nanos(nanos)),
        }
    }

    /// Whether a request may be sent to this node now.
    ///
    /// Returns `true` for the single caller that performs the post-cooldown
    /// probe; that caller should report the outcome through
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure). A probe whose outcome never
    /// arrives (the caller was cancelled) is reclaimed after another cooldown.
    pub fn should_allow(&self) -> bool {
        let status = self.status.load(Ordering::Acquire);
        let (since, raw) = unpack(status);
        if raw != PROBING && NodeState::from(raw) != NodeState::Down {
            return true;
        }

        let now = epoch_nanos_now();
        if Duration::from_nanos(now.saturating_sub(since)) < self.policy.cooldown {
            return false;
        }

        // Winning the swap elects the prober
        if self
            .status
            .compare_exchange(status, pack(now, PROBING), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        info!(
            node = %self.name,
            cooldown_ms = self.policy.cooldown.as_millis() as u64,
            "Node cooldown elapsed, probing"
        );
        true
    }

    /// Record a request that reached the node and got an answer
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let previous = self
            .status
            .swap(pack(epoch_nanos_now(), NodeState::Up as u8), Ordering::AcqRel);
        let previous = NodeState::from(unpack(previous).1);

        if previous != NodeState::Up {
            info!(node = %self.name, previous = %previous, "Node is up");
        }
    }

    /// Record a network-level failure against the node
    pub fn record_failure(&self) {
        let now = epoch_nanos_now();
        let previous_failure = self.last_failure_epoch_nanos.swap(now, Ordering::AcqRel);
        let window_expired = previous_failure == 0
            || Duration::from_nanos(now.saturating_sub(previous_failure)) > self.policy.failure_window;

        let failures = if window_expired {
            self.consecutive_failures.store(1, Ordering::Relaxed);
            1
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
        };

        if unpack(self.status.load(Ordering::Acquire)).1 == PROBING {
            self.transition_to_down(now, failures, "probe failed");
            return;
        }

        match self.state() {
            NodeState::Down => {}
            NodeState::Up | NodeState::Unknown => {
                if failures >= self.policy.failure_threshold {
                    self.transition_to_down(now, failures, "failure threshold reached");
                } else {
                    debug!(
                        node = %self.name,
                        consecutive_failures = failures,
                        failure_threshold = self.policy.failure_threshold,
                        "Node request failed"
                    );
                }
            }
        }
    }

    /// Force the node Down, starting a fresh cooldown
    pub fn force_down(&self) {
        self.transition_to_down(epoch_nanos_now(), self.consecutive_failures(), "forced");
    }

    fn transition_to_down(&self, now: u64, failures: u32, reason: &str) {
        self.status
            .store(pack(now, NodeState::Down as u8), Ordering::Release);

        error!(
            node = %self.name,
            consecutive_failures = failures,
            cooldown_ms = self.policy.cooldown.as_millis() as u64,
            reason = reason,
            "Node marked down"
        );
    }
}
