//! Satellite liveness derived from the last-contact timestamp.
//!
//! Liveness is never stored; it is recomputed from `last_contact` and the
//! current time. There is no terminal state: any successful contact moves a
//! satellite back to [`Liveness::Online`].
//!
//! ```text
//! Unknown ──contact──► Online ──45s──► Stale ──60s──► Offline
//!                        ▲                               │
//!                        └──────────── contact ──────────┘
//! ```

use std::time::Duration;
use sync_types::Timestamp;

/// Perceived liveness of a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Liveness {
    /// Never heard from (`last_contact == 0`).
    Unknown,
    /// Contacted within the pull window.
    Online,
    /// Past the pull window but not yet offline; a pull is due.
    Stale,
    /// No qualifying contact within the offline window.
    Offline,
}

impl Liveness {
    /// Whether the satellite counts as online (`Online` or `Stale`).
    pub fn is_online(&self) -> bool {
        matches!(self, Liveness::Online | Liveness::Stale)
    }

    /// Short lowercase label for status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Liveness::Unknown => "unknown",
            Liveness::Online => "online",
            Liveness::Stale => "stale",
            Liveness::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staleness windows used to classify a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    /// Elapsed time after which the controller pulls (default 45s).
    pub pull_after: Duration,
    /// Elapsed time at which the satellite is considered offline (default 60s).
    pub offline_after: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            pull_after: Duration::from_secs(45),
            offline_after: Duration::from_secs(60),
        }
    }
}

impl LivenessPolicy {
    /// Create a policy with explicit windows.
    pub fn new(pull_after: Duration, offline_after: Duration) -> Self {
        Self {
            pull_after,
            offline_after,
        }
    }

    /// Classify a satellite given its last contact and the current time.
    pub fn classify(&self, last_contact: Timestamp, now: Timestamp) -> Liveness {
        if last_contact.is_never() {
            return Liveness::Unknown;
        }

        let elapsed = last_contact.elapsed_at(now);
        if elapsed >= self.offline_after {
            Liveness::Offline
        } else if elapsed > self.pull_after {
            Liveness::Stale
        } else {
            Liveness::Online
        }
    }

    /// `last_contact != 0 AND now - last_contact < offline_after`.
    pub fn is_online(&self, last_contact: Timestamp, now: Timestamp) -> bool {
        self.classify(last_contact, now).is_online()
    }

    /// Whether the node has been quiet long enough to warrant a pull.
    ///
    /// A satellite that was never contacted always needs a pull.
    pub fn needs_pull(&self, last_contact: Timestamp, now: Timestamp) -> bool {
        last_contact.is_never() || last_contact.elapsed_at(now) > self.pull_after
    }
}

/// A change in perceived liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessTransition {
    /// Previous classification.
    pub from: Liveness,
    /// New classification.
    pub to: Liveness,
}

impl LivenessTransition {
    /// The satellite just became reachable.
    pub fn came_online(&self) -> bool {
        !self.from.is_online() && self.to.is_online()
    }

    /// The satellite just dropped off.
    pub fn went_offline(&self) -> bool {
        self.from.is_online() && !self.to.is_online()
    }
}

/// Remembers the last observed classification so callers can react to edges
/// (log once when a satellite drops, not on every tick).
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    current: Liveness,
}

impl LivenessTracker {
    /// Start tracking from an initial classification.
    pub fn new(initial: Liveness) -> Self {
        Self { current: initial }
    }

    /// Current classification.
    pub fn current(&self) -> Liveness {
        self.current
    }

    /// Record a new observation. Returns the transition if it changed.
    pub fn observe(&mut self, next: Liveness) -> Option<LivenessTransition> {
        if next == self.current {
            return None;
        }
        let transition = LivenessTransition {
            from: self.current,
            to: next,
        };
        self.current = next;
        Some(transition)
    }
}
