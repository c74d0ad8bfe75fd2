//! Phase registry: the single source of truth for barrier state.
//!
//! Every connected client has exactly one entry mapping its id to the phase
//! its current message has reached. Handlers snapshot the set of registered
//! ids when a message arrives (the "active cohort") and later gate the
//! broadcast on `all_ready_for` over that snapshot, so clients joining or
//! leaving mid-round cannot stall an in-flight round.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Unique identifier for a connected client, assigned by the acceptor.
///
/// Ids are allocated from a monotonically increasing counter and are never
/// reused while the originating connection is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ordered phases a client's message passes through in one round.
///
/// Only the `>= Ready` comparison is load-bearing for the barrier; the
/// intermediate values exist for the status endpoint and log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for a new message.
    Waiting = 0,
    /// Message sent by the client (reported, not observed server-side).
    Sent = 1,
    /// Message received by the server.
    Received = 2,
    /// Language checked against the configured target.
    Checked = 3,
    TranslatingStarted = 4,
    TranslatingEnded = 5,
    /// Ready to broadcast.
    Ready = 6,
}

/// Shared, lock-guarded mapping from client id to current phase.
///
/// Cheap to clone (an `Arc` inside); every operation takes the single
/// internal lock for the duration of one map access only, so registry
/// operations are linearizable with respect to one another and no caller
/// ever observes the map mid-mutation. The lock must never be held across
/// a translation call or a network send.
#[derive(Debug, Clone, Default)]
pub struct PhaseRegistry {
    phases: Arc<Mutex<HashMap<ClientId, Phase>>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally set the phase for `id`, inserting if absent.
    pub fn update(&self, id: ClientId, phase: Phase) {
        let mut phases = self.phases.lock().expect("phase registry lock poisoned");
        phases.insert(id, phase);
        tracing::debug!(client = %id, ?phase, "phase updated");
    }

    /// Remove `id` if present. Idempotent.
    pub fn remove(&self, id: ClientId) {
        let mut phases = self.phases.lock().expect("phase registry lock poisoned");
        if phases.remove(&id).is_some() {
            tracing::debug!(client = %id, "removed from registry");
        }
    }

    /// Copy of the full mapping at a single instant.
    ///
    /// Used by the status endpoint only; the barrier path goes through
    /// `active_ids` and `all_ready_for`.
    pub fn snapshot(&self) -> HashMap<ClientId, Phase> {
        self.phases
            .lock()
            .expect("phase registry lock poisoned")
            .clone()
    }

    /// The set of currently registered ids, taken at a single instant.
    ///
    /// This is how a handler captures the active cohort for a round.
    pub fn active_ids(&self) -> HashSet<ClientId> {
        self.phases
            .lock()
            .expect("phase registry lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// True iff the registry is non-empty and every client is `>= Ready`.
    ///
    /// Whole-system view for reporting; not the gating predicate.
    pub fn all_ready(&self) -> bool {
        let phases = self.phases.lock().expect("phase registry lock poisoned");
        !phases.is_empty() && phases.values().all(|p| *p >= Phase::Ready)
    }

    /// True iff every id in `cohort` that is still registered is `>= Ready`.
    ///
    /// An id that has disconnected since the cohort snapshot was taken is
    /// vacuously satisfied: a departed client must not block the barrier.
    /// This is the predicate handlers gate the broadcast on.
    pub fn all_ready_for<'a, I>(&self, cohort: I) -> bool
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let phases = self.phases.lock().expect("phase registry lock poisoned");
        cohort
            .into_iter()
            .all(|id| phases.get(id).map_or(true, |p| *p >= Phase::Ready))
    }

    /// Reset every still-registered id in `cohort` back to `Waiting`.
    ///
    /// Ids no longer present are skipped silently.
    pub fn reset_subset<'a, I>(&self, cohort: I)
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let mut phases = self.phases.lock().expect("phase registry lock poisoned");
        for id in cohort {
            if let Some(phase) = phases.get_mut(id) {
                *phase = Phase::Waiting;
                tracing::debug!(client = %id, "reset to waiting");
            }
        }
    }
}
