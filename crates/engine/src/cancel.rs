//! Per-run cancellation tokens.
//!
//! Each accepted run gets a `CancelToken`. The executor checks it at every
//! step boundary; in-flight capability calls are bounded by their own
//! deadlines, so a cancelled run terminates within one capability timeout.
//! The run-level deadline trips the same token with a `Deadline` reason.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    User,
    Deadline,
}

const STATE_LIVE: u8 = 0;
const STATE_USER: u8 = 1;
const STATE_DEADLINE: u8 = 2;

/// A cancellation token checked by the run loop. Idempotent: the first
/// cancel wins; later calls keep the original reason.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(STATE_LIVE)),
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        let next = match reason {
            CancelReason::User => STATE_USER,
            CancelReason::Deadline => STATE_DEADLINE,
        };
        let _ = self
            .state
            .compare_exchange(STATE_LIVE, next, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_LIVE
    }

    pub fn reason(&self) -> Option<CancelReason> {
        match self.state.load(Ordering::Acquire) {
            STATE_USER => Some(CancelReason::User),
            STATE_DEADLINE => Some(CancelReason::Deadline),
            _ => None,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the active cancel token per running run.
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a token for a run.
    pub fn register(&self, run_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Signal user cancellation. Returns true when a token was found.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.tokens.lock().get(&run_id) {
            Some(token) => {
                token.cancel(CancelReason::User);
                true
            }
            None => false,
        }
    }

    /// Remove the token when a run reaches terminal state.
    pub fn remove(&self, run_id: Uuid) {
        self.tokens.lock().remove(&run_id);
    }

    /// Whether a run currently owns a token (i.e. is in flight).
    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&run_id)
    }

    /// Number of in-flight runs (used for the soft concurrency cap).
    pub fn active_count(&self) -> usize {
        self.tokens.lock().len()
    }
}
