//! Published snapshot plus the bookkeeping that guards it
//!
//! Two counters live under one mutex:
//!
//! - tickets order results. A probe takes its ticket when it starts; a
//!   mutation takes one when it commits. Only a ticket newer than the last
//!   published one may change the status.
//! - `in_flight` counts running operations. `loading` is exactly
//!   `in_flight > 0` once the first operation has begun.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::error::AuthError;
use crate::types::{AuthSnapshot, SessionStatus};

pub(crate) type Ticket = u64;

#[derive(Debug, Default)]
struct Ledger {
    issued: Ticket,
    published: Ticket,
    in_flight: usize,
}

pub(crate) struct SessionState {
    ledger: Mutex<Ledger>,
    tx: watch::Sender<AuthSnapshot>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::default());
        Self {
            ledger: Mutex::new(Ledger::default()),
            tx,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // The ledger holds plain counters; a panic elsewhere cannot leave it torn
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    /// Mark an operation as running until the returned guard drops
    pub(crate) fn begin(self: &Arc<Self>) -> InFlight {
        let mut ledger = self.ledger();
        ledger.in_flight += 1;
        self.tx.send_if_modified(|snapshot| !std::mem::replace(&mut snapshot.loading, true));
        drop(ledger);

        InFlight {
            state: Arc::clone(self),
        }
    }

    pub(crate) fn ticket(&self) -> Ticket {
        let mut ledger = self.ledger();
        ledger.issued += 1;
        ledger.issued
    }

    /// Publish a probe's `status` if `ticket` is still current. Returns
    /// false when a newer result has already been published. The error
    /// field is left alone.
    pub(crate) fn commit(&self, ticket: Ticket, status: SessionStatus) -> bool {
        let mut ledger = self.ledger();
        self.publish(&mut ledger, ticket, status, false)
    }

    /// Publish the outcome of a mutation that just succeeded, clearing
    /// any earlier error
    pub(crate) fn commit_now(&self, status: SessionStatus) {
        let mut ledger = self.ledger();
        ledger.issued += 1;
        let ticket = ledger.issued;
        self.publish(&mut ledger, ticket, status, true);
    }

    fn publish(&self, ledger: &mut Ledger, ticket: Ticket, status: SessionStatus, clear_error: bool) -> bool {
        if ticket <= ledger.published {
            tracing::debug!(ticket, published = ledger.published, "Dropping stale session result");
            return false;
        }
        ledger.published = ticket;
        self.tx.send_if_modified(|snapshot| {
            let mut changed = snapshot.status != status;
            snapshot.status = status;
            if clear_error {
                changed |= snapshot.error.take().is_some();
            }
            changed
        });
        true
    }

    /// Record a failed probe. The status is kept, except that a first
    /// probe failing resolves `Unknown` to `Unauthenticated`.
    pub(crate) fn commit_failure(&self, ticket: Ticket, error: AuthError) -> bool {
        let mut ledger = self.ledger();
        if ticket <= ledger.published {
            return false;
        }
        ledger.published = ticket;
        self.tx.send_modify(|snapshot| {
            if snapshot.status == SessionStatus::Unknown {
                snapshot.status = SessionStatus::Unauthenticated;
            }
            snapshot.error = Some(error);
        });
        true
    }

    /// Surface an error without touching the status
    pub(crate) fn report(&self, error: AuthError) {
        let _ledger = self.ledger();
        self.tx.send_modify(|snapshot| snapshot.error = Some(error));
    }

    pub(crate) fn clear_error(&self) {
        let _ledger = self.ledger();
        self.tx.send_if_modified(|snapshot| snapshot.error.take().is_some());
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.ledger().in_flight
    }
}

/// Keeps `loading` set while alive
///
/// Dropping it (normal return, `?`, panic unwinding or the future being
/// cancelled) decrements the in-flight count and clears `loading` when it
/// reaches zero.
pub(crate) struct InFlight {
    state: Arc<SessionState>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut ledger = self.state.ledger();
        ledger.in_flight = ledger.in_flight.saturating_sub(1);
        if ledger.in_flight == 0 {
            self.state
                .tx
                .send_if_modified(|snapshot| std::mem::replace(&mut snapshot.loading, false));
        }
    }
}
