//! Single-flight refresh state machine.
//!
//! States are `Idle` and `Refreshing`. The first caller to [`RefreshState::join`]
//! while idle becomes the [`RefreshLeader`] and performs the refresh call;
//! every caller that joins while a refresh is in flight gets a
//! [`PendingRefresh`] and waits for the leader's outcome. The leader settles
//! all waiters in FIFO order with one shared result, then the state returns
//! to `Idle` with an empty queue.
//!
//! The check-and-set happens under a mutex with no suspension point inside,
//! so exactly one leader exists per refresh cycle even on a multi-threaded
//! runtime. If the leader is dropped before settling (its future cancelled),
//! the waiters are rejected with [`ErrorKind::RefreshAbandoned`] rather than
//! left hanging.

use crate::error::{ApiError, ErrorKind};
use crate::secret::SecretString;
use crate::sync::MutexExt;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Shared outcome of one refresh cycle: the new access token or the error.
pub type RefreshOutcome = Result<SecretString, ApiError>;

#[derive(Default)]
struct Inner {
    refreshing: bool,
    pending: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Refresh flag plus FIFO waiter queue, owned by one client instance.
#[derive(Default)]
pub struct RefreshState {
    inner: Mutex<Inner>,
}

/// Role assigned by [`RefreshState::join`].
pub enum RefreshTicket<'a> {
    /// Caller must perform the refresh and settle the cycle.
    Leader(RefreshLeader<'a>),
    /// Caller must wait for the in-flight refresh.
    Waiter(PendingRefresh),
}

impl RefreshState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the refresh protocol.
    ///
    /// Returns `Leader` if no refresh is in flight (and marks one as started),
    /// otherwise enqueues the caller and returns `Waiter`.
    pub fn join(&self) -> RefreshTicket<'_> {
        let mut inner = self.inner.lock_or_recover();

        if inner.refreshing {
            let (tx, rx) = oneshot::channel();
            let position = inner.pending.len();
            inner.pending.push_back(tx);
            debug!(target: "site.refresh", position, "Refresh in flight, request queued");
            RefreshTicket::Waiter(PendingRefresh { rx, position })
        } else {
            inner.refreshing = true;
            debug!(target: "site.refresh", "Starting refresh cycle");
            RefreshTicket::Leader(RefreshLeader {
                state: self,
                settled: false,
            })
        }
    }

    /// `true` while a refresh cycle is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_or_recover().refreshing
    }

    /// Number of callers waiting on the in-flight refresh.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock_or_recover().pending.len()
    }

    /// Return to `Idle` and settle every waiter, in enqueue order.
    fn settle(&self, outcome: &RefreshOutcome) -> usize {
        let pending = {
            let mut inner = self.inner.lock_or_recover();
            inner.refreshing = false;
            std::mem::take(&mut inner.pending)
        };

        let count = pending.len();
        for tx in pending {
            // A waiter whose caller went away has dropped its receiver.
            let _ = tx.send(outcome.clone());
        }
        count
    }
}

impl fmt::Debug for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock_or_recover();
        f.debug_struct("RefreshState")
            .field("refreshing", &inner.refreshing)
            .field("pending", &inner.pending.len())
            .finish()
    }
}

/// Exclusive right to perform the current refresh call.
///
/// Must be settled with [`RefreshLeader::succeed`] or [`RefreshLeader::fail`];
/// dropping it unsettled rejects all waiters.
pub struct RefreshLeader<'a> {
    state: &'a RefreshState,
    settled: bool,
}

impl RefreshLeader<'_> {
    /// Resolve every waiter with the new access token.
    ///
    /// Returns how many waiters were resolved.
    pub fn succeed(mut self, access: &SecretString) -> usize {
        self.settled = true;
        let resolved = self.state.settle(&Ok(access.clone()));
        debug!(target: "site.refresh", resolved, "Refresh succeeded, queue drained");
        resolved
    }

    /// Reject every waiter with the refresh error.
    ///
    /// Returns how many waiters were rejected.
    pub fn fail(mut self, err: &ApiError) -> usize {
        self.settled = true;
        let rejected = self.state.settle(&Err(err.clone()));
        warn!(
            target: "site.refresh",
            rejected,
            status = ?err.status,
            "Refresh failed, queue rejected"
        );
        rejected
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let err = ApiError::new(
                ErrorKind::RefreshAbandoned,
                "Token refresh was abandoned before completing",
            );
            let rejected = self.state.settle(&Err(err));
            warn!(target: "site.refresh", rejected, "Refresh leader dropped unsettled");
        }
    }
}

impl fmt::Debug for RefreshLeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshLeader")
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

/// A caller queued behind the in-flight refresh.
#[derive(Debug)]
pub struct PendingRefresh {
    rx: oneshot::Receiver<RefreshOutcome>,
    position: usize,
}

impl PendingRefresh {
    /// Zero-based position in the queue at enqueue time.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Wait for the shared refresh outcome.
    ///
    /// # Errors
    ///
    /// The leader's refresh error, or `RefreshAbandoned` if the cycle ended
    /// without an outcome.
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or_else(|_| {
            Err(ApiError::new(
                ErrorKind::RefreshAbandoned,
                "Token refresh ended without an outcome",
            ))
        })
    }
}
