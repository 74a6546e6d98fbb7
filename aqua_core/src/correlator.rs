//! Single-flight request/response correlation.
//!
//! Each outstanding request is an explicit [`PendingRequest`] stored in one
//! map keyed by [`RequestKind`]. The caller holds the matching
//! [`ResponseHandle`], which receives exactly one outcome: the decoded
//! response, a timeout, or a rejection from link teardown.

use std::collections::HashMap;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{DoserError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `CFG_GET` answered by a chunked document on the config channel.
    Config,
}

/// Result of handing an outcome to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Delivered,
    /// Nothing was waiting for this kind; the outcome was dropped.
    NoPending,
}

pub struct PendingRequest<T> {
    kind: RequestKind,
    deadline: Instant,
    tx: Option<Sender<Result<T>>>,
}

impl<T> PendingRequest<T> {
    pub fn new(kind: RequestKind, deadline: Instant) -> (Self, ResponseHandle<T>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            Self {
                kind,
                deadline,
                tx: Some(tx),
            },
            ResponseHandle { rx, taken: false },
        )
    }

    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    pub const fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    /// Deliver the outcome. Returns `false` if this request was already settled.
    pub fn complete(&mut self, outcome: Result<T>) -> bool {
        let Some(tx) = self.tx.take() else {
            tracing::error!(kind = ?self.kind, "request settled twice; outcome dropped");
            return false;
        };
        if tx.send(outcome).is_err() {
            tracing::debug!(kind = ?self.kind, "response handle dropped before delivery");
        }
        true
    }
}

impl<T> std::fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("kind", &self.kind)
            .field("deadline", &self.deadline)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Caller side of a request.
#[derive(Debug)]
pub struct ResponseHandle<T> {
    rx: Receiver<Result<T>>,
    taken: bool,
}

impl<T> ResponseHandle<T> {
    /// Take the outcome if it has arrived. Yields it at most once.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        if self.taken {
            return None;
        }
        match self.rx.try_recv() {
            Ok(outcome) => {
                self.taken = true;
                Some(outcome)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Whether an outcome has been delivered (taken or not).
    pub fn is_settled(&self) -> bool {
        self.taken || !self.rx.is_empty()
    }
}

pub struct Correlator<T> {
    pending: HashMap<RequestKind, PendingRequest<T>>,
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<T> Correlator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. Fails with `RequestInFlight` if one of the same kind is live.
    pub fn begin(&mut self, kind: RequestKind, deadline: Instant) -> Result<ResponseHandle<T>> {
        if self.pending.contains_key(&kind) {
            return Err(DoserError::RequestInFlight);
        }
        let (req, handle) = PendingRequest::new(kind, deadline);
        self.pending.insert(kind, req);
        Ok(handle)
    }

    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn deadline(&self, kind: RequestKind) -> Option<Instant> {
        self.pending.get(&kind).map(PendingRequest::deadline)
    }

    pub fn settle(&mut self, kind: RequestKind, outcome: Result<T>) -> Settle {
        match self.pending.remove(&kind) {
            Some(mut req) => {
                req.complete(outcome);
                Settle::Delivered
            }
            None => Settle::NoPending,
        }
    }

    /// Reject every request whose deadline is at or before `now` with `RequestTimeout`.
    pub fn expire(&mut self, now: Instant) -> Vec<RequestKind> {
        let overdue: Vec<RequestKind> = self
            .pending
            .iter()
            .filter(|(_, r)| r.deadline <= now)
            .map(|(k, _)| *k)
            .collect();
        for kind in &overdue {
            if let Some(mut req) = self.pending.remove(kind) {
                tracing::warn!(?kind, "request timed out");
                req.complete(Err(DoserError::RequestTimeout));
            }
        }
        overdue
    }

    /// Reject everything outstanding with `err`. Returns how many were rejected.
    pub fn reject_all(&mut self, err: &DoserError) -> usize {
        let n = self.pending.len();
        for (_, mut req) in self.pending.drain() {
            req.complete(Err(err.clone()));
        }
        n
    }

    /// Forget a request without delivering anything to its handle.
    pub fn cancel(&mut self, kind: RequestKind) -> bool {
        self.pending.remove(&kind).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_begin_is_in_flight() {
        let mut c: Correlator<u32> = Correlator::new();
        let t = Instant::now();
        let mut first = c.begin(RequestKind::Config, t).unwrap();
        assert!(matches!(
            c.begin(RequestKind::Config, t),
            Err(DoserError::RequestInFlight)
        ));
        assert_eq!(c.settle(RequestKind::Config, Ok(7)), Settle::Delivered);
        assert_eq!(first.try_take(), Some(Ok(7)));
        assert_eq!(first.try_take(), None);
        assert!(first.is_settled());
    }

    #[test]
    fn complete_twice_is_refused() {
        let (mut req, mut handle) = PendingRequest::<u32>::new(RequestKind::Config, Instant::now());
        assert!(req.complete(Ok(1)));
        assert!(!req.complete(Ok(2)));
        assert_eq!(handle.try_take(), Some(Ok(1)));
    }

    #[test]
    fn expire_only_overdue() {
        let mut c: Correlator<u32> = Correlator::new();
        let t0 = Instant::now();
        let mut h = c.begin(RequestKind::Config, t0 + Duration::from_secs(6)).unwrap();
        assert_eq!(c.deadline(RequestKind::Config), Some(t0 + Duration::from_secs(6)));
        assert!(c.expire(t0 + Duration::from_secs(5)).is_empty());
        assert!(!h.is_settled());
        assert_eq!(c.expire(t0 + Duration::from_secs(6)), vec![RequestKind::Config]);
        assert_eq!(h.try_take(), Some(Err(DoserError::RequestTimeout)));
        assert_eq!(c.settle(RequestKind::Config, Ok(1)), Settle::NoPending);
        assert_eq!(c.deadline(RequestKind::Config), None);
    }

    #[test]
    fn cancel_delivers_nothing() {
        let mut c: Correlator<u32> = Correlator::new();
        let mut h = c.begin(RequestKind::Config, Instant::now()).unwrap();
        assert!(c.cancel(RequestKind::Config));
        assert_eq!(h.try_take(), None);
        assert!(!h.is_settled());
    }

    #[test]
    fn settle_with_dropped_handle_is_harmless() {
        let mut c: Correlator<u32> = Correlator::new();
        drop(c.begin(RequestKind::Config, Instant::now()).unwrap());
        assert_eq!(c.settle(RequestKind::Config, Ok(3)), Settle::Delivered);
        assert!(!c.is_pending(RequestKind::Config));
    }
}
