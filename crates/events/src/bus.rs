//! Notification publishing/subscription abstraction.
//!
//! The ledger publishes a notification after each committed unit of work.
//! Sessions subscribe to receive pushed balance changes instead of polling
//! the account store.
//!
//! Delivery is best-effort fan-out: the account store is the source of truth,
//! and a consumer that misses a notification can always re-read balances.
//! Consumers must tolerate duplicates and out-of-order delivery by comparing
//! the envelope's `sequence_number` against the last version they applied.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to a notification stream.
///
/// Each subscription receives a copy of every message published after it was
/// created (broadcast semantics). Dropping the subscription unsubscribes.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// for envelope in subscription.drain() {
///     snapshot.apply(envelope);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every message that is already queued, without blocking.
    pub fn drain(&self) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            out.push(message);
        }
        out
    }
}

/// Transport-agnostic pub/sub bus.
///
/// ```text
/// LedgerService (commit) → EventBus (publish) → Session subscriptions
/// ```
///
/// Publication happens strictly **after** the store commit, so a subscriber
/// never observes a change that was later rolled back.
///
/// Implementations must be `Send + Sync`; publishers on different tasks may
/// publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
