//! Latest-value cell with subscribers
//!
//! This module provides the write and read halves of a single state cell:
//! - `Publisher<T>`: owned by the producer, replaces the value atomically
//! - `StateReader<T>`: cheap cloneable handle for readers
//! - `Subscription<T>`: async sequence of values, latest first

use futures::stream::{self, Stream};
use tokio::sync::watch;

/// Write half of a state cell
///
/// Holds at most one value. Each publish swaps the whole value and wakes
/// every subscriber; readers never observe a partially updated value.
/// Dropping the publisher (or calling [`close`](Publisher::close)) ends
/// all subscriptions.
///
/// # Example
///
/// ```rust
/// use state_store::Publisher;
///
/// let publisher = Publisher::new();
/// assert_eq!(publisher.current(), None::<u32>);
///
/// publisher.publish(7);
/// assert_eq!(publisher.current(), Some(7));
/// ```
#[derive(Debug)]
pub struct Publisher<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
    /// Create an empty cell
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current value and notify subscribers
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Latest value, `None` before the first publish
    pub fn current(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Subscribe to this cell's values
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::new(self.tx.subscribe())
    }

    /// A read-only handle that outlives borrows of the publisher
    pub fn reader(&self) -> StateReader<T> {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Tear the cell down; subscriptions end after their pending value
    pub fn close(self) {
        drop(self);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Publisher<T> {
    /// Publish only if `value` differs from the current one
    ///
    /// Returns `true` if subscribers were notified.
    pub fn publish_if_changed(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref() != Some(&value) {
                *current = Some(value);
                true
            } else {
                false
            }
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read half of a state cell
#[derive(Debug, Clone)]
pub struct StateReader<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> StateReader<T> {
    /// Latest value, `None` before the first publish
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::new(self.rx.clone())
    }

    /// Whether the publisher has gone away
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

/// Async sequence of published values
///
/// The first call to [`next`](Subscription::next) yields the value current
/// at subscription time (if any); later calls yield each newer value.
/// Values published faster than the subscriber reads are coalesced: only
/// the most recent one is seen.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<Option<T>>,
    primed: bool,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    fn new(rx: watch::Receiver<Option<T>>) -> Self {
        Self { rx, primed: true }
    }

    /// Wait for the next value
    ///
    /// Returns `None` once the publisher is closed.
    pub async fn next(&mut self) -> Option<T> {
        if std::mem::take(&mut self.primed) {
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }

        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Adapt into a [`Stream`] of values
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut sub| async move {
            let value = sub.next().await?;
            Some((value, sub))
        }))
    }
}
