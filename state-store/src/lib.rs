//! Latest-value state cells
//!
//! A small, device-agnostic library for publishing snapshots from a
//! producer task to any number of readers.
//!
//! # Features
//!
//! - **Atomic replacement**: Each publish swaps the whole value
//! - **Non-blocking reads**: `current()` never waits
//! - **Latest-first subscriptions**: New subscribers see the current value first
//! - **Change detection**: `publish_if_changed()` skips identical values
//! - **Stream adapter**: Subscriptions convert into `futures::Stream`
//!
//! # Quick Start
//!
//! ```rust
//! use state_store::Publisher;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! #[derive(Clone, PartialEq, Debug)]
//! struct SignalStrength(u8);
//!
//! let publisher = Publisher::new();
//! publisher.publish(SignalStrength(78));
//!
//! let mut sub = publisher.subscribe();
//! assert_eq!(sub.next().await, Some(SignalStrength(78)));
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Publisher<T> ──owns── watch::Sender<Option<T>>
//!     │
//!     ├── reader()    -> StateReader<T>  (current, subscribe)
//!     └── subscribe() -> Subscription<T> (next, into_stream)
//! ```

pub mod publisher;

pub use publisher::{Publisher, StateReader, Subscription};
