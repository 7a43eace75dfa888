#![forbid(unsafe_code)]

//! Reactive value cells for the refetch controller.
//!
//! This crate provides the change-tracking primitive the fetch lifecycle is
//! built on:
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Readable`]: a read-only handle onto the same cell, for handing out
//!   observable state without granting write access.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Notification runs over a snapshot of the subscriber list, so
//! callbacks may freely subscribe, unsubscribe, or mutate the cell
//! re-entrantly.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation.
//! 2. Subscribers are notified in registration order.
//! 3. `subscribe()` replays the current value to the new subscriber
//!    immediately, then again on every subsequent change.
//! 4. `set_neq()` with a value equal to the current one is a no-op (no
//!    version bump, no notifications).
//! 5. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.

pub mod observable;

pub use observable::{Observable, Readable, Subscription};
