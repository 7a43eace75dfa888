#![forbid(unsafe_code)]

//! Shared, version-tracked value cells with subscriber notification.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value in shared, reference-counted storage.
//! Subscribers register a callback and receive the current value immediately
//! (replay), then again after every mutation. Cloning an `Observable` creates
//! a new handle to the **same** inner cell.
//!
//! Notification takes a snapshot of the subscriber list and releases the
//! interior borrow before invoking any callback, so callbacks may call
//! `get()`, `subscribe()`, or drop their own [`Subscription`] while a
//! notification cycle is running.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the value is already committed; remaining
//!   subscribers in the current cycle are not notified.
//! - **Cell dropped before subscription**: the subscription becomes inert;
//!   dropping it is a no-op.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// One registered subscriber.
struct Subscriber<T> {
    id: u64,
    callback: Rc<dyn Fn(&T)>,
}

struct ObservableInner<T> {
    value: T,
    /// Monotonically increasing version, bumped on each mutation.
    version: u64,
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
}

/// A shared, observable value holder.
///
/// # Invariants
///
/// 1. `version` increments by 1 on each committed mutation.
/// 2. Subscribers are notified in registration order.
/// 3. A subscriber never observes a value older than the one replayed to it
///    at registration.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Current value, by clone.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure mutates the same cell (re-entrant `set`).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = self.inner.borrow();
        f(&inner.value)
    }

    /// Replace the value unconditionally and notify all subscribers.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Replace the value only if it differs from the current one.
    ///
    /// Setting an equal value is a no-op: no version bump, no notifications.
    pub fn set_neq(&self, value: T)
    where
        T: PartialEq,
    {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Register `callback` for change notification.
    ///
    /// The callback is invoked immediately with the current value (replay),
    /// then again after every subsequent mutation, until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&T)> = Rc::new(callback);
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push(Subscriber {
                id,
                callback: Rc::clone(&callback),
            });
            id
        };

        // Replay outside the borrow so the callback may reach back into the
        // cell.
        let current = self.get();
        callback(&current);

        let weak = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || remove_subscriber(&weak, id))),
        }
    }

    /// Current version number. Increments by 1 on each committed mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// A read-only handle onto the same cell.
    #[must_use]
    pub fn read_only(&self) -> Readable<T> {
        Readable {
            inner: Rc::clone(&self.inner),
        }
    }

    fn notify(&self) {
        // Snapshot under the borrow, invoke after releasing it.
        let (value, callbacks): (T, Vec<Rc<dyn Fn(&T)>>) = {
            let inner = self.inner.borrow();
            (
                inner.value.clone(),
                inner.subscribers.iter().map(|s| Rc::clone(&s.callback)).collect(),
            )
        };
        for callback in callbacks {
            callback(&value);
        }
    }
}

fn remove_subscriber<T>(inner: &Weak<RefCell<ObservableInner<T>>>, id: u64) {
    if let Some(strong) = inner.upgrade() {
        strong.borrow_mut().subscribers.retain(|s| s.id != id);
    }
}

/// Read-only handle onto an [`Observable`] cell.
///
/// Exposes `get`/`with`/`subscribe`/`version` but not `set`, so state owners
/// can publish a cell while remaining its single writer.
pub struct Readable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Readable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Readable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + 'static> Readable<T> {
    /// Current value, by clone.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = self.inner.borrow();
        f(&inner.value)
    }

    /// Register `callback` for change notification, with immediate replay.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let writer = Observable {
            inner: Rc::clone(&self.inner),
        };
        writer.subscribe(callback)
    }

    /// Current version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }
}

/// RAII guard for a registered subscriber.
///
/// Dropping the guard removes the callback before the next notification
/// cycle. Dropping it after the cell itself has been dropped is a no-op.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
