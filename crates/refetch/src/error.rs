#![forbid(unsafe_code)]

//! Error types for the fetch lifecycle.
//!
//! Two distinct failure families exist and must stay distinguishable:
//!
//! - [`FetchError`]: a recoverable fetch failure, surfaced only through
//!   [`RequestState::error`](crate::state::RequestState); never returned from
//!   `fetch()`.
//! - [`NeverFetched`]: a programmer error — the remote value was read before
//!   any successful fetch or seed. Consumers can tell "never fetched" apart
//!   from "fetch failed" by the error type alone.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// A cloneable, type-erased fetch failure.
///
/// Wraps whatever the fetcher produced behind a reference count so the value
/// can live in the observable state cell, which hands out clones.
///
/// `FetchError` deliberately does not implement [`std::error::Error`]; the
/// blanket `From<E: Error>` conversion lets fetchers use `?` on any concrete
/// error type.
pub struct FetchError {
    inner: Rc<dyn StdError + 'static>,
}

impl FetchError {
    /// Wrap a concrete error.
    pub fn new(error: impl StdError + 'static) -> Self {
        Self {
            inner: Rc::new(error),
        }
    }

    /// Construct from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + 'static) {
        self.inner.as_ref()
    }
}

impl Clone for FetchError {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<E: StdError + 'static> From<E> for FetchError {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// Message-only error body for [`FetchError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// The remote value was read before any successful fetch or seeded value.
///
/// Distinct from a fetch failure: `status == Error` still leaves previously
/// fetched data readable (stale-while-error), while `NeverFetched` means no
/// data has ever existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("remote value read before the first successful fetch")]
pub struct NeverFetched;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
