#![forbid(unsafe_code)]

//! Observable request state: the single source of truth for one remote value.
//!
//! # Design
//!
//! [`RequestState<T>`] is held in one `Observable` cell owned by the
//! controller, which is its single writer. Consumers read or subscribe; they
//! never mutate.
//!
//! Two orthogonal axes describe the lifecycle:
//!
//! - [`Status`]: the coarse outcome state (`Idle → Pending → {Success,
//!   Error}`). A refetch after a settled outcome keeps the old status as
//!   stale display state rather than bouncing back through `Pending`.
//! - [`FetchStatus`]: the fine-grained activity state — whether a fetch is
//!   running right now (`Fetching`), waiting for connectivity (`Paused`), or
//!   not running (`Idle`).
//!
//! # Invariants
//!
//! 1. `pending` is true iff a fetch is logically in progress
//!    (`fetch_status` is `Fetching` or `Paused`).
//! 2. A successful fetch clears `error`; a failed fetch leaves `data`
//!    untouched (stale-while-error) but sets `error`.
//! 3. `data` is only readable once populated by a success or a seed; earlier
//!    reads fail with [`NeverFetched`] rather than returning a sentinel.

use web_time::SystemTime;

use crate::error::{FetchError, NeverFetched};

/// Coarse lifecycle state of the remote value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Never fetched and not fetching.
    Idle,
    /// The first fetch is in progress; no settled outcome yet.
    Pending,
    /// The most recent settled fetch failed.
    Error,
    /// The most recent settled fetch succeeded.
    Success,
}

/// Fine-grained activity state, independent of [`Status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch is running.
    Idle,
    /// A fetch attempt is in flight.
    Fetching,
    /// A fetch was requested while offline; it resumes when the online gate
    /// opens.
    Paused,
}

/// Snapshot of one remote value's lifecycle.
#[derive(Clone, Debug)]
pub struct RequestState<T> {
    /// Whether the controller is permitted to fetch.
    pub enabled: bool,
    /// Last successfully fetched value. Read through [`RequestState::data`].
    pub(crate) data: Option<T>,
    /// Last fetch failure; cleared by the next success.
    pub error: Option<FetchError>,
    /// Coarse lifecycle state.
    pub status: Status,
    /// Fine-grained activity state.
    pub fetch_status: FetchStatus,
    /// True while a fetch is logically in progress (fetching or paused).
    pub pending: bool,
    /// Wall-clock time of the most recently *initiated* fetch attempt,
    /// including attempts that went straight to `Paused`.
    pub last_fetch_time: Option<SystemTime>,
}

impl<T> RequestState<T> {
    pub(crate) fn idle(enabled: bool) -> Self {
        Self {
            enabled,
            data: None,
            error: None,
            status: Status::Idle,
            fetch_status: FetchStatus::Idle,
            pending: false,
            last_fetch_time: None,
        }
    }

    /// The fetched value.
    ///
    /// Fails with [`NeverFetched`] until the first successful fetch (or
    /// seeded initial value) populates it. After a later fetch failure the
    /// stale value remains readable (stale-while-error).
    pub fn data(&self) -> Result<&T, NeverFetched> {
        self.data.as_ref().ok_or(NeverFetched)
    }

    /// Whether a value has ever been populated.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
