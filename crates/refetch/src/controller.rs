#![forbid(unsafe_code)]

//! The fetch-lifecycle controller.
//!
//! # Design
//!
//! [`FetchController`] owns the lifecycle of one remote value: it decides
//! whether a fetch may run (enabled gating, online gating, source-change
//! deduplication), guarantees at most one logically current in-flight
//! attempt, and maps attempt outcomes onto race-free transitions of an
//! observable [`RequestState`] cell.
//!
//! An *attempt* is one execution of the fetcher, identified by a generation
//! number and a [`CancellationToken`]. Starting attempt N+1 cancels attempt
//! N's token before N+1 begins; the fetcher may observe the token and bail
//! early, but correctness never depends on it doing so — every outcome is
//! applied under a generation check, so even a fetcher that ignores
//! cancellation and resolves late cannot corrupt state. The most recently
//! started attempt always wins.
//!
//! # Concurrency
//!
//! Single-threaded cooperative scheduling: controller types are `!Send` and
//! all state mutation happens synchronously inside signal callbacks or task
//! continuations. Attempt futures run on the current thread via
//! [`tokio::task::spawn_local`], so an enabled controller must live inside a
//! [`tokio::task::LocalSet`] on a current-thread runtime.
//!
//! # State machine
//!
//! ```text
//!            enable(true) / source change / fetch()
//!   idle/idle ──────────────────────────────▶ pending/fetching ──▶ success/idle
//!        │                                        │     ▲              │
//!        │ (offline)                              ▼     │ (online)     ▼ refetch
//!        └────────────▶ pending/paused ───────────┴─────┘        success/fetching
//! ```
//!
//! Error mirrors success: a settled `error/idle` state refetches through
//! `error/fetching`, keeping the stale outcome visible while the new attempt
//! runs.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use web_time::SystemTime;

use refetch_reactive::{Observable, Readable, Subscription};

use crate::client::Client;
use crate::compare::{ChangeDetector, KeyedDetector};
use crate::error::FetchError;
use crate::gate::Gate;
use crate::state::{FetchStatus, RequestState, Status};

/// Boxed fetcher: produces the remote value for a source value while
/// observing the attempt's cancellation token.
type Fetcher<T, U> =
    Box<dyn Fn(U, CancellationToken) -> LocalBoxFuture<'static, Result<T, FetchError>>>;

/// Capability interface over the reactive source cell.
///
/// The controller consumes the source through this trait only; any reactive
/// primitive with synchronous `get` and replay-on-subscribe semantics can
/// drive a controller.
pub trait SourceCell<V> {
    /// Current source value.
    fn get(&self) -> V;

    /// Register `callback` with immediate replay of the current value and
    /// invocation on every subsequent change.
    fn subscribe(&self, callback: Box<dyn Fn(&V)>) -> Subscription;
}

impl<V: Clone + 'static> SourceCell<V> for Observable<V> {
    fn get(&self) -> V {
        Observable::get(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&V)>) -> Subscription {
        Observable::subscribe(self, callback)
    }
}

impl<V: Clone + 'static> SourceCell<V> for Readable<V> {
    fn get(&self) -> V {
        Readable::get(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&V)>) -> Subscription {
        Readable::subscribe(self, callback)
    }
}

/// Seed values for [`FetchController::set_initial`].
///
/// Unlike construction seeding, both fields may be populated here; the error
/// then wins as the authoritative status while the data stays readable
/// underneath.
#[derive(Debug, Default)]
pub struct Initial<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
}

impl<T> Initial<T> {
    /// Seed a successful value.
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Seed a failure.
    pub fn error(error: FetchError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }
}

/// Configuration surface for [`FetchController::new`].
pub struct FetchOptions<T, U> {
    source: Rc<dyn SourceCell<U>>,
    fetcher: Fetcher<T, U>,
    detector: Option<Box<dyn ChangeDetector<U>>>,
    enabled: bool,
    seed_data: Option<T>,
    seed_error: Option<FetchError>,
}

impl<T: 'static, U: 'static> FetchOptions<T, U> {
    /// Options for fetching from `source` with `fetcher`.
    ///
    /// The fetcher must be safe to invoke repeatedly and
    /// concurrently-in-flight; only one outcome is ever applied.
    pub fn new<S, F, Fut>(source: S, fetcher: F) -> Self
    where
        S: SourceCell<U> + 'static,
        F: Fn(U, CancellationToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, FetchError>> + 'static,
    {
        Self {
            source: Rc::new(source),
            fetcher: Box::new(move |value, token| fetcher(value, token).boxed_local()),
            detector: None,
            enabled: false,
            seed_data: None,
            seed_error: None,
        }
    }

    /// Initial enabled state (default false).
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Deduplicate fetches by a comparison key extracted from the source
    /// value.
    ///
    /// A fetch is skipped when the extracted key equals the previously
    /// stored one. Returning a `Vec` gives dependency-array style
    /// element-wise comparison.
    #[must_use]
    pub fn compare<K: PartialEq + 'static>(mut self, extract: impl Fn(&U) -> K + 'static) -> Self {
        self.detector = Some(Box::new(KeyedDetector::new(extract)));
        self
    }

    /// Seed a successful value at construction. Mutually exclusive with
    /// [`initial_error`](Self::initial_error).
    #[must_use]
    pub fn initial_data(mut self, data: T) -> Self {
        self.seed_data = Some(data);
        self
    }

    /// Seed a failure at construction. Mutually exclusive with
    /// [`initial_data`](Self::initial_data).
    #[must_use]
    pub fn initial_error(mut self, error: FetchError) -> Self {
        self.seed_error = Some(error);
        self
    }
}

struct ControllerInner<T, U> {
    state: Observable<RequestState<T>>,
    source: Rc<dyn SourceCell<U>>,
    online: Gate,
    /// Cleared on destroy.
    fetcher: RefCell<Option<Fetcher<T, U>>>,
    detector: RefCell<Option<Box<dyn ChangeDetector<U>>>>,
    /// Identity of the current attempt; bumped on every supersession.
    generation: Cell<u64>,
    current_token: RefCell<Option<CancellationToken>>,
    source_sub: RefCell<Option<Subscription>>,
    online_wait: RefCell<Option<Subscription>>,
    destroyed: Cell<bool>,
}

/// Observable fetch-lifecycle controller for one remote value.
///
/// Cloning creates a new handle to the **same** controller.
///
/// See the [module docs](self) for the lifecycle and concurrency model.
pub struct FetchController<T, U> {
    inner: Rc<ControllerInner<T, U>>,
}

impl<T, U> Clone for FetchController<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static, U: 'static> FetchController<T, U> {
    /// Build a controller against `client`'s gates.
    ///
    /// Seeded data or error is applied before the first transition, exactly
    /// like [`set_initial`](Self::set_initial). When constructed enabled,
    /// the controller subscribes to the source immediately, which triggers
    /// the first fetch attempt.
    ///
    /// # Panics
    ///
    /// Panics if the options seed both initial data and an initial error —
    /// they are mutually exclusive at construction.
    pub fn new(client: &Client, options: FetchOptions<T, U>) -> Self {
        assert!(
            !(options.seed_data.is_some() && options.seed_error.is_some()),
            "initial data and initial error are mutually exclusive at construction"
        );

        let FetchOptions {
            source,
            fetcher,
            detector,
            enabled,
            seed_data,
            seed_error,
        } = options;

        let mut initial = RequestState::idle(enabled);
        if seed_data.is_some() || seed_error.is_some() {
            apply_seed(
                &mut initial,
                Initial {
                    data: seed_data,
                    error: seed_error,
                },
            );
        }

        let inner = Rc::new(ControllerInner {
            state: Observable::new(initial),
            source,
            online: client.online.clone(),
            fetcher: RefCell::new(Some(fetcher)),
            detector: RefCell::new(detector),
            generation: Cell::new(0),
            current_token: RefCell::new(None),
            source_sub: RefCell::new(None),
            online_wait: RefCell::new(None),
            destroyed: Cell::new(false),
        });

        if enabled {
            attach_source(&inner);
        }

        Self { inner }
    }

    /// Cancel the current attempt (if any) and fetch again.
    ///
    /// The synchronous prelude — enabled gating, compare short-circuit,
    /// state transition, and attempt start — runs before this returns; the
    /// returned future resolves once the attempt's outcome has been applied
    /// (immediately for the disabled, short-circuited, and paused cases).
    ///
    /// A fetch failure is never returned here; it is only observable through
    /// the state cell.
    pub fn fetch(&self) -> impl Future<Output = ()> + 'static {
        let handle = request_fetch(&self.inner);
        async move {
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
    }

    /// Enable or disable fetching. Idempotent.
    ///
    /// Enabling subscribes the controller to source changes and immediately
    /// triggers one fetch attempt. Disabling unsubscribes from the source
    /// and any pending online wait but deliberately leaves an in-flight
    /// attempt running; cancellation happens only on supersession or
    /// [`destroy`](Self::destroy).
    pub fn enable(&self, value: bool) {
        let inner = &self.inner;
        if inner.destroyed.get() {
            warn!("enable called on a destroyed fetch controller");
            return;
        }
        if inner.state.with(|s| s.enabled) == value {
            return;
        }

        update_state(&inner.state, |s| s.enabled = value);

        if value {
            attach_source(inner);
        } else {
            debug!("fetch controller disabled");
            inner.source_sub.borrow_mut().take();
            inner.online_wait.borrow_mut().take();
        }
    }

    /// Seed data and/or an error without running the fetcher.
    ///
    /// Stamps `last_fetch_time`. Data forces `status = Success`; an error
    /// forces `status = Error` and wins when both are given (the data stays
    /// populated underneath). The compare baseline is untouched, so the next
    /// source-driven fetch still fires.
    pub fn set_initial(&self, initial: Initial<T>) {
        update_state(&self.inner.state, |s| apply_seed(s, initial));
    }

    /// Tear the controller down: cancel the current attempt, drop all
    /// subscriptions, and release the fetcher. No new attempt can be
    /// created afterward.
    ///
    /// # Panics
    ///
    /// Panics when called twice; destruction is not idempotent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        assert!(
            !inner.destroyed.get(),
            "fetch controller destroyed twice"
        );
        inner.destroyed.set(true);
        // Supersede whatever is in flight so late resolutions are discarded.
        inner.generation.set(inner.generation.get() + 1);
        if let Some(token) = inner.current_token.borrow_mut().take() {
            token.cancel();
        }
        inner.source_sub.borrow_mut().take();
        inner.online_wait.borrow_mut().take();
        inner.fetcher.borrow_mut().take();
        debug!("fetch controller destroyed");
    }

    /// Snapshot of the current request state.
    #[must_use]
    pub fn get(&self) -> RequestState<T> {
        self.inner.state.get()
    }

    /// Subscribe to state transitions, with immediate replay.
    pub fn subscribe(&self, callback: impl Fn(&RequestState<T>) + 'static) -> Subscription {
        self.inner.state.subscribe(callback)
    }

    /// Read-only handle onto the state cell.
    ///
    /// The controller stays the single writer; consumers can only read and
    /// subscribe.
    #[must_use]
    pub fn state(&self) -> Readable<RequestState<T>> {
        self.inner.state.read_only()
    }
}

impl<T: std::fmt::Debug, U> std::fmt::Debug for FetchController<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchController")
            .field("state", &self.inner.state)
            .field("generation", &self.inner.generation.get())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

/// Subscribe to the source; the immediate replay triggers the first fetch.
fn attach_source<T: Clone + 'static, U: 'static>(inner: &Rc<ControllerInner<T, U>>) {
    let weak = Rc::downgrade(inner);
    let sub = inner.source.subscribe(Box::new(move |_value| {
        if let Some(strong) = weak.upgrade() {
            let _ = request_fetch(&strong);
        }
    }));
    *inner.source_sub.borrow_mut() = Some(sub);
}

/// Gate a fetch request: enabled check, then compare short-circuit, then the
/// attempt itself.
fn request_fetch<T: Clone + 'static, U: 'static>(
    inner: &Rc<ControllerInner<T, U>>,
) -> Option<JoinHandle<()>> {
    if inner.destroyed.get() {
        return None;
    }
    if !inner.state.with(|s| s.enabled) {
        return None;
    }
    if let Some(detector) = inner.detector.borrow_mut().as_mut() {
        let value = inner.source.get();
        if !detector.changed(&value) {
            trace!("source key unchanged, skipping fetch");
            return None;
        }
    }
    start_attempt(inner)
}

/// Start (or pause) one fetch attempt. See the module docs for the exact
/// transition rules.
fn start_attempt<T: Clone + 'static, U: 'static>(
    inner: &Rc<ControllerInner<T, U>>,
) -> Option<JoinHandle<()>> {
    let now = SystemTime::now();

    if !inner.online.get() {
        debug!("offline, pausing fetch attempt");
        // Entering Paused supersedes any in-flight attempt: while paused no
        // attempt exists and no token is active.
        inner.generation.set(inner.generation.get() + 1);
        if let Some(token) = inner.current_token.borrow_mut().take() {
            token.cancel();
        }
        update_state(&inner.state, |s| {
            s.pending = true;
            s.fetch_status = FetchStatus::Paused;
            s.last_fetch_time = Some(now);
            if s.status != Status::Success {
                s.status = Status::Pending;
            }
        });

        // One-shot wait: resume the attempt when the gate opens.
        let weak = Rc::downgrade(inner);
        let wait = inner.online.subscribe(move |&online| {
            if !online {
                return;
            }
            let Some(strong) = weak.upgrade() else {
                return;
            };
            trace!("online gate opened, resuming paused fetch");
            let _wait = strong.online_wait.borrow_mut().take();
            let _ = start_attempt(&strong);
        });
        *inner.online_wait.borrow_mut() = Some(wait);
        return None;
    }

    // Supersede the current attempt, if any.
    if let Some(previous) = inner.current_token.borrow_mut().take() {
        trace!("cancelling superseded attempt");
        previous.cancel();
    }
    let generation = inner.generation.get() + 1;
    inner.generation.set(generation);
    let token = CancellationToken::new();
    *inner.current_token.borrow_mut() = Some(token.clone());

    update_state(&inner.state, |s| {
        s.pending = true;
        s.fetch_status = FetchStatus::Fetching;
        s.last_fetch_time = Some(now);
        // A prior settled outcome stays visible as stale display state.
        if s.status == Status::Idle {
            s.status = Status::Pending;
        }
    });
    debug!(generation, "fetch attempt started");

    let future = {
        let fetcher = inner.fetcher.borrow();
        let fetcher = fetcher.as_ref()?;
        fetcher(inner.source.get(), token)
    };

    let weak = Rc::downgrade(inner);
    Some(tokio::task::spawn_local(async move {
        let outcome = future.await;
        if let Some(inner) = weak.upgrade() {
            apply_outcome(&inner, generation, outcome);
        }
    }))
}

/// Apply an attempt outcome, unless the attempt was superseded in the
/// meantime.
fn apply_outcome<T: Clone + 'static, U>(
    inner: &ControllerInner<T, U>,
    generation: u64,
    outcome: Result<T, FetchError>,
) {
    if inner.generation.get() != generation {
        trace!(generation, "discarding outcome of superseded attempt");
        return;
    }
    inner.current_token.borrow_mut().take();

    match outcome {
        Ok(data) => {
            debug!(generation, "fetch succeeded");
            update_state(&inner.state, |s| {
                s.data = Some(data);
                s.error = None;
                s.status = Status::Success;
                s.fetch_status = FetchStatus::Idle;
                s.pending = false;
            });
        }
        Err(error) => {
            debug!(generation, %error, "fetch failed");
            update_state(&inner.state, |s| {
                s.error = Some(error);
                s.status = Status::Error;
                s.fetch_status = FetchStatus::Idle;
                s.pending = false;
            });
        }
    }
}

fn apply_seed<T>(state: &mut RequestState<T>, initial: Initial<T>) {
    state.last_fetch_time = Some(SystemTime::now());
    if let Some(data) = initial.data {
        state.data = Some(data);
        state.status = Status::Success;
    }
    // When both are seeded, the error wins as the authoritative status; the
    // data stays populated underneath.
    if let Some(error) = initial.error {
        state.error = Some(error);
        state.status = Status::Error;
    }
}

fn update_state<T: Clone + 'static>(
    state: &Observable<RequestState<T>>,
    mutate: impl FnOnce(&mut RequestState<T>),
) {
    let mut next = state.get();
    mutate(&mut next);
    state.set(next);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
