#![forbid(unsafe_code)]

//! Reactive remote-value containers.
//!
//! Given an asynchronous producer (a *fetcher*) and a reactive *source*
//! parameter, [`FetchController`] exposes a small observable state machine —
//! [`Status`] (idle/pending/error/success) plus an independent
//! [`FetchStatus`] activity flag (idle/fetching/paused) — that downstream
//! observers can bind to without managing futures, races, or cancellation
//! themselves.
//!
//! # Architecture
//!
//! - [`FetchController`]: the fetch lifecycle — enabled gating, online
//!   gating, source-change deduplication, supersession of stale in-flight
//!   attempts, and race-free application of outcomes into one observable
//!   [`RequestState`] cell.
//! - [`Gate`] / [`Client`]: boolean environment signals (online,
//!   focus) the controller consults to pause and resume fetching.
//! - [`Observable`] (re-exported from `refetch-reactive`): the
//!   single-threaded reactive cell everything is built on.
//!
//! # Example
//!
//! ```no_run
//! use refetch::{Client, FetchController, FetchOptions, Observable};
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .build()
//!     .unwrap();
//! let local = tokio::task::LocalSet::new();
//! runtime.block_on(local.run_until(async {
//!     let client = Client::new();
//!     let user_id = Observable::new(1u32);
//!
//!     let user = FetchController::new(
//!         &client,
//!         FetchOptions::new(user_id.clone(), |id: u32, _token| async move {
//!             Ok(format!("user-{id}"))
//!         })
//!         .enabled(true),
//!     );
//!
//!     user.fetch().await;
//!     assert_eq!(user.get().data().unwrap(), "user-1");
//!
//!     // Any source change re-triggers the fetch and supersedes the old
//!     // attempt.
//!     user_id.set(2);
//! }));
//! ```
//!
//! # Concurrency model
//!
//! Single-threaded cooperative scheduling: all types are `!Send`, attempt
//! futures run via `tokio::task::spawn_local`, and an enabled controller
//! must live inside a `tokio::task::LocalSet` on a current-thread runtime.
//! There are no locks — only interleaving of asynchronous continuations,
//! with a generation check guarding every state mutation.

pub mod client;
mod compare;
pub mod controller;
pub mod error;
pub mod gate;
pub mod state;

pub use client::Client;
pub use controller::{FetchController, FetchOptions, Initial, SourceCell};
pub use error::{FetchError, NeverFetched};
pub use gate::{EnvironmentProbe, Gate, GateListener};
pub use state::{FetchStatus, RequestState, Status};

pub use refetch_reactive::{Observable, Readable, Subscription};
