#![forbid(unsafe_code)]

//! End-to-end fetch-lifecycle tests.
//!
//! These tests drive a [`FetchController`] through the full state machine
//! under a paused tokio clock:
//!
//! 1. Disabled controllers never fetch; explicit `fetch()` is a no-op.
//! 2. Enabling fetches immediately; source changes refetch while enabled.
//! 3. The most recently started attempt always wins; superseded outcomes
//!    are discarded and their cancellation tokens observed.
//! 4. Compare keys short-circuit redundant fetches.
//! 5. Offline pauses an attempt until the online gate opens.
//! 6. Seeds (`set_initial`) apply without running the fetcher and never
//!    suppress the next legitimate fetch.
//! 7. Error state never leaks into a later success.
//! 8. Disabling leaves an in-flight attempt running; destroy cancels it.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use refetch::{
    Client, FetchController, FetchError, FetchOptions, FetchStatus, Gate, Initial, Observable,
    Status,
};
use tokio::task::LocalSet;
use tokio::time::sleep;

/// Let spawned attempt tasks run to completion (virtual time).
async fn tick() {
    sleep(Duration::from_millis(1)).await;
}

#[derive(Clone, Debug, PartialEq)]
struct Person {
    name: String,
}

impl Person {
    fn named(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[tokio::test(start_paused = true)]
async fn disabled_controller_never_fetches() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    calls_probe.set(calls_probe.get() + 1);
                    async move { Ok(Person::named("John")) }
                }),
            );

            let state = controller.get();
            assert!(!state.enabled);
            assert_eq!(state.status, Status::Idle);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert!(!state.pending);

            // Explicit fetch on a disabled controller is a resolved no-op.
            controller.fetch().await;

            let state = controller.get();
            assert_eq!(state.status, Status::Idle);
            assert_eq!(calls.get(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn enabled_at_construction_fetches_immediately() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    Ok(Person::named("John"))
                })
                .enabled(true),
            );

            // The synchronous prelude already transitioned the state.
            let state = controller.get();
            assert!(state.enabled);
            assert!(state.pending);
            assert_eq!(state.status, Status::Pending);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);

            tick().await;

            let state = controller.get();
            assert!(!state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.data(), Ok(&Person::named("John")));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_lands_in_error_state() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    Err::<Person, _>(FetchError::msg("error fetching data"))
                })
                .enabled(true),
            );

            assert_eq!(controller.get().status, Status::Pending);

            tick().await;

            let state = controller.get();
            assert!(!state.pending);
            assert_eq!(state.status, Status::Error);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.error.as_ref().unwrap().to_string(), "error fetching data");
            // Never fetched successfully: data stays loudly absent.
            assert!(state.data().is_err());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn retry_after_failure_shows_stale_error_then_clears_it() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    let attempt = calls_probe.get();
                    calls_probe.set(attempt + 1);
                    async move {
                        if attempt == 0 {
                            Err(FetchError::msg("error fetching data"))
                        } else {
                            Ok(Person::named("John"))
                        }
                    }
                })
                .enabled(true),
            );

            tick().await;
            assert_eq!(controller.get().status, Status::Error);

            let refetch = controller.fetch();

            // The stale error stays visible while the retry runs.
            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Error);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);
            assert!(state.error.is_some());

            refetch.await;

            let state = controller.get();
            assert!(!state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert!(state.error.is_none());
            assert_eq!(state.data(), Ok(&Person::named("John")));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn last_started_attempt_wins() {
    LocalSet::new()
        .run_until(async {
            let delay = Observable::new(300u64);
            let cancelled_observed = Rc::new(Cell::new(false));

            let delay_probe = delay.clone();
            let flag = Rc::clone(&cancelled_observed);
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, token| {
                    let waited = delay_probe.get();
                    let flag = Rc::clone(&flag);
                    async move {
                        sleep(Duration::from_millis(waited)).await;
                        if token.is_cancelled() {
                            flag.set(true);
                        }
                        Ok(waited)
                    }
                })
                .enabled(true),
            );

            // Supersede the construction-time attempt with a slow one, then
            // the slow one with a fast one.
            let slow = controller.fetch();
            delay.set(100);
            let fast = controller.fetch();

            fast.await;
            assert!(!cancelled_observed.get());
            assert_eq!(controller.get().data(), Ok(&100));

            // The slow attempt resolves late, observes its cancelled token,
            // and its outcome is discarded.
            slow.await;
            assert!(cancelled_observed.get());

            let state = controller.get();
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert!(!state.pending);
            assert_eq!(state.data(), Ok(&100));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn source_change_does_not_fetch_while_disabled() {
    LocalSet::new()
        .run_until(async {
            let source = Observable::new(Person::named("John"));
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(source.clone(), |person: Person, _token| async move {
                    Ok(person)
                }),
            );

            source.set(Person::named("Doe"));

            let state = controller.get();
            assert_eq!(state.status, Status::Idle);
            assert_eq!(state.fetch_status, FetchStatus::Idle);

            controller.enable(true);

            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Pending);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);

            tick().await;

            assert_eq!(controller.get().data(), Ok(&Person::named("Doe")));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn source_change_refetches_while_enabled() {
    LocalSet::new()
        .run_until(async {
            let source = Observable::new(Person::named("John"));
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(source.clone(), |person: Person, _token| async move {
                    Ok(person)
                }),
            );

            controller.enable(true);
            tick().await;
            assert_eq!(controller.get().data(), Ok(&Person::named("John")));

            source.set(Person::named("Doe"));

            // Stale success stays visible while the refetch runs.
            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);
            assert!(state.error.is_none());
            assert_eq!(state.data(), Ok(&Person::named("John")));

            tick().await;

            let state = controller.get();
            assert!(!state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.data(), Ok(&Person::named("Doe")));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn last_fetch_time_is_stamped() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    Ok(1u32)
                })
                .enabled(true),
            );

            // Stamped when the attempt is initiated, not when it settles.
            assert!(controller.get().last_fetch_time.is_some());

            tick().await;
            assert!(controller.get().last_fetch_time.is_some());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn initial_data_seeds_success_without_fetching() {
    LocalSet::new()
        .run_until(async {
            let counter = Rc::new(Cell::new(1u32));
            let counter_probe = Rc::clone(&counter);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    let next = counter_probe.get() + 1;
                    counter_probe.set(next);
                    async move { Ok(next) }
                }),
            );

            controller.set_initial(Initial::data(1));

            let state = controller.get();
            assert!(!state.enabled);
            assert!(!state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.data(), Ok(&1));
            assert!(state.last_fetch_time.is_some());
            assert_eq!(counter.get(), 1); // Fetcher never ran.
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn seeded_controller_still_fetches_on_enable() {
    LocalSet::new()
        .run_until(async {
            let counter = Rc::new(Cell::new(1u32));
            let counter_probe = Rc::clone(&counter);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    let next = counter_probe.get() + 1;
                    counter_probe.set(next);
                    async move { Ok(next) }
                }),
            );

            controller.set_initial(Initial::data(1));
            controller.enable(true);

            // The seeded success stays visible while the first real fetch
            // runs.
            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);
            assert_eq!(state.data(), Ok(&1));

            tick().await;

            let state = controller.get();
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.data(), Ok(&2));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn seed_does_not_suppress_the_next_source_fetch() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);
            let source = Observable::new(1u32);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(source.clone(), move |id: u32, _token| {
                    calls_probe.set(calls_probe.get() + 1);
                    async move { Ok(id * 10) }
                }),
            );

            controller.set_initial(Initial::data(5));
            controller.enable(true);
            source.set(2);

            tick().await;

            assert_eq!(calls.get(), 2);
            assert_eq!(controller.get().data(), Ok(&20));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn initial_error_seeds_error_state() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    Ok(1u32)
                }),
            );

            controller.set_initial(Initial::error(FetchError::msg("some error")));

            let state = controller.get();
            assert!(!state.pending);
            assert_eq!(state.status, Status::Error);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.error.as_ref().unwrap().to_string(), "some error");
            assert!(state.data().is_err());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn initial_data_and_error_shows_both_with_error_authoritative() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    Ok(1u32)
                }),
            );

            controller.set_initial(Initial {
                data: Some(1),
                error: Some(FetchError::msg("some error")),
            });

            let state = controller.get();
            assert_eq!(state.status, Status::Error);
            assert_eq!(state.error.as_ref().unwrap().to_string(), "some error");
            // The data stays populated underneath.
            assert_eq!(state.data(), Ok(&1));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn compare_key_short_circuits_redundant_fetches() {
    LocalSet::new()
        .run_until(async {
            let source = Observable::new(Person::named("John"));
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(source.clone(), |person: Person, _token| async move {
                    Ok(person)
                })
                .compare(|person: &Person| vec![person.name.clone()]),
            );

            controller.enable(true);
            tick().await;
            assert_eq!(controller.get().data(), Ok(&Person::named("John")));

            let settled_version = controller.state().version();

            // Equal key: no state write at all.
            source.set(Person::named("John"));
            assert_eq!(controller.state().version(), settled_version);
            assert_eq!(controller.get().fetch_status, FetchStatus::Idle);

            // Different key: exactly one new fetch.
            source.set(Person::named("Doe"));
            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);
            assert_eq!(state.data(), Ok(&Person::named("John")));

            tick().await;
            assert_eq!(controller.get().data(), Ok(&Person::named("Doe")));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn offline_pauses_until_the_gate_opens() {
    LocalSet::new()
        .run_until(async {
            let client = Client {
                online: Gate::fixed(false),
                ..Client::new()
            };
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);

            let controller = FetchController::new(
                &client,
                FetchOptions::new(Observable::new(Person::named("John")), move |p: Person, _token| {
                    calls_probe.set(calls_probe.get() + 1);
                    async move { Ok(p) }
                }),
            );

            controller.enable(true);

            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Pending);
            assert_eq!(state.fetch_status, FetchStatus::Paused);
            assert!(state.data().is_err());
            assert!(state.last_fetch_time.is_some());
            assert_eq!(calls.get(), 0);

            client.online.set(true);

            // Resumes synchronously.
            let state = controller.get();
            assert!(state.pending);
            assert_eq!(state.status, Status::Pending);
            assert_eq!(state.fetch_status, FetchStatus::Fetching);

            tick().await;

            let state = controller.get();
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.data(), Ok(&Person::named("John")));

            // The wait was one-shot: later gate flips do not refetch.
            client.online.set(false);
            client.online.set(true);
            tick().await;
            assert_eq!(calls.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn error_state_does_not_leak_into_later_success() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    let attempt = calls_probe.get();
                    calls_probe.set(attempt + 1);
                    async move {
                        match attempt {
                            0 => Ok("first".to_string()),
                            1 => Err(FetchError::msg("transient")),
                            _ => Ok("second".to_string()),
                        }
                    }
                })
                .enabled(true),
            );

            tick().await;
            assert_eq!(controller.get().data().unwrap(), "first");

            controller.fetch().await;
            let state = controller.get();
            assert_eq!(state.status, Status::Error);
            assert_eq!(state.data().unwrap(), "first"); // Stale-while-error.

            controller.fetch().await;
            let state = controller.get();
            assert_eq!(state.status, Status::Success);
            assert!(state.error.is_none());
            assert_eq!(state.data().unwrap(), "second");
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn disabling_leaves_the_inflight_attempt_running() {
    LocalSet::new()
        .run_until(async {
            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), |_id: u32, _token| async move {
                    sleep(Duration::from_millis(50)).await;
                    Ok("done".to_string())
                })
                .enabled(true),
            );

            assert_eq!(controller.get().fetch_status, FetchStatus::Fetching);

            controller.enable(false);

            let state = controller.get();
            assert!(!state.enabled);
            // The in-flight attempt keeps running; disable is not a cancel.
            assert_eq!(state.fetch_status, FetchStatus::Fetching);
            assert!(state.pending);

            sleep(Duration::from_millis(100)).await;

            let state = controller.get();
            assert!(!state.enabled);
            assert_eq!(state.status, Status::Success);
            assert_eq!(state.fetch_status, FetchStatus::Idle);
            assert_eq!(state.data().unwrap(), "done");
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn destroy_cancels_the_current_attempt() {
    LocalSet::new()
        .run_until(async {
            let cancelled_observed = Rc::new(Cell::new(false));
            let flag = Rc::clone(&cancelled_observed);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, token| {
                    let flag = Rc::clone(&flag);
                    async move {
                        sleep(Duration::from_millis(100)).await;
                        if token.is_cancelled() {
                            flag.set(true);
                        }
                        Ok(1u32)
                    }
                })
                .enabled(true),
            );

            controller.destroy();

            sleep(Duration::from_millis(200)).await;

            assert!(cancelled_observed.get());
            // The late outcome was discarded: no mutation after destroy.
            let state = controller.get();
            assert!(state.data().is_err());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn reenabling_triggers_a_fresh_fetch() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0u32));
            let calls_probe = Rc::clone(&calls);

            let controller = FetchController::new(
                &Client::new(),
                FetchOptions::new(Observable::new(1u32), move |_id: u32, _token| {
                    calls_probe.set(calls_probe.get() + 1);
                    async move { Ok(1u32) }
                }),
            );

            controller.enable(true);
            tick().await;
            assert_eq!(calls.get(), 1);

            controller.enable(false);
            controller.enable(true);
            assert_eq!(controller.get().fetch_status, FetchStatus::Fetching);

            tick().await;
            assert_eq!(calls.get(), 2);
            assert_eq!(controller.get().status, Status::Success);
        })
        .await;
}
