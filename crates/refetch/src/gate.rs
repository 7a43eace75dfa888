#![forbid(unsafe_code)]

//! Environment gates: boolean reactive signals for connectivity and focus.
//!
//! A [`Gate`] is a boolean [`Observable`] optionally backed by an
//! [`EnvironmentProbe`] that knows how to watch the real environment
//! (connectivity events, window visibility, ...). [`Gate::listen`] wires the
//! probe to the cell and returns an RAII guard that unwires it on drop.
//!
//! The fixed variant ([`Gate::fixed`]) has no probe and an inert `listen`;
//! it stands in for the environment in tests and headless embeddings, while
//! remaining settable so tests can flip connectivity at will.

use std::fmt;
use std::rc::Rc;

use refetch_reactive::{Observable, Subscription};

/// Adapter from an external event source to a boolean signal.
///
/// Implementations publish the current value on demand and push every
/// subsequent change into the sink handed to [`watch`](Self::watch).
pub trait EnvironmentProbe {
    /// The current value of the environment condition.
    fn current(&self) -> bool;

    /// Start watching; push every change into `publish`. Returns a stop
    /// function that detaches the watcher.
    fn watch(&self, publish: Box<dyn Fn(bool)>) -> Box<dyn FnOnce()>;
}

/// A boolean reactive signal, optionally wired to an environment probe.
#[derive(Clone)]
pub struct Gate {
    cell: Observable<bool>,
    probe: Option<Rc<dyn EnvironmentProbe>>,
}

impl Gate {
    /// Gate backed by `probe`; the initial value is `probe.current()`.
    ///
    /// The probe is not watched until [`listen`](Self::listen) is called.
    pub fn new(probe: impl EnvironmentProbe + 'static) -> Self {
        let cell = Observable::new(probe.current());
        Self {
            cell,
            probe: Some(Rc::new(probe)),
        }
    }

    /// Probe-less gate with a fixed initial value and an inert `listen`.
    #[must_use]
    pub fn fixed(initial: bool) -> Self {
        Self {
            cell: Observable::new(initial),
            probe: None,
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> bool {
        self.cell.get()
    }

    /// Set the value directly. Equal values do not re-notify.
    pub fn set(&self, value: bool) {
        self.cell.set_neq(value);
    }

    /// Subscribe with immediate replay of the current value.
    pub fn subscribe(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    /// Wire the probe (if any) to the cell.
    ///
    /// Every value the probe pushes lands in the cell; equal values are
    /// dropped. The returned guard detaches the watcher on drop. A gate
    /// without a probe returns an inert guard.
    pub fn listen(&self) -> GateListener {
        let Some(probe) = &self.probe else {
            return GateListener { stop: None };
        };
        let cell = self.cell.clone();
        let stop = probe.watch(Box::new(move |value| cell.set_neq(value)));
        GateListener { stop: Some(stop) }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("value", &self.get())
            .field("probed", &self.probe.is_some())
            .finish()
    }
}

/// RAII guard for an active [`Gate::listen`] wiring.
pub struct GateListener {
    stop: Option<Box<dyn FnOnce()>>,
}

impl Drop for GateListener {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl fmt::Debug for GateListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateListener")
            .field("active", &self.stop.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
