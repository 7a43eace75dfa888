#![forbid(unsafe_code)]

//! Client: the environment-gate bundle shared by fetch controllers.

use crate::gate::Gate;

/// Environment gates for a family of fetch controllers.
///
/// Controllers consult `online` before starting an attempt and pause until
/// it opens; `focus` is exposed for consumers (refetch-on-focus policies)
/// but not consulted by the controller itself.
///
/// The default client uses fixed, always-open gates. Embedders with a real
/// environment supply probed gates instead:
///
/// ```
/// use refetch::{Client, Gate};
///
/// let client = Client {
///     online: Gate::fixed(false),
///     ..Client::new()
/// };
/// assert!(!client.online.get());
/// assert!(client.focus.get());
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    /// Connectivity gate; fetches pause while closed.
    pub online: Gate,
    /// Focus/visibility gate; informational for consumers.
    pub focus: Gate,
}

impl Client {
    /// Client with always-open gates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            online: Gate::fixed(true),
            focus: Gate::fixed(true),
        }
    }

    /// Client with explicit gates.
    #[must_use]
    pub fn with_gates(online: Gate, focus: Gate) -> Self {
        Self { online, focus }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
