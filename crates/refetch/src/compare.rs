#![forbid(unsafe_code)]

//! Source-change deduplication.
//!
//! A controller configured with a compare function extracts a comparison key
//! from the source value before each fetch. If the key equals the previously
//! stored one, the fetch is skipped entirely; otherwise the key becomes the
//! new baseline and the fetch proceeds. Element-wise dependency-array
//! comparison falls out of `Vec<K>: PartialEq`.

/// Decides whether a source value warrants a new fetch.
pub(crate) trait ChangeDetector<U> {
    /// Returns true when `value` differs from the previous baseline and
    /// records it as the new baseline.
    fn changed(&mut self, value: &U) -> bool;
}

/// Detector comparing keys extracted by a user-supplied function.
///
/// The first observed value always reads as changed (there is no baseline
/// yet).
pub(crate) struct KeyedDetector<U, K> {
    extract: Box<dyn Fn(&U) -> K>,
    baseline: Option<K>,
}

impl<U, K> KeyedDetector<U, K> {
    pub(crate) fn new(extract: impl Fn(&U) -> K + 'static) -> Self {
        Self {
            extract: Box::new(extract),
            baseline: None,
        }
    }
}

impl<U, K: PartialEq> ChangeDetector<U> for KeyedDetector<U, K> {
    fn changed(&mut self, value: &U) -> bool {
        let key = (self.extract)(value);
        let same = self.baseline.as_ref() == Some(&key);
        self.baseline = Some(key);
        !same
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
