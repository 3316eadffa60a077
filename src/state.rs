//! State represents the query state passed to patterns.
//!
//! When querying a pattern, we pass a State containing the timespan
//! we're interested in, along with the seed that every random draw folds in.
//! Two queries with the same span and seed always return the same haps.

use crate::timespan::TimeSpan;

/// The query state passed to patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// The timespan being queried.
    pub span: TimeSpan,
    /// Seed mixed into every randomized combinator's hash.
    pub seed: u64,
}

impl State {
    pub fn new(span: TimeSpan) -> Self {
        State { span, seed: 0 }
    }

    pub fn with_seed(span: TimeSpan, seed: u64) -> Self {
        State { span, seed }
    }

    /// Returns a new State with a different span and the same seed.
    pub fn set_span(&self, span: TimeSpan) -> Self {
        State {
            span,
            seed: self.seed,
        }
    }

    /// Apply a function to the span.
    pub fn with_span<F>(&self, f: F) -> Self
    where
        F: FnOnce(&TimeSpan) -> TimeSpan,
    {
        self.set_span(f(&self.span))
    }
}

impl From<TimeSpan> for State {
    fn from(span: TimeSpan) -> Self {
        State::new(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::Fraction;

    #[test]
    fn test_state_creation() {
        let span = TimeSpan::from_integers(0, 1);
        let state = State::new(span.clone());
        assert_eq!(state.span, span);
        assert_eq!(state.seed, 0);
    }

    #[test]
    fn test_set_span_keeps_seed() {
        let state = State::with_seed(TimeSpan::from_integers(0, 1), 7);
        let moved = state.with_span(|s| s.with_time(|t| t * Fraction::from_integer(2)));
        assert_eq!(moved.seed, 7);
        assert_eq!(moved.span, TimeSpan::from_integers(0, 2));
    }
}
