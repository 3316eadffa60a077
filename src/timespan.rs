//! TimeSpan represents an arc of time within the pattern system.
//!
//! A TimeSpan is the half-open interval `[begin, end)` between two exact
//! cycle positions. A zero-width span is valid and stands for an instant.

use crate::fraction::Fraction;

/// A span of time with a begin and end point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub begin: Fraction,
    pub end: Fraction,
}

impl TimeSpan {
    /// Create a new TimeSpan.
    pub fn new(begin: Fraction, end: Fraction) -> Self {
        TimeSpan { begin, end }
    }

    /// Create a TimeSpan from integer begin and end.
    pub fn from_integers(begin: i64, end: i64) -> Self {
        TimeSpan {
            begin: Fraction::from_integer(begin),
            end: Fraction::from_integer(end),
        }
    }

    /// The span of cycle `n`, `[n, n + 1)`.
    pub fn cycle(n: i64) -> Self {
        TimeSpan::from_integers(n, n + 1)
    }

    pub fn duration(&self) -> Fraction {
        &self.end - &self.begin
    }

    pub fn midpoint(&self) -> Fraction {
        &self.begin + self.duration() / Fraction::from_integer(2)
    }

    pub fn is_zero_width(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `t` falls inside the span. A zero-width span contains only its
    /// own point.
    pub fn contains(&self, t: &Fraction) -> bool {
        if self.is_zero_width() {
            return *t == self.begin;
        }
        *t >= self.begin && *t < self.end
    }

    /// Whether `other` lies wholly inside this span.
    pub fn contains_span(&self, other: &TimeSpan) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    /// Split this timespan at every integer cycle boundary it crosses.
    ///
    /// A zero-width span comes back unchanged as the only element, so instant
    /// queries survive per-cycle processing.
    pub fn span_cycles(&self) -> Vec<TimeSpan> {
        if self.begin == self.end {
            return vec![self.clone()];
        }

        let mut spans = Vec::new();
        let mut begin = self.begin.clone();
        let end_sam = self.end.sam();

        while self.end > begin {
            if begin.sam() == end_sam {
                spans.push(TimeSpan::new(begin, self.end.clone()));
                break;
            }
            let next_begin = begin.next_sam();
            spans.push(TimeSpan::new(begin, next_begin.clone()));
            begin = next_begin;
        }
        spans
    }

    /// Shifts this timespan to one of equal duration that starts within cycle zero.
    pub fn cycle_arc(&self) -> TimeSpan {
        let b = self.begin.cycle_pos();
        let e = &b + self.duration();
        TimeSpan::new(b, e)
    }

    /// Apply a function to both the begin and end time.
    pub fn with_time<F>(&self, f: F) -> TimeSpan
    where
        F: Fn(&Fraction) -> Fraction,
    {
        TimeSpan::new(f(&self.begin), f(&self.end))
    }

    /// Apply a function to just the end time.
    pub fn with_end<F>(&self, f: F) -> TimeSpan
    where
        F: Fn(&Fraction) -> Fraction,
    {
        TimeSpan::new(self.begin.clone(), f(&self.end))
    }

    /// Apply a function relative to the cycle (i.e., relative to the sam of the start).
    pub fn with_cycle<F>(&self, f: F) -> TimeSpan
    where
        F: Fn(&Fraction) -> Fraction,
    {
        let sam = self.begin.sam();
        let b = &sam + f(&(&self.begin - &sam));
        let e = &sam + f(&(&self.end - &sam));
        TimeSpan::new(b, e)
    }

    /// Compute the intersection of two timespans, returns None if they don't intersect.
    ///
    /// A point sitting on the end of a non-zero span is outside it, matching
    /// the half-open convention.
    pub fn intersection(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let begin = (&self.begin).max(&other.begin).clone();
        let end = (&self.end).min(&other.end).clone();

        if begin > end {
            return None;
        }

        if begin == end {
            if begin == self.end && self.begin < self.end {
                return None;
            }
            if begin == other.end && other.begin < other.end {
                return None;
            }
        }

        Some(TimeSpan::new(begin, end))
    }

    pub fn show(&self) -> String {
        format!("{} -> {}", self.begin, self.end)
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_cycles_single() {
        let span = TimeSpan::from_integers(0, 1);
        let cycles = span.span_cycles();
        assert_eq!(cycles, vec![span]);
    }

    #[test]
    fn test_span_cycles_multiple() {
        let cycles = TimeSpan::from_integers(0, 2).span_cycles();
        assert_eq!(cycles, vec![TimeSpan::cycle(0), TimeSpan::cycle(1)]);
    }

    #[test]
    fn test_span_cycles_partial() {
        let span = TimeSpan::new(Fraction::new(1, 2), Fraction::new(3, 2));
        let cycles = span.span_cycles();
        assert_eq!(
            cycles,
            vec![
                TimeSpan::new(Fraction::new(1, 2), Fraction::one()),
                TimeSpan::new(Fraction::one(), Fraction::new(3, 2)),
            ]
        );
    }

    #[test]
    fn test_span_cycles_zero_width() {
        let point = TimeSpan::new(Fraction::one(), Fraction::one());
        assert_eq!(point.span_cycles(), vec![point.clone()]);
    }

    #[test]
    fn test_span_cycles_negative() {
        let span = TimeSpan::new(Fraction::new(-1, 2), Fraction::new(1, 2));
        assert_eq!(
            span.span_cycles(),
            vec![
                TimeSpan::new(Fraction::new(-1, 2), Fraction::zero()),
                TimeSpan::new(Fraction::zero(), Fraction::new(1, 2)),
            ]
        );
    }

    #[test]
    fn test_intersection() {
        let a = TimeSpan::from_integers(0, 1);
        let b = TimeSpan::new(Fraction::new(1, 2), Fraction::new(3, 2));
        assert_eq!(
            a.intersection(&b),
            Some(TimeSpan::new(Fraction::new(1, 2), Fraction::one()))
        );
    }

    #[test]
    fn test_no_intersection() {
        let a = TimeSpan::new(Fraction::zero(), Fraction::new(1, 2));
        let b = TimeSpan::new(Fraction::new(3, 4), Fraction::one());
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn test_point_intersection() {
        let cycle = TimeSpan::cycle(0);
        let start = TimeSpan::new(Fraction::zero(), Fraction::zero());
        let end = TimeSpan::new(Fraction::one(), Fraction::one());
        assert_eq!(cycle.intersection(&start), Some(start.clone()));
        assert_eq!(cycle.intersection(&end), None);
    }

    #[test]
    fn test_contains() {
        let span = TimeSpan::new(Fraction::new(1, 4), Fraction::new(3, 4));
        assert!(span.contains(&Fraction::new(1, 4)));
        assert!(!span.contains(&Fraction::new(3, 4)));
        assert!(span.contains_span(&TimeSpan::new(Fraction::new(1, 2), Fraction::new(3, 4))));
        assert!(!span.contains_span(&TimeSpan::cycle(0)));
    }

    #[test]
    fn test_duration_and_cycle_arc() {
        let span = TimeSpan::new(Fraction::new(9, 4), Fraction::new(11, 4));
        assert_eq!(span.duration(), Fraction::new(1, 2));
        assert_eq!(
            span.cycle_arc(),
            TimeSpan::new(Fraction::new(1, 4), Fraction::new(3, 4))
        );
    }
}
