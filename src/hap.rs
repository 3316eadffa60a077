//! Hap represents an event in a pattern.
//!
//! A "Hap" (happening) is a value active during a timespan. It has a
//! "whole" timespan (the full logical extent of the event) and a "part"
//! timespan (the portion that overlaps the query). When `part` is smaller
//! than `whole` the hap is a fragment, and only the fragment whose part
//! starts with the whole carries the onset.

use crate::fraction::Fraction;
use crate::timespan::TimeSpan;

/// Context information attached to a Hap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Source text ranges that produced this event.
    pub locations: Vec<Location>,
}

/// A byte range in notation source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(start: usize, end: usize) -> Self {
        Location { start, end }
    }
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn at(location: Location) -> Self {
        Context {
            locations: vec![location],
        }
    }

    /// Combine this context with another, keeping each location once.
    pub fn combine(&self, other: &Context) -> Context {
        let mut locations = self.locations.clone();
        for loc in &other.locations {
            if !locations.contains(loc) {
                locations.push(*loc);
            }
        }
        Context { locations }
    }
}

/// A Hap represents a value active during a timespan.
///
/// - `whole`: The full timespan of the event. `None` for continuous
///   (signal-like) patterns.
/// - `part`: The portion of the event covered by the query. Always inside
///   `whole` when `whole` is present.
/// - `value`: The event's payload.
/// - `context`: Where the event came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Hap<T> {
    pub whole: Option<TimeSpan>,
    pub part: TimeSpan,
    pub value: T,
    pub context: Context,
}

impl<T> Hap<T> {
    pub fn new(whole: Option<TimeSpan>, part: TimeSpan, value: T) -> Self {
        Hap {
            whole,
            part,
            value,
            context: Context::new(),
        }
    }

    pub fn with_context(
        whole: Option<TimeSpan>,
        part: TimeSpan,
        value: T,
        context: Context,
    ) -> Self {
        Hap {
            whole,
            part,
            value,
            context,
        }
    }

    /// Returns true if this hap has an onset (the beginning of the part
    /// is the same as the beginning of the whole).
    pub fn has_onset(&self) -> bool {
        match &self.whole {
            Some(w) => w.begin == self.part.begin,
            None => false,
        }
    }

    /// Returns true if the event extends outside the queried part.
    pub fn is_fragment(&self) -> bool {
        match &self.whole {
            Some(w) => *w != self.part,
            None => false,
        }
    }

    /// Returns true for discrete events, false for continuous samples.
    pub fn is_discrete(&self) -> bool {
        self.whole.is_some()
    }

    /// Returns the whole if it exists, otherwise the part.
    pub fn whole_or_part(&self) -> &TimeSpan {
        self.whole.as_ref().unwrap_or(&self.part)
    }

    /// The time that identifies this event across fragments: the whole's
    /// begin, or the part's begin for continuous haps.
    pub fn whole_begin(&self) -> &Fraction {
        &self.whole_or_part().begin
    }

    /// Apply a function to the timespan(s) of this hap.
    pub fn with_span<F>(self, f: F) -> Self
    where
        F: Fn(&TimeSpan) -> TimeSpan,
    {
        Hap {
            whole: self.whole.as_ref().map(&f),
            part: f(&self.part),
            value: self.value,
            context: self.context,
        }
    }

    /// Apply a function to the value of this hap.
    pub fn with_value<U, F>(self, f: F) -> Hap<U>
    where
        F: FnOnce(T) -> U,
    {
        Hap {
            whole: self.whole,
            part: self.part,
            value: f(self.value),
            context: self.context,
        }
    }

    /// Map over the value of this hap (alias for with_value).
    pub fn fmap<U, F>(self, f: F) -> Hap<U>
    where
        F: FnOnce(T) -> U,
    {
        self.with_value(f)
    }

    pub fn set_context(self, context: Context) -> Self {
        Hap { context, ..self }
    }

    pub fn combine_context<U>(&self, other: &Hap<U>) -> Context {
        self.context.combine(&other.context)
    }

    /// Get the duration of this hap (based on whole if available).
    pub fn duration(&self) -> Fraction {
        self.whole_or_part().duration()
    }
}

impl<T: std::fmt::Display> Hap<T> {
    pub fn show(&self) -> String {
        let spans = match &self.whole {
            None => format!("~{}", self.part),
            Some(whole) if *whole == self.part => self.part.show(),
            Some(whole) => format!("({}) in {}", self.part.show(), whole.show()),
        };
        format!("[ {} | {} ]", spans, self.value)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Hap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.show())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_onset() {
        let whole = TimeSpan::from_integers(0, 1);
        let part = TimeSpan::new(Fraction::zero(), Fraction::new(1, 2));
        let hap: Hap<i32> = Hap::new(Some(whole.clone()), part, 42);
        assert!(hap.has_onset());
        assert!(hap.is_fragment());

        let part2 = TimeSpan::new(Fraction::new(1, 2), Fraction::one());
        let hap2: Hap<i32> = Hap::new(Some(whole), part2, 42);
        assert!(!hap2.has_onset());
        assert!(hap2.is_fragment());
    }

    #[test]
    fn test_continuous_has_no_onset() {
        let part = TimeSpan::new(Fraction::zero(), Fraction::new(1, 2));
        let hap: Hap<f64> = Hap::new(None, part.clone(), 0.5);
        assert!(!hap.has_onset());
        assert!(!hap.is_fragment());
        assert_eq!(hap.whole_or_part(), &part);
    }

    #[test]
    fn test_with_value() {
        let whole = TimeSpan::from_integers(0, 1);
        let hap: Hap<i32> = Hap::new(Some(whole.clone()), whole, 42);
        let mapped = hap.with_value(|v| v * 2);
        assert_eq!(mapped.value, 84);
    }

    #[test]
    fn test_duration() {
        let whole = TimeSpan::new(Fraction::zero(), Fraction::new(1, 2));
        let hap: Hap<i32> = Hap::new(Some(whole.clone()), whole, 42);
        assert_eq!(hap.duration(), Fraction::new(1, 2));
    }

    #[test]
    fn test_context_combine_dedups() {
        let a = Context::at(Location::new(0, 2));
        let b = Context {
            locations: vec![Location::new(0, 2), Location::new(3, 5)],
        };
        assert_eq!(a.combine(&b).locations.len(), 2);
    }

    #[test]
    fn test_show() {
        let whole = TimeSpan::from_integers(0, 1);
        let part = TimeSpan::new(Fraction::zero(), Fraction::new(1, 2));
        let hap = Hap::new(Some(whole), part, "bd");
        assert_eq!(hap.show(), "[ (0 -> 1/2) in 0 -> 1 | bd ]");
    }
}
