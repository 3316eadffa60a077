//! Pattern is the core abstraction for representing time-varying values.
//!
//! A `Pattern<T>` is a pure function from a `State` (query span plus seed)
//! to the `Vec<Hap<T>>` active during that span. Patterns are immutable and
//! cheap to clone: every combinator wraps the query closures of its inputs
//! behind an `Arc` and never mutates them.
//!
//! Two rules hold for every pattern in this module:
//! - every returned hap's `part` lies inside the queried span;
//! - the same query always returns the same haps.

use crate::fraction::Fraction;
use crate::hap::{Context, Hap, Location};
use crate::state::State;
use crate::timespan::TimeSpan;
use log::debug;
use num_traits::ToPrimitive;
use std::sync::Arc;

/// The query function type: takes a State and returns a list of Haps.
pub type QueryFn<T> = dyn Fn(&State) -> Vec<Hap<T>> + Send + Sync;

/// A Pattern represents a function from time to events.
pub struct Pattern<T> {
    query: Arc<QueryFn<T>>,
    /// Number of steps per cycle, used to line up polymeter layers.
    steps: Option<Fraction>,
}

impl<T> Clone for Pattern<T> {
    fn clone(&self) -> Self {
        Pattern {
            query: Arc::clone(&self.query),
            steps: self.steps.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Pattern<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Create a new pattern from a query function.
    pub fn new<F>(query: F) -> Self
    where
        F: Fn(&State) -> Vec<Hap<T>> + Send + Sync + 'static,
    {
        Pattern {
            query: Arc::new(query),
            steps: None,
        }
    }

    /// Create a new pattern with steps information.
    pub fn with_steps<F>(query: F, steps: Fraction) -> Self
    where
        F: Fn(&State) -> Vec<Hap<T>> + Send + Sync + 'static,
    {
        Pattern {
            query: Arc::new(query),
            steps: Some(steps),
        }
    }

    /// Query the pattern for events in the given state.
    pub fn query(&self, state: &State) -> Vec<Hap<T>> {
        (self.query)(state)
    }

    /// Query the pattern over a span with seed 0.
    pub fn query_span(&self, span: TimeSpan) -> Vec<Hap<T>> {
        self.query(&State::new(span))
    }

    /// Query the pattern for events in the given time arc.
    pub fn query_arc(&self, begin: impl Into<Fraction>, end: impl Into<Fraction>) -> Vec<Hap<T>> {
        self.query_span(TimeSpan::new(begin.into(), end.into()))
    }

    pub fn steps(&self) -> Option<&Fraction> {
        self.steps.as_ref()
    }

    /// True when both handles share one query function.
    pub fn ptr_eq(&self, other: &Pattern<T>) -> bool {
        Arc::ptr_eq(&self.query, &other.query)
    }

    pub fn set_steps(mut self, steps: Option<Fraction>) -> Self {
        self.steps = steps;
        self
    }

    // ============================================
    // Functor
    // ============================================

    /// Apply a function to the value of each hap.
    pub fn with_value<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| {
                query(state)
                    .into_iter()
                    .map(|hap| hap.with_value(&f))
                    .collect()
            }),
            steps: self.steps,
        }
    }

    /// Alias for with_value (Haskell-style fmap).
    pub fn fmap<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.with_value(f)
    }

    /// Apply a function to the query state.
    pub fn with_state<F>(self, f: F) -> Self
    where
        F: Fn(&State) -> State + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(&f(state))),
            steps: self.steps,
        }
    }

    // ============================================
    // Query span transformations
    // ============================================

    /// Apply a function to the query timespan before querying.
    pub fn with_query_span<F>(self, f: F) -> Self
    where
        F: Fn(&TimeSpan) -> TimeSpan + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(&state.with_span(|span| f(span)))),
            steps: self.steps,
        }
    }

    /// Apply a function to both begin and end of the query timespan.
    pub fn with_query_time<F>(self, f: F) -> Self
    where
        F: Fn(&Fraction) -> Fraction + Send + Sync + 'static,
    {
        self.with_query_span(move |span| span.with_time(&f))
    }

    // ============================================
    // Hap transformations
    // ============================================

    /// Apply a function to all haps returned by queries.
    pub fn with_haps<F>(self, f: F) -> Self
    where
        F: Fn(Vec<Hap<T>>, &State) -> Vec<Hap<T>> + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| f(query(state), state)),
            steps: self.steps,
        }
    }

    /// Apply a function to each hap.
    pub fn with_hap<F>(self, f: F) -> Self
    where
        F: Fn(Hap<T>) -> Hap<T> + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(state).into_iter().map(&f).collect()),
            steps: self.steps,
        }
    }

    /// Apply a function to the timespans of each hap.
    pub fn with_hap_span<F>(self, f: F) -> Self
    where
        F: Fn(&TimeSpan) -> TimeSpan + Send + Sync + 'static,
    {
        self.with_hap(move |hap| hap.with_span(&f))
    }

    /// Apply a function to both begin and end of hap timespans.
    pub fn with_hap_time<F>(self, f: F) -> Self
    where
        F: Fn(&Fraction) -> Fraction + Send + Sync + 'static,
    {
        self.with_hap_span(move |span| span.with_time(&f))
    }

    // ============================================
    // Filtering
    // ============================================

    pub fn filter_haps<F>(self, pred: F) -> Self
    where
        F: Fn(&Hap<T>) -> bool + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(state).into_iter().filter(|h| pred(h)).collect()),
            steps: self.steps,
        }
    }

    pub fn filter_values<F>(self, pred: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter_haps(move |hap| pred(&hap.value))
    }

    /// Keep only haps that have an onset.
    pub fn onsets_only(self) -> Self {
        self.filter_haps(|hap| hap.has_onset())
    }

    /// Keep only discrete haps (those with a whole timespan).
    pub fn discrete_only(self) -> Self {
        self.filter_haps(|hap| hap.whole.is_some())
    }

    /// Split queries at cycle boundaries, so the inner query never sees a
    /// span that crosses one.
    pub fn split_queries(self) -> Self {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| {
                state
                    .span
                    .span_cycles()
                    .into_iter()
                    .flat_map(|subspan| query(&state.set_span(subspan)))
                    .collect()
            }),
            steps: self.steps,
        }
    }

    // ============================================
    // Context
    // ============================================

    pub fn set_context(self, context: Context) -> Self {
        self.with_hap(move |hap| hap.set_context(context.clone()))
    }

    pub fn strip_context(self) -> Self {
        self.set_context(Context::new())
    }

    /// Tag every hap with the source range it was written at.
    pub fn with_location(self, location: Location) -> Self {
        self.with_hap(move |mut hap| {
            if !hap.context.locations.contains(&location) {
                hap.context.locations.push(location);
            }
            hap
        })
    }

    // ============================================
    // Utility methods
    // ============================================

    pub fn first_cycle(&self) -> Vec<Hap<T>> {
        self.query_span(TimeSpan::cycle(0))
    }

    pub fn first_cycle_values(&self) -> Vec<T> {
        self.first_cycle().into_iter().map(|h| h.value).collect()
    }
}

// ============================================
// Pattern constructors
// ============================================

/// A pattern that produces no events.
pub fn silence<T: Clone + Send + Sync + 'static>() -> Pattern<T> {
    Pattern::new(|_| Vec::new())
}

/// Silence that still occupies `steps` steps, e.g. inside a polymeter.
pub fn gap<T: Clone + Send + Sync + 'static>(steps: i64) -> Pattern<T> {
    silence().set_steps(Some(Fraction::from_integer(steps)))
}

/// One event per cycle spanning exactly `[n, n + 1)`.
pub fn pure<T: Clone + Send + Sync + 'static>(value: T) -> Pattern<T> {
    Pattern::with_steps(
        move |state| {
            state
                .span
                .span_cycles()
                .into_iter()
                .map(|subspan| {
                    let whole = subspan.begin.whole_cycle();
                    Hap::new(Some(whole), subspan, value.clone())
                })
                .collect()
        },
        Fraction::one(),
    )
}

/// Stack multiple patterns (play them simultaneously).
pub fn stack<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    match patterns.len() {
        0 => return silence(),
        1 => return patterns.into_iter().next().unwrap_or_else(silence),
        _ => {}
    }
    Pattern::new(move |state| {
        patterns
            .iter()
            .flat_map(|pat| pat.query(state))
            .collect()
    })
}

/// Concatenate patterns, one per cycle.
///
/// Cycle `c` plays pattern `c mod k` (floor semantics, so negative cycles
/// wrap too). Each pattern advances only through the cycles it actually
/// plays: with two patterns, cycle 3 plays cycle 1 of the second pattern.
pub fn slowcat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    if patterns.is_empty() {
        return silence();
    }
    if patterns.len() == 1 {
        return patterns.into_iter().next().unwrap_or_else(silence);
    }

    let len = patterns.len();
    let count = Fraction::from_integer(len as i64);
    let patterns = Arc::new(patterns);

    Pattern::new(move |state| {
        let begin = &state.span.begin;
        let pat = &patterns[begin.cycle_mod(len)];

        let cycle = begin.sam();
        let offset = &cycle - (&cycle / &count).floor();

        pat.query(&state.with_span(|s| s.with_time(|t| t - &offset)))
            .into_iter()
            .map(|hap| hap.with_span(|s| s.with_time(|t| t + &offset)))
            .collect()
    })
    .split_queries()
    .set_steps(Some(Fraction::one()))
}

/// Concatenate patterns, all in one cycle.
pub fn fastcat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    if patterns.is_empty() {
        return silence();
    }
    let len = patterns.len() as i64;
    slowcat(patterns)
        .fast(len)
        .set_steps(Some(Fraction::from_integer(len)))
}

/// Alias for fastcat.
pub fn sequence<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    fastcat(patterns)
}

/// Alias for slowcat.
pub fn cat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    slowcat(patterns)
}

/// Weighted concatenation: each pattern gets a share of the cycle
/// proportional to its weight. Non-positive weights are skipped.
pub fn timecat<T: Clone + Send + Sync + 'static>(
    weighted: Vec<(Fraction, Pattern<T>)>,
) -> Pattern<T> {
    let weighted: Vec<_> = weighted
        .into_iter()
        .filter(|(w, _)| w.is_positive())
        .collect();

    let total = weighted
        .iter()
        .fold(Fraction::zero(), |acc, (w, _)| acc + w);
    if total.is_zero() {
        return silence();
    }

    let mut layers = Vec::with_capacity(weighted.len());
    let mut pos = Fraction::zero();
    for (weight, pat) in weighted {
        let begin = &pos / &total;
        let end = (&pos + &weight) / &total;
        layers.push(pat.compress(begin, end));
        pos = pos + weight;
    }

    stack(layers).set_steps(Some(total))
}

/// Play layers with different step counts at a common step rate.
///
/// Each layer is sped up so that one of its steps lasts `1 / steps` of a
/// cycle. When `steps` is `None` the first layer's step count is used.
/// Layers without a known step count are left out, with a debug log.
pub fn polymeter<T: Clone + Send + Sync + 'static>(
    steps: Option<Fraction>,
    layers: Vec<Pattern<T>>,
) -> Pattern<T> {
    let given = layers.len();
    let layers: Vec<_> = layers
        .into_iter()
        .filter(|p| p.steps().map_or(false, |s| s.is_positive()))
        .collect();
    if layers.len() < given {
        debug!("polymeter left out {} layer(s) with no step count", given - layers.len());
    }

    let target = match steps.or_else(|| layers.first().and_then(|p| p.steps().cloned())) {
        Some(t) if t.is_positive() => t,
        _ => return silence(),
    };

    let layers = layers
        .into_iter()
        .map(|pat| {
            let own = pat.steps().cloned().unwrap_or_else(Fraction::one);
            pat.fast(&target / own)
        })
        .collect();

    stack(layers).set_steps(Some(target))
}

// ============================================
// Time transformations
// ============================================

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Speed up the pattern by a factor.
    ///
    /// A zero factor gives silence. A negative factor speeds up by the
    /// magnitude and reverses each cycle.
    pub fn fast(self, factor: impl Into<Fraction>) -> Self {
        let factor = factor.into();
        if factor.is_zero() {
            return silence();
        }
        if factor.is_negative() {
            return self.fast(-factor).rev();
        }
        let inverse = Fraction::one() / &factor;
        self.with_query_time(move |t| t * &factor)
            .with_hap_time(move |t| t * &inverse)
    }

    /// Slow down the pattern by a factor.
    pub fn slow(self, factor: impl Into<Fraction>) -> Self {
        let factor = factor.into();
        if factor.is_zero() {
            return silence();
        }
        self.fast(Fraction::one() / factor)
    }

    /// Speed up by a patterned factor. The factor pattern's events decide
    /// which speed applies when; event structure comes from the sped-up
    /// pattern.
    pub fn fast_by(self, factor: Pattern<Fraction>) -> Self {
        let steps = self.steps.clone();
        factor
            .fmap(move |f| self.clone().fast(f))
            .inner_join()
            .set_steps(steps)
    }

    /// Slow down by a patterned factor.
    pub fn slow_by(self, factor: Pattern<Fraction>) -> Self {
        let steps = self.steps.clone();
        factor
            .fmap(move |f| self.clone().slow(f))
            .inner_join()
            .set_steps(steps)
    }

    /// Shift the pattern earlier in time.
    pub fn early(self, offset: impl Into<Fraction>) -> Self {
        let offset = offset.into();
        let back = offset.clone();
        self.with_query_time(move |t| t + &offset)
            .with_hap_time(move |t| t - &back)
    }

    /// Shift the pattern later in time.
    pub fn late(self, offset: impl Into<Fraction>) -> Self {
        self.early(-offset.into())
    }

    /// Reverse the pattern within each cycle.
    ///
    /// A zero-width query at `t` sees the event that covers `t` after
    /// reflection, so a query at a cycle start finds the event that ends
    /// the cycle in the original.
    pub fn rev(self) -> Self {
        let steps = self.steps.clone();
        let pat = self;
        Pattern::new(move |state| {
            let cycle = state.span.begin.sam();
            let next_cycle = state.span.begin.next_sam();

            // Reflect around the middle of the cycle, swapping begin and end.
            let reflect = |ts: &TimeSpan| {
                TimeSpan::new(
                    &cycle + (&next_cycle - &ts.end),
                    &cycle + (&next_cycle - &ts.begin),
                )
            };
            let mirror = |hap: Hap<T>| {
                let whole = hap.whole.as_ref().map(reflect);
                let part = reflect(&hap.part);
                Hap::with_context(whole, part, hap.value, hap.context)
            };

            if state.span.is_zero_width() {
                let t = &state.span.begin;
                let point = state.span.clone();
                let cycle_span = TimeSpan::new(cycle.clone(), next_cycle.clone());
                let discrete = pat
                    .query(&state.set_span(cycle_span))
                    .into_iter()
                    .filter(|hap| hap.whole.is_some())
                    .map(mirror)
                    .filter(|hap| hap.part.begin <= *t && *t < hap.part.end);
                let continuous = pat
                    .query(&state.set_span(reflect(&point)))
                    .into_iter()
                    .filter(|hap| hap.whole.is_none())
                    .map(mirror);
                return discrete
                    .chain(continuous)
                    .map(|hap| Hap::with_context(hap.whole, point.clone(), hap.value, hap.context))
                    .collect();
            }

            pat.query(&state.set_span(reflect(&state.span)))
                .into_iter()
                .map(mirror)
                .collect()
        })
        .split_queries()
        .set_steps(steps)
    }

    /// Repeat each cycle `n` times: cycles `0..n` all play cycle 0,
    /// cycles `n..2n` play cycle 1, and so on.
    pub fn repeat_cycles(self, n: i64) -> Self {
        if n <= 1 {
            return self;
        }
        let n = Fraction::from_integer(n);
        let steps = self.steps.clone();
        let pat = self;
        Pattern::new(move |state| {
            let cycle = state.span.begin.sam();
            let source_cycle = (&cycle / &n).floor();
            let delta = cycle - source_cycle;

            pat.query(&state.with_span(|s| s.with_time(|t| t - &delta)))
                .into_iter()
                .map(|hap| hap.with_span(|span| span.with_time(|t| t + &delta)))
                .collect()
        })
        .split_queries()
        .set_steps(steps)
    }

    /// Squeeze each cycle into `[begin, end)` of the same cycle, leaving the
    /// rest silent. Out-of-range or empty windows give silence.
    pub fn compress(self, begin: impl Into<Fraction>, end: impl Into<Fraction>) -> Self {
        let begin = begin.into();
        let end = end.into();
        if begin > end
            || begin > Fraction::one()
            || end > Fraction::one()
            || begin.is_negative()
            || end.is_negative()
        {
            return silence();
        }
        let duration = &end - &begin;
        if duration.is_zero() {
            return silence();
        }
        let steps = self.steps.clone();
        self.fast(Fraction::one() / duration)
            .late(begin)
            .set_steps(steps)
    }

    /// Like `compress`, but the pattern keeps playing outside the window.
    pub fn focus(self, begin: impl Into<Fraction>, end: impl Into<Fraction>) -> Self {
        let begin = begin.into();
        let end = end.into();
        if begin >= end {
            return silence();
        }
        self.early(begin.sam())
            .fast(Fraction::one() / (&end - &begin))
            .late(begin)
    }

    /// Zoom into `[begin, end)` of each cycle, stretching it to fill the cycle.
    pub fn zoom(self, begin: impl Into<Fraction>, end: impl Into<Fraction>) -> Self {
        let begin = begin.into();
        let end = end.into();
        if begin >= end {
            return silence();
        }
        let duration = &end - &begin;
        let pat = self;
        Pattern::new(move |state| {
            let cycle = state.span.begin.sam();
            let to_inner = |t: &Fraction| &cycle + (t - &cycle) * &duration + &begin;
            let to_outer = |t: &Fraction| &cycle + (t - &cycle - &begin) / &duration;

            pat.query(&state.set_span(state.span.with_time(to_inner)))
                .into_iter()
                .map(|hap| hap.with_span(|s| s.with_time(to_outer)))
                .collect()
        })
        .split_queries()
    }

    /// Repeat the first `amount` of each cycle until the cycle is full.
    /// A negative amount repeats the last part of the cycle instead.
    pub fn linger(self, amount: impl Into<Fraction>) -> Self {
        let amount = amount.into();
        if amount.is_zero() {
            return silence();
        }
        let len = amount.abs();
        if len >= Fraction::one() {
            return self;
        }
        let start = if amount.is_negative() {
            Fraction::one() - &len
        } else {
            Fraction::zero()
        };

        let pat = self;
        Pattern::new(move |state| {
            let span = &state.span;
            let cycle = span.begin.sam();
            let first = ((&span.begin - &cycle) / &len).floor();

            let mut haps = Vec::new();
            let mut slot = first;
            loop {
                let slot_begin = &cycle + &slot * &len;
                if slot_begin > span.begin && slot_begin >= span.end {
                    break;
                }
                let slot_span = TimeSpan::new(slot_begin.clone(), &slot_begin + &len);
                if let Some(sub) = span.intersection(&slot_span) {
                    let shift = &slot * &len - &start;
                    let inner = sub.with_time(|t| t - &shift);
                    haps.extend(
                        pat.query(&state.set_span(inner))
                            .into_iter()
                            .map(|hap| hap.with_span(|s| s.with_time(|t| t + &shift))),
                    );
                }
                if span.is_zero_width() {
                    break;
                }
                slot = slot + Fraction::one();
            }
            haps
        })
        .split_queries()
    }

    /// Repeat each event `n` times within its own span.
    pub fn ply(self, n: impl Into<Fraction>) -> Self {
        let n = n.into();
        if !n.is_positive() {
            return silence();
        }
        let steps = self.steps.clone();
        self.squeeze_bind(move |v| pure(v).fast(n.clone()))
            .set_steps(steps)
    }

    /// Play forwards, then backwards on alternate cycles.
    pub fn palindrome(self) -> Self {
        slowcat(vec![self.clone(), self.rev()])
    }

    /// Apply `f` at a faster timescale: `inside(2, rev)` reverses each half cycle.
    pub fn inside<F>(self, factor: impl Into<Fraction>, f: F) -> Self
    where
        F: FnOnce(Pattern<T>) -> Pattern<T>,
    {
        let factor = factor.into();
        f(self.slow(factor.clone())).fast(factor)
    }

    /// Apply `f` at a slower timescale: `outside(2, rev)` reverses pairs of cycles.
    pub fn outside<F>(self, factor: impl Into<Fraction>, f: F) -> Self
    where
        F: FnOnce(Pattern<T>) -> Pattern<T>,
    {
        let factor = factor.into();
        f(self.fast(factor.clone())).slow(factor)
    }

    /// Stack the pattern with a transformed copy shifted later by `offset`.
    pub fn off<F>(self, offset: impl Into<Fraction>, f: F) -> Self
    where
        F: FnOnce(Pattern<T>) -> Pattern<T>,
    {
        let shifted = f(self.clone()).late(offset);
        stack(vec![self, shifted])
    }

    /// Stack the pattern with a transformed copy.
    pub fn superimpose<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        stack(vec![self.clone(), f(self)])
    }

    /// Stack the results of several transformations of this pattern.
    pub fn layer<F>(self, funcs: Vec<F>) -> Self
    where
        F: Fn(Self) -> Self,
    {
        stack(funcs.into_iter().map(|f| f(self.clone())).collect())
    }
}

// ============================================
// Applicative operations
// ============================================

/// Apply a pattern of functions to a pattern of values. Structure comes
/// from both sides: wholes and parts are intersections.
pub fn app_both<F, A, B>(pat_func: Pattern<F>, pat_val: Pattern<A>) -> Pattern<B>
where
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    Pattern::new(move |state| {
        let hap_vals = pat_val.query(state);
        let mut result = Vec::new();

        for hap_func in pat_func.query(state) {
            for hap_val in &hap_vals {
                let Some(part) = hap_func.part.intersection(&hap_val.part) else {
                    continue;
                };
                let whole = match (&hap_func.whole, &hap_val.whole) {
                    (Some(a), Some(b)) => match a.intersection(b) {
                        Some(w) => Some(w),
                        None => continue,
                    },
                    _ => None,
                };
                let value = (hap_func.value)(hap_val.value.clone());
                let context = hap_func.combine_context(hap_val);
                result.push(Hap::with_context(whole, part, value, context));
            }
        }
        result
    })
}

/// Apply with structure from the left (function) pattern.
pub fn app_left<F, A, B>(pat_func: Pattern<F>, pat_val: Pattern<A>) -> Pattern<B>
where
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    Pattern::new(move |state| {
        let mut result = Vec::new();

        for hap_func in pat_func.query(state) {
            let hap_vals = pat_val.query(&state.set_span(hap_func.whole_or_part().clone()));

            for hap_val in hap_vals {
                if let Some(part) = hap_func.part.intersection(&hap_val.part) {
                    let value = (hap_func.value)(hap_val.value.clone());
                    let context = hap_func.combine_context(&hap_val);
                    result.push(Hap::with_context(hap_func.whole.clone(), part, value, context));
                }
            }
        }
        result
    })
}

/// Apply with structure from the right (value) pattern.
pub fn app_right<F, A, B>(pat_func: Pattern<F>, pat_val: Pattern<A>) -> Pattern<B>
where
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    Pattern::new(move |state| {
        let mut result = Vec::new();

        for hap_val in pat_val.query(state) {
            let hap_funcs = pat_func.query(&state.set_span(hap_val.whole_or_part().clone()));

            for hap_func in hap_funcs {
                if let Some(part) = hap_func.part.intersection(&hap_val.part) {
                    let value = (hap_func.value)(hap_val.value.clone());
                    let context = hap_func.combine_context(&hap_val);
                    result.push(Hap::with_context(hap_val.whole.clone(), part, value, context));
                }
            }
        }
        result
    })
}

// ============================================
// Monadic operations
// ============================================

impl<T: Clone + Send + Sync + 'static> Pattern<Pattern<T>> {
    /// Flatten a pattern of patterns, using intersection for wholes.
    pub fn join(self) -> Pattern<T> {
        let outer = self;
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for outer_hap in outer.query(state) {
                for inner_hap in outer_hap.value.query(&state.set_span(outer_hap.part.clone())) {
                    let whole = match (&outer_hap.whole, &inner_hap.whole) {
                        (Some(a), Some(b)) => match a.intersection(b) {
                            Some(w) => Some(w),
                            None => continue,
                        },
                        _ => None,
                    };
                    if let Some(part) = outer_hap.part.intersection(&inner_hap.part) {
                        let context = outer_hap.combine_context(&inner_hap);
                        result.push(Hap::with_context(whole, part, inner_hap.value, context));
                    }
                }
            }
            result
        })
    }

    /// Flatten a pattern of patterns, taking wholes from outer.
    pub fn outer_join(self) -> Pattern<T> {
        let outer = self;
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for outer_hap in outer.query(state) {
                // Inner values are sampled at the outer event's onset.
                let onset = outer_hap.whole_begin().clone();
                let probe = TimeSpan::new(onset.clone(), onset);
                for inner_hap in outer_hap.value.query(&state.set_span(probe)) {
                    let context = outer_hap.combine_context(&inner_hap);
                    result.push(Hap::with_context(
                        outer_hap.whole.clone(),
                        outer_hap.part.clone(),
                        inner_hap.value,
                        context,
                    ));
                }
            }
            result
        })
    }

    /// Flatten a pattern of patterns, taking wholes from inner.
    pub fn inner_join(self) -> Pattern<T> {
        let outer = self;
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for outer_hap in outer.query(state) {
                for inner_hap in outer_hap.value.query(&state.set_span(outer_hap.part.clone())) {
                    if let Some(part) = outer_hap.part.intersection(&inner_hap.part) {
                        let context = outer_hap.combine_context(&inner_hap);
                        result.push(Hap::with_context(inner_hap.whole, part, inner_hap.value, context));
                    }
                }
            }
            result
        })
    }

    /// Squeeze a cycle of each inner pattern into the whole of the outer
    /// event that carries it.
    pub fn squeeze_join(self) -> Pattern<T> {
        let outer = self.discrete_only();
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for outer_hap in outer.query(state) {
                let whole = outer_hap.whole_or_part().clone();
                let focused = outer_hap.value.clone().focus(whole.begin, whole.end);

                for inner_hap in focused.query(&state.set_span(outer_hap.part.clone())) {
                    let new_whole = match (&inner_hap.whole, &outer_hap.whole) {
                        (Some(a), Some(b)) => match a.intersection(b) {
                            Some(w) => Some(w),
                            None => continue,
                        },
                        _ => None,
                    };
                    if let Some(part) = inner_hap.part.intersection(&outer_hap.part) {
                        let context = outer_hap.combine_context(&inner_hap);
                        result.push(Hap::with_context(new_whole, part, inner_hap.value, context));
                    }
                }
            }
            result
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Bind: apply a function that returns a pattern to each value.
    pub fn bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).join()
    }

    pub fn outer_bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).outer_join()
    }

    pub fn inner_bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).inner_join()
    }

    pub fn squeeze_bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).squeeze_join()
    }

    // ============================================
    // Conditionals and structure
    // ============================================

    /// Apply `f` on cycles whose index is a multiple of `n`, starting with
    /// cycle 0. `n <= 0` leaves the pattern unchanged.
    pub fn every<F>(self, n: i64, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if n <= 0 {
            return self;
        }
        let transformed = f(self.clone());
        cycle_switch(n, 0, transformed, self)
    }

    /// Alias for `every`.
    pub fn first_of<F>(self, n: i64, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.every(n, f)
    }

    /// Apply `f` on the last cycle of every group of `n`.
    pub fn last_of<F>(self, n: i64, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if n <= 0 {
            return self;
        }
        let transformed = f(self.clone());
        cycle_switch(n, n - 1, transformed, self)
    }

    /// Apply `f` on cycles whose index passes `test`.
    pub fn when_cycle<P, F>(self, test: P, f: F) -> Self
    where
        P: Fn(i64) -> bool + Send + Sync + 'static,
        F: FnOnce(Self) -> Self,
    {
        let transformed = f(self.clone());
        let pat = self;
        Pattern::new(move |state| {
            let cycle = state.span.begin.cycle().to_i64();
            if cycle.map_or(false, &test) {
                transformed.query(state)
            } else {
                pat.query(state)
            }
        })
        .split_queries()
    }

    /// Impose the structure of a boolean pattern: every `true` event
    /// becomes an event carrying this pattern's value at that time.
    pub fn struct_by(self, structure: Pattern<bool>) -> Self {
        let pat = self;
        let steps = structure.steps.clone();
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for gate in structure.query(state) {
                if !gate.value {
                    continue;
                }
                for hap in pat.query(&state.set_span(gate.whole_or_part().clone())) {
                    if let Some(part) = gate.part.intersection(&hap.part) {
                        let context = gate.combine_context(&hap);
                        result.push(Hap::with_context(gate.whole.clone(), part, hap.value, context));
                    }
                }
            }
            result
        })
        .set_steps(steps)
    }

    /// Keep only the parts of events that overlap `true` events of `mask`.
    pub fn mask(self, mask: Pattern<bool>) -> Self {
        let steps = self.steps.clone();
        let pat = self;
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for gate in mask.query(state) {
                if !gate.value {
                    continue;
                }
                for hap in pat.query(&state.set_span(gate.part.clone())) {
                    if let Some(part) = gate.part.intersection(&hap.part) {
                        let context = hap.combine_context(&gate);
                        result.push(Hap::with_context(hap.whole, part, hap.value, context));
                    }
                }
            }
            result
        })
        .set_steps(steps)
    }
}

/// Play `on` on cycles `c` with `c mod n == index`, `off` elsewhere.
fn cycle_switch<T: Clone + Send + Sync + 'static>(
    n: i64,
    index: i64,
    on: Pattern<T>,
    off: Pattern<T>,
) -> Pattern<T> {
    let n = usize::try_from(n).unwrap_or(usize::MAX);
    let index = usize::try_from(index).unwrap_or(0);
    let steps = off.steps.clone();
    Pattern::new(move |state| {
        if state.span.begin.cycle_mod(n) == index {
            on.query(state)
        } else {
            off.query(state)
        }
    })
    .split_queries()
    .set_steps(steps)
}

// ============================================
// Numeric helpers
// ============================================

/// The integers `0..n` as one sequence per cycle.
pub fn run(n: i64) -> Pattern<i64> {
    iota(0, n)
}

/// The integers `start..end` as one sequence per cycle.
pub fn iota(start: i64, end: i64) -> Pattern<i64> {
    fastcat((start..end).map(pure).collect())
}
