//! Continuous signals and deterministic randomness.
//!
//! Signals are patterns whose haps have no `whole`: they sample a function
//! of time over whatever span is queried.
//!
//! Random draws never touch a global generator. Each draw seeds a fresh
//! `ChaCha8Rng` from a hash of the query seed, a per-combinator salt, and
//! the exact time of the event (cycle index plus position in the cycle).
//! Events are keyed on the begin of their whole, so every fragment of one
//! event sees the same draw no matter how the scheduler slices time.

use crate::fraction::Fraction;
use crate::hap::Hap;
use crate::pattern::{pure, silence, stack, Pattern};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SEED_MIX: u64 = 0x517c_c1b7_2722_0a95;
const TIME_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const SALT_MIX: u64 = 0x85eb_ca6b_0b7e_3a85;

fn avalanche(mut hash: u64) -> u64 {
    hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    hash ^ (hash >> 32)
}

fn mix_word(hash: u64, word: u64) -> u64 {
    let mut h = hash.wrapping_add(word.wrapping_mul(TIME_MIX));
    h ^= h >> 31;
    avalanche(h)
}

fn mix_fraction(hash: u64, t: &Fraction) -> u64 {
    let (sign, numer, denom) = t.words();
    let mut h = mix_word(hash, sign);
    h = mix_word(h, numer.len() as u64);
    for word in numer {
        h = mix_word(h, word);
    }
    h = mix_word(h, denom.len() as u64);
    for word in denom {
        h = mix_word(h, word);
    }
    h
}

/// Hash of `(seed, salt, cycle index, position within cycle)`.
fn time_hash(seed: u64, salt: u64, t: &Fraction) -> u64 {
    let mut hash = seed.wrapping_mul(SEED_MIX);
    hash ^= hash >> 32;
    hash = hash.wrapping_add(salt.wrapping_mul(SALT_MIX));
    hash ^= hash >> 30;

    let cycle = Fraction::from_bigint(t.cycle());
    hash = mix_fraction(hash, &cycle);
    mix_fraction(hash, &t.cycle_pos())
}

fn draw(seed: u64, salt: u64, t: &Fraction) -> f64 {
    let mut rng = ChaCha8Rng::seed_from_u64(time_hash(seed, salt, t));
    rng.gen::<f64>()
}

/// A uniform value in `[0, 1)` for time `t` under `seed`.
pub fn rand_at(seed: u64, t: &Fraction) -> f64 {
    draw(seed, 0, t)
}

// ============================================
// Signal patterns (continuous)
// ============================================

/// A continuous signal sampled at the middle of the query.
fn signal<F>(f: F) -> Pattern<f64>
where
    F: Fn(&Fraction) -> f64 + Send + Sync + 'static,
{
    Pattern::new(move |state| {
        let value = f(&state.span.midpoint());
        vec![Hap::new(None, state.span.clone(), value)]
    })
}

/// Rises from 0 to 1 over each cycle.
pub fn saw() -> Pattern<f64> {
    signal(|t| t.cycle_pos().to_f64())
}

pub fn isaw() -> Pattern<f64> {
    saw().fmap(|x| 1.0 - x)
}

pub fn sine() -> Pattern<f64> {
    saw().fmap(|x| (x * std::f64::consts::TAU).sin() * 0.5 + 0.5)
}

pub fn cosine() -> Pattern<f64> {
    saw().fmap(|x| (x * std::f64::consts::TAU).cos() * 0.5 + 0.5)
}

pub fn tri() -> Pattern<f64> {
    saw().fmap(|x| 1.0 - (2.0 * x - 1.0).abs())
}

pub fn square() -> Pattern<f64> {
    saw().fmap(|x| if x < 0.5 { 0.0 } else { 1.0 })
}

/// The exact time at the middle of the query.
pub fn time() -> Pattern<Fraction> {
    Pattern::new(|state| vec![Hap::new(None, state.span.clone(), state.span.midpoint())])
}

/// Scale a signal from `[0, 1]` to `[min, max]`.
pub fn range(min: f64, max: f64, pat: Pattern<f64>) -> Pattern<f64> {
    pat.fmap(move |x| x * (max - min) + min)
}

/// Sample a pattern `n` times per cycle, turning a signal into discrete
/// events.
pub fn segment<T: Clone + Send + Sync + 'static>(n: impl Into<Fraction>, pat: Pattern<T>) -> Pattern<T> {
    let n = n.into();
    if !n.is_positive() {
        return silence();
    }
    pat.struct_by(pure(true).fast(n))
}

/// A continuous random signal in `[0, 1)`, drawn at the begin of each query.
pub fn rand() -> Pattern<f64> {
    Pattern::new(|state| {
        let value = draw(state.seed, 0, &state.span.begin);
        vec![Hap::new(None, state.span.clone(), value)]
    })
}

/// Random integers in `0..n`.
pub fn irand(n: i64) -> Pattern<i64> {
    if n <= 0 {
        return silence();
    }
    rand().fmap(move |r| ((r * n as f64).floor() as i64).min(n - 1))
}

/// Pick one of `patterns` at random for each cycle.
pub fn choose_cycles<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    choose_cycles_seeded(patterns, 0)
}

/// `choose_cycles` with its own salt, so several choices in one pattern
/// make independent decisions.
pub fn choose_cycles_seeded<T: Clone + Send + Sync + 'static>(
    patterns: Vec<Pattern<T>>,
    salt: u64,
) -> Pattern<T> {
    match patterns.len() {
        0 => return silence(),
        1 => return patterns.into_iter().next().unwrap_or_else(silence),
        _ => {}
    }
    let len = patterns.len();
    Pattern::new(move |state| {
        let r = draw(state.seed, salt, &state.span.begin.sam());
        let index = ((r * len as f64) as usize).min(len - 1);
        patterns[index].query(state)
    })
    .split_queries()
}

// ============================================
// Random combinators
// ============================================

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Drop each event with probability `probability`.
    pub fn degrade_by(self, probability: f64) -> Self {
        self.degrade_by_seeded(probability, 0)
    }

    /// `degrade_by` with a salt, so that two degraded copies of one pattern
    /// drop different events.
    pub fn degrade_by_seeded(self, probability: f64, salt: u64) -> Self {
        self.keep_by_draw(move |r| r >= probability, salt)
    }

    /// Keep exactly the events `degrade_by(probability)` would drop.
    pub fn undegrade_by(self, probability: f64) -> Self {
        self.keep_by_draw(move |r| r < probability, 0)
    }

    /// Drop half the events.
    pub fn degrade(self) -> Self {
        self.degrade_by(0.5)
    }

    fn keep_by_draw<F>(self, keep: F, salt: u64) -> Self
    where
        F: Fn(f64) -> bool + Send + Sync + 'static,
    {
        let steps = self.steps().cloned();
        let pat = self;
        Pattern::new(move |state| {
            pat.query(state)
                .into_iter()
                .filter(|hap| keep(draw(state.seed, salt, hap.whole_begin())))
                .collect()
        })
        .set_steps(steps)
    }

    /// Apply `f` to each event with probability `probability`. The events
    /// passed to `f` and the ones left alone partition the original.
    pub fn sometimes_by<F>(self, probability: f64, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        stack(vec![
            self.clone().degrade_by(probability),
            f(self.undegrade_by(probability)),
        ])
    }

    pub fn sometimes<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.sometimes_by(0.5, f)
    }

    pub fn often<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.sometimes_by(0.75, f)
    }

    pub fn rarely<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.sometimes_by(0.25, f)
    }
}
