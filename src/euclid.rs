//! Euclidean rhythms.
//!
//! Bjorklund's algorithm spreads `pulses` onsets as evenly as possible over
//! `steps` steps. The resulting boolean sequence gates another pattern.

use crate::pattern::{fastcat, pure, silence, Pattern};

/// Longest step sequence a Euclidean rhythm may have. Longer requests give
/// no steps.
pub const MAX_EUCLID_STEPS: usize = 1 << 16;

/// Bjorklund's algorithm for Euclidean rhythms.
///
/// `bjorklund(3, 8)` is `x..x..x.`. More pulses than steps fills every step.
/// More than `MAX_EUCLID_STEPS` steps gives an empty sequence.
pub fn bjorklund(pulses: usize, steps: usize) -> Vec<bool> {
    if steps == 0 || steps > MAX_EUCLID_STEPS {
        return vec![];
    }
    if pulses >= steps {
        return vec![true; steps];
    }
    if pulses == 0 {
        return vec![false; steps];
    }

    let mut pattern: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut remainder: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];

    while remainder.len() > 1 {
        let min_len = pattern.len().min(remainder.len());
        let mut combined = Vec::with_capacity(min_len);

        for i in 0..min_len {
            let mut group = pattern[i].clone();
            group.extend_from_slice(&remainder[i]);
            combined.push(group);
        }

        let leftover = if pattern.len() > remainder.len() {
            pattern[min_len..].to_vec()
        } else {
            remainder[min_len..].to_vec()
        };

        pattern = combined;
        remainder = leftover;
    }

    pattern.extend(remainder);
    pattern.into_iter().flatten().collect()
}

/// The step sequence for `(pulses, steps, rotation)`.
///
/// Rotation shifts the sequence left, wrapping around. Negative pulses
/// invert the sequence of `|pulses|`. Non-positive or oversized step counts
/// give no steps.
pub fn euclid_steps(pulses: i64, steps: i64, rotation: i64) -> Vec<bool> {
    let len = match usize::try_from(steps) {
        Ok(len) if len > 0 && len <= MAX_EUCLID_STEPS => len,
        _ => return vec![],
    };
    let pulses_abs = usize::try_from(pulses.unsigned_abs()).unwrap_or(usize::MAX);
    let mut seq = bjorklund(pulses_abs.min(len), len);
    if pulses < 0 {
        seq.iter_mut().for_each(|b| *b = !*b);
    }
    let shift = rotation.rem_euclid(steps) as usize;
    seq.rotate_left(shift);
    seq
}

/// A boolean pattern with one event per step, `true` on the pulses.
pub fn euclid_bool(pulses: i64, steps: i64, rotation: i64) -> Pattern<bool> {
    let seq = euclid_steps(pulses, steps, rotation);
    if seq.is_empty() {
        return silence();
    }
    fastcat(seq.into_iter().map(pure).collect())
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Play this pattern only on the pulses of a Euclidean rhythm.
    pub fn euclid(self, pulses: i64, steps: i64) -> Self {
        self.euclid_rot(pulses, steps, 0)
    }

    /// Like `euclid`, with the step sequence rotated left by `rotation`.
    pub fn euclid_rot(self, pulses: i64, steps: i64, rotation: i64) -> Self {
        if steps <= 0 {
            return silence();
        }
        self.struct_by(euclid_bool(pulses, steps, rotation))
    }

    /// Euclidean gating with patterned arguments, one triple per event of
    /// the argument patterns.
    pub fn euclid_by(
        self,
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
    ) -> Self {
        pulses.inner_bind(move |k| {
            let pat = self.clone();
            let rotation = rotation.clone();
            steps.clone().inner_bind(move |n| {
                let pat = pat.clone();
                rotation
                    .clone()
                    .inner_bind(move |r| pat.clone().euclid_rot(k, n, r))
            })
        })
    }
}

/// `value` on the pulses of a Euclidean rhythm.
pub fn euclid<T: Clone + Send + Sync + 'static>(pulses: i64, steps: i64, value: T) -> Pattern<T> {
    pure(value).euclid(pulses, steps)
}
