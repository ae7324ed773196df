//! Weights applied to older buckets when a window of buckets is merged into one ranking.
//!
//! A decay function maps the age of a bucket, counted in buckets behind the current one,
//! to a weight in `(0, 1]`. The current bucket (age 0) always weighs exactly 1.

use crate::error::{Error, Result};

/// Gravity used by [`Exponential::default`]. With it, the bucket of age 23 weighs about 0.1.
pub const DEFAULT_GRAVITY: f64 = 0.714;

/// A pure weighting of bucket ages.
pub trait Decay: Send + Sync {
    /// Weight applied to the scores of a bucket `age` buckets older than the current one.
    fn weight(&self, age: u64) -> f64;
}

impl<F> Decay for F
where
    F: Fn(u64) -> f64 + Send + Sync,
{
    #[inline]
    fn weight(&self, age: u64) -> f64 {
        self(age)
    }
}

/// Computes `(age + 1) ^ -gravity`, rounded to 5 decimal digits.
///
/// The higher the age, the lower the weight, and the higher the gravity the faster the
/// weight falls off. A gravity of 0 weighs every age at 1.
#[inline]
pub fn exponential_decay(age: u64, gravity: f64) -> f64 {
    round5((age as f64 + 1.0).powf(-gravity))
}

#[inline]
fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// Power-law decay with a configurable gravity, see [`exponential_decay`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    gravity: f64,
}

impl Exponential {
    /// Fails with `InvalidConfiguration` unless `gravity` is finite and not negative,
    /// the range in which weights stay within `(0, 1]`.
    pub fn new(gravity: f64) -> Result<Self> {
        if !gravity.is_finite() || gravity < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "gravity must be finite and not negative, got {gravity}"
            )));
        }
        Ok(Self { gravity })
    }

    #[inline]
    pub fn gravity(&self) -> f64 {
        self.gravity
    }
}

impl Default for Exponential {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
        }
    }
}

impl Decay for Exponential {
    #[inline]
    fn weight(&self, age: u64) -> f64 {
        exponential_decay(age, self.gravity)
    }
}

/// Every bucket weighs 1, turning a ranking into a plain sum over the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDecay;

impl Decay for NoDecay {
    #[inline]
    fn weight(&self, _age: u64) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKETS: u64 = 24;

    #[test]
    fn gravity_zero() {
        let decay = Exponential::new(0.0).unwrap();
        for age in 0..BUCKETS {
            assert_eq!(decay.weight(age), 1.0);
        }
    }

    #[test]
    fn gravity_default() {
        let decay = Exponential::default();
        assert_eq!(decay.weight(0), 1.0);
        let expected = ((BUCKETS as f64).powf(-0.714) * 100_000.0).round() / 100_000.0;
        assert_eq!(decay.weight(BUCKETS - 1), expected);
        assert_eq!(decay.weight(BUCKETS - 1), 0.1034);
        assert_eq!(decay.weight(1), 0.60963);
        assert_eq!(decay.weight(2), 0.45639);
    }

    #[test]
    fn current_bucket_weighs_one() {
        for gravity in [0.0, 0.1, DEFAULT_GRAVITY, 1.8, 10.0] {
            assert_eq!(exponential_decay(0, gravity), 1.0);
        }
    }

    #[test]
    fn strictly_decreasing() {
        let decay = Exponential::default();
        let weights: Vec<f64> = (0..BUCKETS).map(|age| decay.weight(age)).collect();
        assert!(weights.windows(2).all(|w| w[0] > w[1]), "{weights:?}");
        assert!(weights.iter().all(|w| *w > 0.0 && *w <= 1.0));
    }

    #[test]
    fn invalid_gravity() {
        for gravity in [-0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(
                matches!(Exponential::new(gravity), Err(Error::InvalidConfiguration(_))),
                "{gravity}"
            );
        }
        assert_eq!(Exponential::new(1.8).unwrap().gravity(), 1.8);
    }

    #[test]
    fn no_decay() {
        assert_eq!(NoDecay.weight(0), 1.0);
        assert_eq!(NoDecay.weight(1_000), 1.0);
    }

    #[test]
    fn closures() {
        let halving = |age: u64| 0.5f64.powi(age as i32);
        assert_eq!(Decay::weight(&halving, 0), 1.0);
        assert_eq!(Decay::weight(&halving, 3), 0.125);
    }
}
