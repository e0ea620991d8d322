//! Retry pacing strategies.
//!
//! A [`Backoff`] maps an attempt counter to the delay slept before the next
//! delivery attempt. Two strategies are available:
//!
//! - [`Exponential`]: `2^attempts` seconds, capped so delays stay practical.
//! - [`Sinusoidal`]: oscillates between a base and a maximum delay with a
//!   per-instance random phase shift and jitter, so many jobs created at the
//!   same moment do not retry in lockstep while the worst-case delay stays
//!   bounded.

use std::f64::consts::PI;
use std::time::Duration;

/// Upper cap applied to the exponential strategy.
const EXPONENTIAL_CAP: Duration = Duration::from_secs(3600);

/// Default lower bound for the sinusoidal strategy.
const BASE_DELAY: Duration = Duration::from_secs(1);
/// Default upper bound for the sinusoidal strategy.
const MAX_DELAY: Duration = Duration::from_secs(20);
/// Bounds for the oscillation period (attempts per full sine wave).
const MIN_OSCILLATION: u32 = 5;
const MAX_OSCILLATION: u32 = 30;
/// Upper bound for the per-instance jitter factor.
const JITTER_FACTOR: f64 = 0.1;

/// Delay strategy selected at construction time.
#[derive(Debug, Clone)]
pub enum Backoff {
    Exponential(Exponential),
    Sinusoidal(Sinusoidal),
}

impl Backoff {
    pub fn exponential() -> Self {
        Self::Exponential(Exponential)
    }

    pub fn sinusoidal() -> Self {
        Self::Sinusoidal(Sinusoidal::new())
    }

    /// Delay to sleep before the attempt following `attempts` failures.
    pub fn delay(&self, attempts: u32) -> Duration {
        match self {
            Self::Exponential(e) => e.delay(attempts),
            Self::Sinusoidal(s) => s.delay(attempts),
        }
    }
}

/// `2^attempts` seconds, saturating at [`EXPONENTIAL_CAP`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Exponential {
    pub fn delay(&self, attempts: u32) -> Duration {
        let secs = 1u64
            .checked_shl(attempts)
            .unwrap_or(EXPONENTIAL_CAP.as_secs());
        Duration::from_secs(secs).min(EXPONENTIAL_CAP)
    }
}

/// Bounded sinusoidal delay with per-instance phase shift and jitter.
#[derive(Debug, Clone)]
pub struct Sinusoidal {
    base: Duration,
    max: Duration,
    oscillation: u32,
    phase_shift: f64,
    jitter_factor: f64,
}

impl Default for Sinusoidal {
    fn default() -> Self {
        Self::new()
    }
}

impl Sinusoidal {
    pub fn new() -> Self {
        Self::with_bounds(BASE_DELAY, MAX_DELAY)
    }

    /// Build a strategy oscillating between `base` and `max`.
    ///
    /// The oscillation period is derived from the `max`/`base` ratio and
    /// clamped to `[MIN_OSCILLATION, MAX_OSCILLATION]`. Phase shift and
    /// jitter factor are drawn once and stay fixed for the instance.
    pub fn with_bounds(base: Duration, max: Duration) -> Self {
        let ratio = (max.as_secs_f64() / base.as_secs_f64().max(f64::EPSILON)) as u32;
        let oscillation =
            ((ratio + MAX_OSCILLATION / MIN_OSCILLATION) / 2).clamp(MIN_OSCILLATION, MAX_OSCILLATION);

        Self {
            base,
            max,
            oscillation,
            phase_shift: rand::random::<f64>(),
            jitter_factor: rand::random::<f64>() * JITTER_FACTOR,
        }
    }

    /// Jitter factor drawn at construction, in `[0, 0.1)`.
    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        let sin_factor = ((attempts as f64) * (PI / self.oscillation as f64) + self.phase_shift
            - PI / 2.0)
            .sin();

        // sin is in [-1, 1]; normalize to [0, 1] and lerp to [base, max].
        let span = self.max.as_secs_f64() - self.base.as_secs_f64();
        let delay = self.base.as_secs_f64() + (sin_factor + 1.0) / 2.0 * span;

        Duration::from_secs_f64(delay + self.jitter_factor * delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_per_attempt() {
        let b = Backoff::exponential();
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(5), Duration::from_secs(32));
        assert_eq!(b.delay(10), Duration::from_secs(1024));
    }

    #[test]
    fn exponential_saturates_at_cap() {
        let b = Backoff::exponential();
        assert_eq!(b.delay(12), EXPONENTIAL_CAP);
        assert_eq!(b.delay(63), EXPONENTIAL_CAP);
        assert_eq!(b.delay(64), EXPONENTIAL_CAP);
        assert_eq!(b.delay(u32::MAX), EXPONENTIAL_CAP);
    }

    #[test]
    fn sinusoidal_stays_within_bounds() {
        let s = Sinusoidal::new();
        let max = MAX_DELAY.as_secs_f64() * (1.0 + s.jitter_factor());
        for attempts in 0..500 {
            let d = s.delay(attempts).as_secs_f64();
            assert!(d >= BASE_DELAY.as_secs_f64(), "attempt {attempts}: {d} below base");
            assert!(d <= max, "attempt {attempts}: {d} above {max}");
        }
    }

    #[test]
    fn sinusoidal_jitter_is_fixed_per_instance() {
        let s = Sinusoidal::new();
        assert!(s.jitter_factor() >= 0.0 && s.jitter_factor() < JITTER_FACTOR);
        // Same instance, same attempt count: the delay is deterministic.
        for attempts in [0, 1, 7, 42] {
            assert_eq!(s.delay(attempts), s.delay(attempts));
        }
    }

    #[test]
    fn sinusoidal_oscillates_rather_than_growing() {
        let s = Sinusoidal::new();
        // Two points half a period apart land on opposite halves of the wave,
        // so the delay cannot be monotone in the attempt count.
        let period = 2 * s.oscillation;
        let first: Vec<_> = (0..period).map(|n| s.delay(n)).collect();
        let rising = first.windows(2).all(|w| w[1] >= w[0]);
        assert!(!rising, "sinusoidal delays should not be monotone");
    }
}
