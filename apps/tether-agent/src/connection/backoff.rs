use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_delay: Duration,
    /// Highest attempt number; the exponent stops growing here.
    pub cap: u32,
    /// Symmetric jitter as a fraction of the delay, clamped to `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(30),
            cap: 10,
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// `min(2^attempt s, max_delay)` before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.cap).min(63);
        Duration::from_secs(1u64 << exponent).min(self.max_delay)
    }

    /// Applies jitter to `base`. Never negative and never above `max_delay`.
    pub fn jittered<R: Rng>(&self, base: Duration, rng: &mut R) -> Duration {
        let spread = self.jitter.clamp(0.0, 1.0);
        if spread == 0.0 {
            return base;
        }
        let factor = 1.0 + rng.gen_range(-spread..=spread);
        base.mul_f64(factor.max(0.0)).min(self.max_delay)
    }
}

/// Failure counter owned by the connection manager.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempt: u32,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Records a cycle in which every endpoint failed and returns how long to
    /// wait before the next one.
    pub fn record_failure(&mut self) -> Duration {
        self.record_failure_with(&mut rand::thread_rng())
    }

    pub fn record_failure_with<R: Rng>(&mut self, rng: &mut R) -> Duration {
        self.attempt = self.attempt.saturating_add(1).min(self.policy.cap);
        let base = self.policy.base_delay(self.attempt);
        self.policy.jittered(base, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn base_delay_doubles_until_the_ceiling() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(4), Duration::from_secs(16));
        assert_eq!(policy.base_delay(5), Duration::from_secs(30));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));

        let mut previous = Duration::ZERO;
        for attempt in 0..=policy.cap {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn attempt_saturates_at_cap_and_resets() {
        let mut state = BackoffState::new(BackoffPolicy {
            cap: 3,
            ..BackoffPolicy::default()
        });
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            state.record_failure_with(&mut rng);
        }
        assert_eq!(state.attempt(), 3);
        state.reset();
        assert_eq!(state.attempt(), 0);
        state.record_failure_with(&mut rng);
        assert_eq!(state.attempt(), 1);
    }

    #[test]
    fn jitter_stays_within_twenty_percent_and_below_max() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..=policy.cap {
            let base = policy.base_delay(attempt);
            for _ in 0..200 {
                let delay = policy.jittered(base, &mut rng);
                assert!(delay >= base.mul_f64(0.8), "{delay:?} < 80% of {base:?}");
                assert!(delay <= base.mul_f64(1.2), "{delay:?} > 120% of {base:?}");
                assert!(delay <= policy.max_delay);
            }
        }
    }

    #[test]
    fn full_jitter_never_goes_negative() {
        let policy = BackoffPolicy {
            jitter: 5.0,
            ..BackoffPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let delay = policy.jittered(Duration::from_secs(4), &mut rng);
            assert!(delay <= Duration::from_secs(8));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let mut state = BackoffState::new(BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::default()
        });
        assert_eq!(state.record_failure(), Duration::from_secs(2));
        assert_eq!(state.record_failure(), Duration::from_secs(4));
    }
}
