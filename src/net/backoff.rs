use std::time::Duration;

/// Exponential reconnect delay: `min(cap, base * 2^(attempt - 1))`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_exponent: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_exponent: 5,
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt
            .saturating_sub(1)
            .min(self.max_exponent)
            .min(31);
        self.base.saturating_mul(1_u32 << exponent).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        let backoff = Backoff::default();
        let delays = (1..=7)
            .map(|attempt| backoff.delay(attempt).as_secs())
            .collect::<Vec<_>>();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn attempt_zero_waits_the_base_delay() {
        assert_eq!(Backoff::default().delay(0), Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn never_shrinks_and_never_exceeds_the_cap(attempt in 0_u32..10_000, base_ms in 1_u64..5_000) {
            let backoff = Backoff {
                base: Duration::from_millis(base_ms),
                cap: Duration::from_secs(60),
                max_exponent: 40,
            };
            let current = backoff.delay(attempt);
            prop_assert!(current <= backoff.cap);
            prop_assert!(backoff.delay(attempt + 1) >= current);
        }
    }
}
