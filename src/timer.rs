use std::time::Duration;

use crate::SeededRng;

// In seconds.
const JITTER_RANGE: f32 = 0.5;

/// Retransmission timeout for a flight.
///
/// Starts at `start_rto`, doubles on every attempt up to `max_rto`, and
/// allows `retries` attempts before giving up.
#[derive(Debug)]
pub struct ExponentialBackoff {
    start_rto: Duration,
    max_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(
        start_rto: Duration,
        max_rto: Duration,
        retries: usize,
        rng: &mut SeededRng,
    ) -> Self {
        Self {
            start_rto,
            max_rto,
            retries,
            rto: start_rto,
            jitter: Self::jitter(rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.jitter = Self::jitter(rng);
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        let rto = if self.jitter < 0.0 {
            self.rto
                .saturating_sub(Duration::from_secs_f32(self.jitter.abs()))
        } else {
            self.rto + Duration::from_secs_f32(self.jitter)
        };
        rto.max(Duration::from_millis(50))
    }

    // A value between -0.25s and 0.25s
    fn jitter(rng: &mut SeededRng) -> f32 {
        rng.gen::<f32>() * JITTER_RANGE - (JITTER_RANGE / 2.0)
    }

    pub fn attempt(&mut self, rng: &mut SeededRng) {
        let Some(left) = self.left.checked_sub(1) else {
            return;
        };

        self.left = left;
        self.jitter = Self::jitter(rng);
        self.rto = (self.rto * 2).min(self.max_rto);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attempts_double_until_exhausted() {
        let mut rng = SeededRng::new(Some(42));
        let mut exp = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            3,
            &mut rng,
        );

        let n1 = exp.rto().as_millis();
        assert_eq!(exp.rto().as_millis(), n1, "rto is stable between attempts");

        exp.attempt(&mut rng);
        let n2 = exp.rto().as_millis();
        assert!(n2 > n1);
        assert!(exp.can_retry());

        exp.attempt(&mut rng);
        let n3 = exp.rto().as_millis();
        assert!(n3 > n2);
        assert!(exp.can_retry());

        exp.attempt(&mut rng);
        let n4 = exp.rto().as_millis();
        assert!(n4 > n3);
        assert!(!exp.can_retry());

        exp.attempt(&mut rng);
        assert_eq!(exp.rto().as_millis(), n4);
        assert!(!exp.can_retry());
    }

    #[test]
    fn rto_is_capped() {
        let mut rng = SeededRng::new(Some(1));
        let mut exp = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(3),
            10,
            &mut rng,
        );

        for _ in 0..6 {
            exp.attempt(&mut rng);
        }

        // 3s plus at most 0.25s jitter
        assert!(exp.rto() <= Duration::from_millis(3250));
        assert!(exp.rto() >= Duration::from_millis(2750));

        exp.reset(&mut rng);
        assert!(exp.rto() <= Duration::from_millis(1250));
    }
}
