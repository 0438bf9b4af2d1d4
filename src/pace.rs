use rand::Rng;
use std::thread;
use std::time::Duration;
use tracing::trace;

/// Randomized human-like pauses between page interactions.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    enabled: bool,
}

impl Pacer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn delay(min_s: f64, max_s: f64) -> Duration {
        let secs = if max_s > min_s {
            rand::thread_rng().gen_range(min_s..max_s)
        } else {
            min_s
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn wait(&self, min_s: f64, max_s: f64) {
        if !self.enabled {
            return;
        }
        let delay = Self::delay(min_s, max_s);
        trace!("Sleeping for {:?}", delay);
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_delay_within_bounds() {
        for _ in 0..100 {
            let d = Pacer::delay(0.75, 2.0);
            assert!(d >= Duration::from_secs_f64(0.75) && d < Duration::from_secs_f64(2.0));
        }
        assert_eq!(Pacer::delay(3.0, 3.0), Duration::from_secs(3));
    }

    #[test]
    fn test_disabled_pacer_does_not_sleep() {
        let start = Instant::now();
        Pacer::disabled().wait(10.0, 20.0);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
