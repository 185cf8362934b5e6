use std::time::Duration;

/// Poll cadence and shutdown grace of a camera supervisor.
///
/// The poll interval starts at `base` after every (re)start and grows by
/// `step` per tick until it reaches `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub base: Duration,
    pub step: Duration,
    pub max: Duration,
    /// How long each process gets to exit after a termination request.
    pub shutdown_grace: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            step: Duration::from_secs(1),
            max: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

impl PollSettings {
    /// Interval following `current`.
    pub fn next_timeout(&self, current: Duration) -> Duration {
        current.saturating_add(self.step).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_is_capped() {
        let settings = PollSettings::default();
        let mut timeout = settings.base;
        let mut seen = vec![timeout.as_secs()];
        for _ in 0..12 {
            timeout = settings.next_timeout(timeout);
            seen.push(timeout.as_secs());
        }
        assert_eq!(&seen[..10], &[2, 3, 4, 5, 6, 7, 8, 9, 10, 10]);
        assert_eq!(*seen.last().unwrap(), 10);
    }

    #[test]
    fn test_zero_step_keeps_interval() {
        let settings = PollSettings {
            step: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(settings.next_timeout(settings.base), settings.base);
    }
}
