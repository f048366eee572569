//! Reconnection backoff
//!
//! The phone-side driver retries its outbound link after a uniformly random
//! pause, so a fleet of phones does not stampede an operator that just came
//! back.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Shortest pause between attempts
    pub min_backoff: Duration,
    /// Longest pause between attempts
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl ReconnectConfig {
    /// Draw the next pause, uniform over [min_backoff, max_backoff).
    pub fn backoff(&self) -> Duration {
        if self.max_backoff <= self.min_backoff {
            return self.min_backoff;
        }
        let spread = self.max_backoff - self.min_backoff;
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..spread);
        self.min_backoff + jitter
    }

    /// Sleep for one drawn backoff.
    pub async fn wait(&self) {
        let pause = self.backoff();
        debug!("waiting {}ms before reconnecting", pause.as_millis());
        sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_between_one_and_four_seconds() {
        let config = ReconnectConfig::default();
        for _ in 0..1000 {
            let pause = config.backoff();
            assert!(pause >= Duration::from_secs(1));
            assert!(pause < Duration::from_secs(4));
        }
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let config = ReconnectConfig {
            min_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(50),
        };
        assert_eq!(config.backoff(), Duration::from_millis(50));
    }
}
