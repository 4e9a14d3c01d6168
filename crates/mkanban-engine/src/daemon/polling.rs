use std::time::Duration;
use tracing::debug;

/// Decides how long the poller sleeps between ticks.
pub trait PollingStrategy: Send + Sync {
    fn interval(&self) -> Duration;
    /// A tick found work.
    fn on_activity(&mut self);
    /// A tick found nothing to do.
    fn on_idle(&mut self);
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct FixedInterval(pub Duration);

impl PollingStrategy for FixedInterval {
    fn interval(&self) -> Duration {
        self.0
    }

    fn on_activity(&mut self) {}

    fn on_idle(&mut self) {}

    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptivePollingConfig {
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Idle ticks tolerated before backing off.
    pub idle_threshold: u32,
    pub backoff_multiplier: f64,
}

impl Default for AdaptivePollingConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(5_000),
            max_interval: Duration::from_millis(15_000),
            idle_threshold: 60,
            backoff_multiplier: 1.5,
        }
    }
}

/// Polls at the base rate while busy and backs off geometrically, up to the
/// max, once enough consecutive ticks were idle.
#[derive(Debug, Clone)]
pub struct AdaptivePolling {
    config: AdaptivePollingConfig,
    current: Duration,
    idle_count: u32,
}

impl AdaptivePolling {
    pub fn new(config: AdaptivePollingConfig) -> Self {
        Self {
            current: config.base_interval,
            config,
            idle_count: 0,
        }
    }
}

impl Default for AdaptivePolling {
    fn default() -> Self {
        Self::new(AdaptivePollingConfig::default())
    }
}

impl PollingStrategy for AdaptivePolling {
    fn interval(&self) -> Duration {
        self.current
    }

    fn on_activity(&mut self) {
        self.reset();
    }

    fn on_idle(&mut self) {
        self.idle_count = self.idle_count.saturating_add(1);
        if self.idle_count < self.config.idle_threshold {
            return;
        }
        let next = self
            .current
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_interval);
        if next != self.current {
            debug!(from_ms = self.current.as_millis() as u64, to_ms = next.as_millis() as u64, "polling backoff");
            self.current = next;
        }
    }

    fn reset(&mut self) {
        self.idle_count = 0;
        self.current = self.config.base_interval;
    }
}
