// Scheduler tunables
//
// Defaults match a 1ms alarm tick. Poll intervals are clamped to 1ms:
// a zero poll would re-queue a waiting `when` forever inside one drain.

use core::fmt;

/// Period of the alarm tick ISR (ms)
pub const TICK_MS: u32 = 1;

/// How often `when` / `whenever` re-check their condition (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 1;

/// Window over which `Stats::load` counts timer creations (ms)
pub const DEFAULT_LOAD_WINDOW_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub poll_interval_ms: u32,
    pub load_window_ms: u32,
}

impl Config {
    pub const DEFAULT: Config = Config {
        poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        load_window_ms: DEFAULT_LOAD_WINDOW_MS,
    };

    pub const fn new() -> Self {
        Self::DEFAULT
    }

    pub const fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = if ms == 0 { 1 } else { ms };
        self
    }

    pub const fn with_load_window_ms(mut self, ms: u32) -> Self {
        self.load_window_ms = if ms == 0 { 1 } else { ms };
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "poll={}ms load_window={}ms",
            self.poll_interval_ms, self.load_window_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval_ms, 1);
        assert_eq!(cfg.load_window_ms, 1000);
        assert_eq!(cfg, Config::new());
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let cfg = Config::new().with_poll_interval_ms(0).with_load_window_ms(0);
        assert_eq!(cfg.poll_interval_ms, 1);
        assert_eq!(cfg.load_window_ms, 1);
    }

    #[test]
    fn test_builder_and_display() {
        let cfg = Config::new().with_poll_interval_ms(5).with_load_window_ms(250);
        assert_eq!(format!("{}", cfg), "poll=5ms load_window=250ms");
    }
}
