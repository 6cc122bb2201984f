//! Execution governor.
//!
//! Bounds how much work a hostile or runaway log stream can trigger. Every
//! policy drops instead of queueing: a refused request is simply gone.
//!
//! The governor is owned by one dispatch loop and mutated only from that
//! loop's task, so its state needs no locking. Separate dispatchers never
//! share a governor.

use crate::error::Rejection;
use crate::limits::ResourceLimits;
use std::time::{Duration, Instant};

/// Governor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Length of the rate window.
    ///
    /// Default: 1 second.
    pub window: Duration,

    /// Executions accepted per window.
    ///
    /// Default: 5.
    pub max_per_window: u32,

    /// Processes allowed in flight at once.
    ///
    /// Default: 4.
    pub max_concurrent: usize,

    /// Minimum gap between two accepted executions.
    ///
    /// Default: zero (disabled).
    pub min_interval: Duration,

    /// Per-process timeout and output cap.
    pub limits: ResourceLimits,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
            max_per_window: 5,
            max_concurrent: 4,
            min_interval: Duration::ZERO,
            limits: ResourceLimits::default(),
        }
    }
}

/// Counters behind the governor's decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernorState {
    /// Processes admitted and not yet reported finished.
    pub in_flight: usize,

    /// Start of the current rate window, if one has opened.
    pub window_start: Option<Instant>,

    /// Executions accepted in the current window.
    pub window_count: u32,

    /// When the last execution was accepted.
    pub last_accepted: Option<Instant>,
}

/// Admission control for spawns.
#[derive(Debug, Clone)]
pub struct Governor {
    config: GovernorConfig,
    state: GovernorState,
}

impl Governor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            state: GovernorState::default(),
        }
    }

    pub fn state(&self) -> &GovernorState {
        &self.state
    }

    /// Decide whether an execution may start at `now`.
    ///
    /// On success the execution is counted against every policy and the
    /// caller owes exactly one [`release`](Self::release) when the process
    /// is gone (or failed to start).
    ///
    /// # Errors
    ///
    /// - `ConcurrencyLimited` if `max_concurrent` processes are in flight
    /// - `TooSoon` if the last acceptance was under `min_interval` ago
    /// - `RateLimited` if the window's quota is used up
    pub fn try_admit(&mut self, now: Instant) -> Result<(), Rejection> {
        self.roll_window(now);

        if self.state.in_flight >= self.config.max_concurrent {
            return Err(Rejection::ConcurrencyLimited {
                max: self.config.max_concurrent,
            });
        }

        if let Some(last) = self.state.last_accepted {
            if now.saturating_duration_since(last) < self.config.min_interval {
                return Err(Rejection::TooSoon {
                    min_ms: self.config.min_interval.as_millis(),
                });
            }
        }

        if self.state.window_count >= self.config.max_per_window {
            return Err(Rejection::RateLimited {
                max: self.config.max_per_window,
                window_ms: self.config.window.as_millis(),
            });
        }

        self.state.window_start.get_or_insert(now);
        self.state.window_count += 1;
        self.state.last_accepted = Some(now);
        self.state.in_flight += 1;
        Ok(())
    }

    /// Record that an admitted process has finished.
    pub fn release(&mut self) {
        self.state.in_flight = self.state.in_flight.saturating_sub(1);
    }

    fn roll_window(&mut self, now: Instant) {
        if let Some(start) = self.state.window_start {
            if now.saturating_duration_since(start) >= self.config.window {
                self.state.window_start = None;
                self.state.window_count = 0;
            }
        }
    }
}
