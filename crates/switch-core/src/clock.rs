use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Produces per-tick deltas from monotonic timestamps.
///
/// The first tick yields `Duration::ZERO`, and a timestamp earlier than the
/// previous one (clock rollback) also yields zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickClock {
    last_check: Option<Instant>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.last_check.is_some()
    }

    pub fn tick(&mut self, now: Instant) -> Duration {
        let dt = match self.last_check {
            Some(prev) => now.checked_duration_since(prev).unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        self.last_check = Some(now);
        dt
    }
}

/// Tick period for a loop running at `checks_per_second`.
pub fn tick_period(checks_per_second: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(checks_per_second.max(1)))
}

/// Remaining sleep to hold the tick period; never negative.
pub fn sleep_time(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Wall-clock microseconds since the Unix epoch, for journals only.
pub fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
