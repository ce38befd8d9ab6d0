use crate::hal::{PinError, PinId, PinIO};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_THRESHOLD: Duration = Duration::from_millis(50);

/// Time-based two-state debounce over a polled input pin.
///
/// A raw reading only becomes the stable `current_value` after it has been
/// observed uninterrupted for at least `threshold`. Any contrary reading
/// restarts the window.
#[derive(Debug, Clone)]
pub struct DebouncedInput {
    pin: PinId,
    current_value: bool,
    pending_value: bool,
    elapsed_since_change: Duration,
    threshold: Duration,
}

impl DebouncedInput {
    /// Starts settled on `initial`.
    pub fn new(pin: PinId, threshold: Duration, initial: bool) -> Self {
        Self {
            pin,
            current_value: initial,
            pending_value: initial,
            elapsed_since_change: Duration::ZERO,
            threshold,
        }
    }

    /// Starts settled on the pin's first raw reading, so a switch that is
    /// already closed at startup is not reported as a transition.
    pub fn from_pin<IO: PinIO + ?Sized>(
        io: &mut IO,
        pin: PinId,
        threshold: Duration,
    ) -> Result<Self, PinError> {
        let initial = io.read(pin)?;
        Ok(Self::new(pin, threshold, initial))
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn current_value(&self) -> bool {
        self.current_value
    }

    pub fn pending_value(&self) -> bool {
        self.pending_value
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Reads the pin once and advances the filter by `dt`.
    pub fn update<IO: PinIO + ?Sized>(&mut self, io: &mut IO, dt: Duration) -> Result<(), PinError> {
        let raw = io.read(self.pin)?;
        self.sample(raw, dt);
        Ok(())
    }

    /// Advances the filter with an already-read raw level.
    pub fn sample(&mut self, raw: bool, dt: Duration) {
        if raw != self.pending_value {
            self.pending_value = raw;
            self.elapsed_since_change = Duration::ZERO;
        } else {
            self.elapsed_since_change = self.elapsed_since_change.saturating_add(dt);
        }

        if self.elapsed_since_change >= self.threshold && self.pending_value != self.current_value
        {
            self.current_value = self.pending_value;
        }
    }

    /// Runs exactly one `update` and reports whether the stable value moved.
    ///
    /// This advances the filter's timer, so it must be the only call per
    /// tick for a given input.
    pub fn has_changed<IO: PinIO + ?Sized>(
        &mut self,
        io: &mut IO,
        dt: Duration,
    ) -> Result<bool, PinError> {
        let before = self.current_value;
        self.update(io, dt)?;
        Ok(self.current_value != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::SimulatedPins;

    const PIN: PinId = PinId(14);
    const TICK: Duration = Duration::from_millis(10);

    fn input() -> DebouncedInput {
        DebouncedInput::new(PIN, DEFAULT_DEBOUNCE_THRESHOLD, false)
    }

    #[test]
    fn commits_after_threshold() {
        let mut db = input();
        db.sample(true, TICK);
        assert!(!db.current_value());
        assert!(db.pending_value());

        for _ in 0..4 {
            db.sample(true, TICK);
            assert!(!db.current_value());
        }
        db.sample(true, TICK);
        assert!(db.current_value());
    }

    #[test]
    fn contrary_reading_restarts_window() {
        let mut db = input();
        db.sample(true, TICK);
        for _ in 0..4 {
            db.sample(true, TICK);
        }
        db.sample(false, TICK);
        db.sample(true, TICK);
        for _ in 0..4 {
            db.sample(true, TICK);
        }
        assert!(!db.current_value());
        db.sample(true, TICK);
        assert!(db.current_value());
    }

    #[test]
    fn zero_delta_does_not_advance_timer() {
        let mut db = input();
        db.sample(true, TICK);
        for _ in 0..100 {
            db.sample(true, Duration::ZERO);
        }
        assert!(!db.current_value());
    }

    #[test]
    fn first_reading_seeds_initial_value() {
        let mut pins = SimulatedPins::new().with_input(PIN, true);
        let mut db = DebouncedInput::from_pin(&mut pins, PIN, DEFAULT_DEBOUNCE_THRESHOLD).unwrap();
        assert!(db.current_value());
        assert!(!db.has_changed(&mut pins, Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn repeated_call_does_not_double_count() {
        let mut pins = SimulatedPins::new().with_input(PIN, false);
        let mut db = input();

        pins.set_input(PIN, true);
        assert!(!db.has_changed(&mut pins, TICK).unwrap());
        assert!(db.has_changed(&mut pins, Duration::from_millis(60)).unwrap());
        assert!(!db.has_changed(&mut pins, Duration::ZERO).unwrap());
    }

    #[test]
    fn read_failure_leaves_state_untouched() {
        let mut pins = SimulatedPins::new();
        let mut db = input();
        db.sample(true, TICK);

        let err = db.update(&mut pins, TICK).unwrap_err();
        assert_eq!(err, PinError::NotAnInput(PIN));
        assert!(db.pending_value());
        assert!(!db.current_value());
    }
}
