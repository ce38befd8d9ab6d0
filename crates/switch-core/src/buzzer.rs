use crate::hal::{PinError, PinId, PinIO};
use std::time::Duration;

pub const DEFAULT_BUZZ_DURATION: Duration = Duration::from_secs(2);

/// Timed binary output: armed for a fixed duration, then switches itself off.
#[derive(Debug, Clone)]
pub struct Buzzer {
    pin: PinId,
    is_buzzing: bool,
    remaining: Duration,
    buzz_duration: Duration,
}

impl Buzzer {
    pub fn new(pin: PinId, buzz_duration: Duration) -> Self {
        Self {
            pin,
            is_buzzing: false,
            remaining: Duration::ZERO,
            buzz_duration,
        }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn is_buzzing(&self) -> bool {
        self.is_buzzing
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Arms (restarting the countdown) or disarms immediately.
    pub fn set_buzzing<IO: PinIO + ?Sized>(
        &mut self,
        io: &mut IO,
        active: bool,
    ) -> Result<(), PinError> {
        if active {
            self.is_buzzing = true;
            self.remaining = self.buzz_duration;
        } else {
            self.is_buzzing = false;
            self.remaining = Duration::ZERO;
        }
        io.write(self.pin, active)
    }

    pub fn update<IO: PinIO + ?Sized>(&mut self, io: &mut IO, dt: Duration) -> Result<(), PinError> {
        if !self.is_buzzing {
            return Ok(());
        }
        self.remaining = self.remaining.saturating_sub(dt);
        if self.remaining.is_zero() {
            self.set_buzzing(io, false)?;
        }
        Ok(())
    }
}
