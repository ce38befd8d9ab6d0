use crate::hal::{PinError, PinId, PinIO};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Toggle {
    pin: PinId,
    every: Duration,
    last_flip: Instant,
}

/// In-memory pin bank for tests and hardware-less runs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPins {
    inputs: BTreeMap<PinId, bool>,
    outputs: BTreeMap<PinId, bool>,
    toggle: Option<Toggle>,
    reads: u64,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, pin: PinId, level: bool) -> Self {
        self.inputs.insert(pin, level);
        self
    }

    pub fn with_output(mut self, pin: PinId) -> Self {
        self.outputs.insert(pin, false);
        self
    }

    /// Flip `pin` every `every` of wall-clock time, checked lazily on read.
    pub fn with_toggle(mut self, pin: PinId, every: Duration) -> Self {
        self.toggle = Some(Toggle {
            pin,
            every,
            last_flip: Instant::now(),
        });
        self
    }

    pub fn set_input(&mut self, pin: PinId, level: bool) {
        self.inputs.insert(pin, level);
    }

    pub fn output(&self, pin: PinId) -> Option<bool> {
        self.outputs.get(&pin).copied()
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn apply_toggle(&mut self) {
        let Some(toggle) = self.toggle.as_mut() else {
            return;
        };
        if toggle.every.is_zero() || toggle.last_flip.elapsed() < toggle.every {
            return;
        }
        toggle.last_flip = Instant::now();
        if let Some(level) = self.inputs.get_mut(&toggle.pin) {
            *level = !*level;
            log::debug!("simulated {} flipped to {}", toggle.pin, level);
        }
    }
}

impl PinIO for SimulatedPins {
    fn read(&mut self, pin: PinId) -> Result<bool, PinError> {
        self.apply_toggle();
        self.reads += 1;
        self.inputs
            .get(&pin)
            .copied()
            .ok_or(PinError::NotAnInput(pin))
    }

    fn write(&mut self, pin: PinId, level: bool) -> Result<(), PinError> {
        match self.outputs.get_mut(&pin) {
            Some(slot) => {
                *slot = level;
                Ok(())
            }
            None => Err(PinError::NotAnOutput(pin)),
        }
    }
}
