//! Raspberry Pi GPIO backend.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use std::collections::BTreeMap;
use switch_core::{PinError, PinId, PinIO};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO unavailable (missing /dev/gpiomem or insufficient privileges?): {0}")]
    Unavailable(#[source] rppal::gpio::Error),

    #[error("failed to acquire {pin}: {source}")]
    Pin {
        pin: PinId,
        #[source]
        source: rppal::gpio::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputBias {
    #[default]
    Floating,
    PullUp,
    PullDown,
}

/// Pins claimed from `/dev/gpiomem`, addressed by BCM number.
pub struct GpioPins {
    inputs: BTreeMap<PinId, InputPin>,
    outputs: BTreeMap<PinId, OutputPin>,
}

impl GpioPins {
    /// Claims every pin up front so later reads and writes cannot fail on
    /// ownership.
    pub fn open(inputs: &[PinId], outputs: &[PinId], bias: InputBias) -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(GpioError::Unavailable)?;

        let mut claimed_inputs = BTreeMap::new();
        for &pin in inputs {
            let raw = gpio.get(pin.0).map_err(|source| GpioError::Pin { pin, source })?;
            let input = match bias {
                InputBias::Floating => raw.into_input(),
                InputBias::PullUp => raw.into_input_pullup(),
                InputBias::PullDown => raw.into_input_pulldown(),
            };
            claimed_inputs.insert(pin, input);
        }

        let mut claimed_outputs = BTreeMap::new();
        for &pin in outputs {
            let raw = gpio.get(pin.0).map_err(|source| GpioError::Pin { pin, source })?;
            claimed_outputs.insert(pin, raw.into_output_low());
        }

        info!(
            inputs = ?inputs,
            outputs = ?outputs,
            bias = ?bias,
            "GPIO pins claimed"
        );

        Ok(Self {
            inputs: claimed_inputs,
            outputs: claimed_outputs,
        })
    }
}

impl PinIO for GpioPins {
    fn read(&mut self, pin: PinId) -> Result<bool, PinError> {
        self.inputs
            .get(&pin)
            .map(InputPin::is_high)
            .ok_or(PinError::NotAnInput(pin))
    }

    fn write(&mut self, pin: PinId, level: bool) -> Result<(), PinError> {
        let output = self.outputs.get_mut(&pin).ok_or(PinError::NotAnOutput(pin))?;
        if level {
            output.set_high();
        } else {
            output.set_low();
        }
        Ok(())
    }
}
