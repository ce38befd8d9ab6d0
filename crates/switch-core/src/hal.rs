use std::fmt;
use thiserror::Error;

/// BCM GPIO number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u8);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("{0} is not configured as an input")]
    NotAnInput(PinId),

    #[error("{0} is not configured as an output")]
    NotAnOutput(PinId),

    #[error("hardware fault on {pin}: {reason}")]
    Hardware { pin: PinId, reason: String },
}

/// Digital pin capability used by the debounce and buzzer logic.
///
/// Backends acquire their pins up front; a `PinError` here means the pin
/// table is wrong or the hardware went away, and is treated as fatal by the
/// tick loop.
pub trait PinIO: Send {
    fn read(&mut self, pin: PinId) -> Result<bool, PinError>;
    fn write(&mut self, pin: PinId, level: bool) -> Result<(), PinError>;
}

impl<T: PinIO + ?Sized> PinIO for Box<T> {
    fn read(&mut self, pin: PinId) -> Result<bool, PinError> {
        (**self).read(pin)
    }

    fn write(&mut self, pin: PinId, level: bool) -> Result<(), PinError> {
        (**self).write(pin, level)
    }
}
