pub mod buzzer;
pub mod clock;
pub mod debounce;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod notify;
pub mod scheduler;
pub mod status;

pub use buzzer::Buzzer;
pub use clock::TickClock;
pub use debounce::DebouncedInput;
pub use hal::{PinError, PinId, PinIO};
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::SimulatedPins;
pub use notify::{Notifier, NotifyError, NullNotifier};
pub use scheduler::{LoopConfig, SwitchLoop, TickOutcome};
pub use status::{StatusSnapshot, SwitchState, SwitchStatus};
