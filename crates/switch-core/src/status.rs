use crate::hal::{PinError, PinId, PinIO};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Stable switch position as reported to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Wire encoding used for every publish, spontaneous or polled.
    pub const fn as_payload(self) -> &'static str {
        match self {
            SwitchState::On => "ON",
            SwitchState::Off => "OFF",
        }
    }

    pub const fn is_on(self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl From<bool> for SwitchState {
    fn from(level: bool) -> Self {
        if level {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub switch_on: bool,
    pub ticks: u64,
    pub transitions: u64,
    pub acknowledgments: u64,
    pub notify_failures: u64,
    pub overruns: u64,
}

/// Switch status shared between the tick loop and network/telemetry threads.
///
/// Only the tick loop writes; readers may observe fields from slightly
/// different ticks, which is fine for polling and metrics.
#[derive(Debug, Default)]
pub struct SwitchStatus {
    switch_on: AtomicBool,
    ticks: AtomicU64,
    transitions: AtomicU64,
    acknowledgments: AtomicU64,
    notify_failures: AtomicU64,
    overruns: AtomicU64,
}

impl SwitchStatus {
    pub fn new(initial: SwitchState) -> Self {
        let status = Self::default();
        status.switch_on.store(initial.is_on(), Ordering::Relaxed);
        status
    }

    /// Seeds the state from one raw reading, so readers that start before
    /// the tick loop see the real position.
    pub fn from_pin<IO: PinIO + ?Sized>(io: &mut IO, pin: PinId) -> Result<Self, PinError> {
        Ok(Self::new(SwitchState::from(io.read(pin)?)))
    }

    pub fn state(&self) -> SwitchState {
        SwitchState::from(self.switch_on.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            switch_on: self.switch_on.load(Ordering::Acquire),
            ticks: self.ticks.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            acknowledgments: self.acknowledgments.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_state(&self, state: SwitchState) {
        self.switch_on.store(state.is_on(), Ordering::Release);
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transition(&self, state: SwitchState) {
        self.set_state(state);
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acknowledgment(&self) {
        self.acknowledgments.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }
}
