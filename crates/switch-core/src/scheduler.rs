use crate::buzzer::{Buzzer, DEFAULT_BUZZ_DURATION};
use crate::clock::{sleep_time, tick_period, TickClock};
use crate::debounce::{DebouncedInput, DEFAULT_DEBOUNCE_THRESHOLD};
use crate::hal::{PinError, PinId, PinIO};
use crate::notify::Notifier;
use crate::status::{SwitchState, SwitchStatus};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub checks_per_second: u32,
    pub debounce_threshold: Duration,
    pub buzz_duration: Duration,
    pub switch_pin: PinId,
    pub ack_pin: Option<PinId>,
    pub buzzer_pin: PinId,
}

impl LoopConfig {
    pub fn period(&self) -> Duration {
        tick_period(self.checks_per_second)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            checks_per_second: 60,
            debounce_threshold: DEFAULT_DEBOUNCE_THRESHOLD,
            buzz_duration: DEFAULT_BUZZ_DURATION,
            switch_pin: PinId(14),
            ack_pin: Some(PinId(15)),
            buzzer_pin: PinId(18),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub transition: Option<SwitchState>,
    pub notify_failed: bool,
    pub acknowledged: bool,
    pub buzzing: bool,
}

/// Fixed-rate polling loop driving the debounced inputs and the buzzer.
pub struct SwitchLoop<IO: PinIO, N: Notifier> {
    io: IO,
    notifier: N,
    config: LoopConfig,
    switch_input: DebouncedInput,
    ack_input: Option<DebouncedInput>,
    buzzer: Buzzer,
    clock: TickClock,
    status: Arc<SwitchStatus>,
}

impl<IO: PinIO, N: Notifier> SwitchLoop<IO, N> {
    /// Samples every input once to seed the debouncers and drives the buzzer
    /// low. Fails if any configured pin is unusable.
    ///
    /// `status` is shared with whoever answers poll requests; its state is
    /// overwritten with the sampled switch position.
    pub fn new(
        mut io: IO,
        notifier: N,
        config: LoopConfig,
        status: Arc<SwitchStatus>,
    ) -> Result<Self, PinError> {
        let switch_input =
            DebouncedInput::from_pin(&mut io, config.switch_pin, config.debounce_threshold)?;
        let ack_input = config
            .ack_pin
            .map(|pin| DebouncedInput::from_pin(&mut io, pin, config.debounce_threshold))
            .transpose()?;
        let mut buzzer = Buzzer::new(config.buzzer_pin, config.buzz_duration);
        buzzer.set_buzzing(&mut io, false)?;

        status.set_state(SwitchState::from(switch_input.current_value()));

        Ok(Self {
            io,
            notifier,
            config,
            switch_input,
            ack_input,
            buzzer,
            clock: TickClock::new(),
            status,
        })
    }

    pub fn status(&self) -> Arc<SwitchStatus> {
        Arc::clone(&self.status)
    }

    pub fn state(&self) -> SwitchState {
        SwitchState::from(self.switch_input.current_value())
    }

    pub fn buzzer(&self) -> &Buzzer {
        &self.buzzer
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Reports the current stable state without waiting for a transition.
    pub fn publish_initial_state(&self) {
        let state = self.state();
        if let Err(e) = self.notifier.notify(state) {
            warn!("initial state notification failed: {e}");
            self.status.record_notify_failure();
        }
    }

    /// One iteration of the loop body with an explicit delta.
    pub fn tick(&mut self, dt: Duration) -> Result<TickOutcome, PinError> {
        let mut outcome = TickOutcome::default();

        self.buzzer.update(&mut self.io, dt)?;

        if self.switch_input.has_changed(&mut self.io, dt)? {
            let state = SwitchState::from(self.switch_input.current_value());
            info!("main switch changed to {state}");
            self.status.record_transition(state);
            outcome.transition = Some(state);

            // Transport failures stay here; they never reach the pin state.
            if let Err(e) = self.notifier.notify(state) {
                warn!("switch notification failed: {e}");
                self.status.record_notify_failure();
                outcome.notify_failed = true;
            }

            self.buzzer.set_buzzing(&mut self.io, true)?;
        }

        if let Some(ack) = self.ack_input.as_mut() {
            if ack.has_changed(&mut self.io, dt)? {
                debug!("acknowledge switch changed, silencing buzzer");
                self.status.record_acknowledgment();
                outcome.acknowledged = true;
                self.buzzer.set_buzzing(&mut self.io, false)?;
            }
        }

        self.status.record_tick();
        outcome.buzzing = self.buzzer.is_buzzing();
        Ok(outcome)
    }

    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), PinError> {
        self.run_with(stop, |_| {})
    }

    /// Runs until `stop` is set, calling `observer` after every tick that
    /// did something.
    pub fn run_with<F>(&mut self, stop: &AtomicBool, mut observer: F) -> Result<(), PinError>
    where
        F: FnMut(&TickOutcome),
    {
        let period = self.config.period();
        info!(
            "switch loop running at {} Hz on {}",
            self.config.checks_per_second, self.config.switch_pin
        );

        while !stop.load(Ordering::Relaxed) {
            let tick_start = Instant::now();
            let dt = self.clock.tick(tick_start);

            let outcome = self.tick(dt)?;
            if outcome.transition.is_some() || outcome.acknowledged {
                observer(&outcome);
            }

            let elapsed = tick_start.elapsed();
            if elapsed > period {
                self.status.record_overrun();
            }
            std::thread::sleep(sleep_time(period, elapsed));
        }

        // Leave the buzzer silent on shutdown.
        self.buzzer.set_buzzing(&mut self.io, false)?;
        info!("switch loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::SimulatedPins;
    use crate::notify::{NotifyError, NullNotifier};
    use std::sync::Mutex;

    const SWITCH: PinId = PinId(14);
    const ACK: PinId = PinId(15);
    const BUZZER: PinId = PinId(18);

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<SwitchState>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, state: SwitchState) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(state);
            Ok(())
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn notify(&self, _state: SwitchState) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("broker gone".into()))
        }
    }

    fn pins() -> SimulatedPins {
        SimulatedPins::new()
            .with_input(SWITCH, false)
            .with_input(ACK, false)
            .with_output(BUZZER)
    }

    fn config() -> LoopConfig {
        LoopConfig {
            checks_per_second: 60,
            debounce_threshold: Duration::from_millis(50),
            buzz_duration: Duration::from_secs(2),
            switch_pin: SWITCH,
            ack_pin: Some(ACK),
            buzzer_pin: BUZZER,
        }
    }

    fn status() -> Arc<SwitchStatus> {
        Arc::new(SwitchStatus::default())
    }

    fn tick_60hz() -> Duration {
        tick_period(60)
    }

    #[test]
    fn switch_flip_publishes_once_when_stable_time_reaches_threshold() {
        let recorder = Arc::new(Recorder::default());
        let mut sl = SwitchLoop::new(pins(), Arc::clone(&recorder), config(), status()).unwrap();
        sl.io_mut().set_input(SWITCH, true);

        let dt = tick_60hz();
        let mut stable_for = Duration::ZERO;
        let mut first_tick = true;
        let mut held = Duration::ZERO;
        let mut transitions = 0;

        while held < Duration::from_millis(100) {
            let outcome = sl.tick(dt).unwrap();
            held += dt;
            // The tick that observes the new level restarts the window.
            if first_tick {
                first_tick = false;
            } else {
                stable_for += dt;
            }
            if let Some(state) = outcome.transition {
                transitions += 1;
                assert_eq!(state, SwitchState::On);
                assert!(stable_for >= Duration::from_millis(50));
                assert!(stable_for - dt < Duration::from_millis(50));
            }
        }

        assert_eq!(transitions, 1);
        assert_eq!(*recorder.sent.lock().unwrap(), vec![SwitchState::On]);
        assert_eq!(SwitchState::On.as_payload(), "ON");
        assert!(sl.buzzer().is_buzzing());
        assert_eq!(sl.io().output(BUZZER), Some(true));
        assert_eq!(sl.status().state(), SwitchState::On);
    }

    #[test]
    fn chatter_never_reaches_notifier() {
        let recorder = Arc::new(Recorder::default());
        let mut sl = SwitchLoop::new(pins(), Arc::clone(&recorder), config(), status()).unwrap();

        let mut level = false;
        for _ in 0..200 {
            level = !level;
            sl.io_mut().set_input(SWITCH, level);
            let outcome = sl.tick(Duration::from_millis(20)).unwrap();
            assert_eq!(outcome.transition, None);
        }
        assert!(recorder.sent.lock().unwrap().is_empty());
        assert!(!sl.buzzer().is_buzzing());
    }

    #[test]
    fn acknowledge_silences_buzzer_within_one_tick() {
        let mut sl = SwitchLoop::new(pins(), NullNotifier, config(), status()).unwrap();
        sl.io_mut().set_input(SWITCH, true);
        sl.tick(Duration::from_millis(10)).unwrap();
        let outcome = sl.tick(Duration::from_millis(60)).unwrap();
        assert!(outcome.buzzing);

        sl.io_mut().set_input(ACK, true);
        sl.tick(Duration::from_millis(10)).unwrap();
        let outcome = sl.tick(Duration::from_millis(60)).unwrap();
        assert!(outcome.acknowledged);
        assert!(!outcome.buzzing);
        assert_eq!(sl.io().output(BUZZER), Some(false));
    }

    #[test]
    fn buzzer_expires_without_acknowledgment() {
        let mut sl = SwitchLoop::new(pins(), NullNotifier, config(), status()).unwrap();
        sl.io_mut().set_input(SWITCH, true);
        sl.tick(Duration::ZERO).unwrap();
        assert!(sl.tick(Duration::from_millis(50)).unwrap().buzzing);

        let mut total = Duration::ZERO;
        while total < Duration::from_secs(2) {
            let outcome = sl.tick(Duration::from_millis(100)).unwrap();
            total += Duration::from_millis(100);
            assert_eq!(outcome.buzzing, total < Duration::from_secs(2));
        }
    }

    #[test]
    fn notify_failure_does_not_stop_the_loop() {
        let mut sl = SwitchLoop::new(pins(), Broken, config(), status()).unwrap();
        sl.io_mut().set_input(SWITCH, true);
        sl.tick(Duration::ZERO).unwrap();
        let outcome = sl.tick(Duration::from_millis(50)).unwrap();

        assert_eq!(outcome.transition, Some(SwitchState::On));
        assert!(outcome.notify_failed);
        assert!(outcome.buzzing);
        assert_eq!(sl.status().snapshot().notify_failures, 1);

        sl.io_mut().set_input(SWITCH, false);
        sl.tick(Duration::ZERO).unwrap();
        let outcome = sl.tick(Duration::from_millis(50)).unwrap();
        assert_eq!(outcome.transition, Some(SwitchState::Off));
    }

    #[test]
    fn missing_pin_fails_construction() {
        let io = SimulatedPins::new().with_input(SWITCH, false).with_output(BUZZER);
        let err = SwitchLoop::new(io, NullNotifier, config(), status()).err();
        assert_eq!(err, Some(PinError::NotAnInput(ACK)));
    }

    #[test]
    fn ack_pin_is_optional() {
        let io = SimulatedPins::new().with_input(SWITCH, true).with_output(BUZZER);
        let cfg = LoopConfig {
            ack_pin: None,
            ..config()
        };
        let mut sl = SwitchLoop::new(io, NullNotifier, cfg, status()).unwrap();
        assert_eq!(sl.state(), SwitchState::On);
        assert_eq!(sl.tick(Duration::from_secs(1)).unwrap(), TickOutcome::default());
    }

    #[test]
    fn initial_state_is_published_on_request() {
        let recorder = Arc::new(Recorder::default());
        let io = pins().with_input(SWITCH, true);
        let sl = SwitchLoop::new(io, Arc::clone(&recorder), config(), status()).unwrap();
        sl.publish_initial_state();
        assert_eq!(*recorder.sent.lock().unwrap(), vec![SwitchState::On]);
    }

    #[test]
    fn run_stops_when_flag_is_set() {
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = Arc::clone(&stop);
        let io = pins().with_toggle(SWITCH, Duration::from_millis(100));
        let mut sl = SwitchLoop::new(io, NullNotifier, config(), status()).unwrap();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            stopper.store(true, Ordering::Relaxed);
        });

        let mut seen = Vec::new();
        sl.run_with(&stop, |outcome| seen.push(*outcome)).unwrap();
        handle.join().unwrap();

        assert!(sl.status().snapshot().ticks > 0);
        assert!(seen.iter().all(|o| o.transition.is_some() || o.acknowledged));
        assert_eq!(sl.io().output(BUZZER), Some(false));
    }
}
