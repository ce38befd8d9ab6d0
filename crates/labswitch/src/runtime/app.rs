use crate::infra::journal::{Journal, JournalEvent};
use crate::runtime::config::{ConfigError, NotifierKind, RuntimeConfig};
use crate::runtime::logging::{init_tracing, LoggingError};
use crate::runtime::telemetry;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;
use switch_core::{
    Notifier, NotifyError, NullNotifier, PinError, PinId, PinIO, SimulatedPins, SwitchLoop,
    SwitchState, SwitchStatus, TickOutcome,
};
use switch_io::mqtt;
use switch_io::{HttpError, HttpNotifier, MqttError, MqttNotifier};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[cfg(feature = "rpi")]
    #[error("GPIO setup failed: {0}")]
    Gpio(#[from] switch_io::GpioError),

    #[error("pin fault: {0}")]
    Pin(#[from] PinError),

    #[error("MQTT startup failed: {0}")]
    Mqtt(#[from] MqttError),

    #[error("lab API client setup failed: {0}")]
    Http(#[from] HttpError),

    #[error("cannot open journal {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("switch loop thread panicked")]
    LoopPanicked,
}

enum LabPins {
    Simulated(SimulatedPins),
    #[cfg(feature = "rpi")]
    Gpio(switch_io::GpioPins),
}

impl PinIO for LabPins {
    fn read(&mut self, pin: PinId) -> Result<bool, PinError> {
        match self {
            Self::Simulated(p) => p.read(pin),
            #[cfg(feature = "rpi")]
            Self::Gpio(p) => p.read(pin),
        }
    }

    fn write(&mut self, pin: PinId, level: bool) -> Result<(), PinError> {
        match self {
            Self::Simulated(p) => p.write(pin, level),
            #[cfg(feature = "rpi")]
            Self::Gpio(p) => p.write(pin, level),
        }
    }
}

enum LabNotifier {
    Mqtt(MqttNotifier),
    Http(HttpNotifier),
    Disabled(NullNotifier),
}

impl Notifier for LabNotifier {
    fn notify(&self, state: SwitchState) -> Result<(), NotifyError> {
        match self {
            Self::Mqtt(n) => n.notify(state),
            Self::Http(n) => n.notify(state),
            Self::Disabled(n) => n.notify(state),
        }
    }
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env()?;
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    // Dropped last so the file sink sees the final error.
    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref())?;

    let result = run_daemon(config);
    if let Err(ref e) = result {
        error!(error = %e, "labswitch terminated");
    }
    result
}

fn run_daemon(config: RuntimeConfig) -> Result<(), AppError> {
    config.validate()?;

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let journal = init_journal(config.journal_path.as_ref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("labswitch-net")
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    // Hardware first: a missing GPIO device is fatal before anything talks
    // to the network.
    let mut pins = open_pins(&config)?;
    let loop_config = config.loop_config();

    // Poll answers may start as soon as MQTT connects, before the loop exists.
    let status = Arc::new(SwitchStatus::from_pin(&mut pins, loop_config.switch_pin)?);
    let (notifier, mqtt_handle) = build_notifier(&config, &runtime, &status)?;

    info!(
        rate_hz = loop_config.checks_per_second,
        debounce_ms = loop_config.debounce_threshold.as_millis() as u64,
        buzz_ms = loop_config.buzz_duration.as_millis() as u64,
        switch_pin = %loop_config.switch_pin,
        "daemon started"
    );

    let mut switch_loop = SwitchLoop::new(pins, notifier, loop_config, Arc::clone(&status))?;
    info!(state = %switch_loop.state(), "Initial switch state");
    switch_loop.publish_initial_state();

    if let Some(ref journal) = journal {
        record(
            journal,
            JournalEvent::DaemonStarted,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "notifier": format!("{:?}", config.notifier).to_lowercase(),
                "simulated": config.simulate,
                "state": switch_loop.state().as_payload(),
            }),
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    install_stop_triggers(&runtime, &stop, config.run_seconds);
    let mirror_handle = telemetry::start_status_mirror(Arc::clone(&status), Arc::clone(&stop));

    let loop_stop = Arc::clone(&stop);
    let loop_journal = journal.clone();
    let loop_handle = thread::Builder::new()
        .name("switch-loop".into())
        .spawn(move || {
            switch_loop.run_with(&loop_stop, |outcome| {
                if let Some(ref journal) = loop_journal {
                    journal_outcome(journal, outcome);
                }
            })
        })
        .map_err(AppError::Runtime)?;

    let loop_result = loop_handle.join().map_err(|_| AppError::LoopPanicked)?;

    stop.store(true, Ordering::Relaxed);
    let _ = mirror_handle.join();

    if let Some(notifier) = mqtt_handle {
        notifier.disconnect();
    }
    runtime.shutdown_timeout(Duration::from_secs(1));

    let snapshot = status.snapshot();
    info!(
        ticks = snapshot.ticks,
        transitions = snapshot.transitions,
        acknowledgments = snapshot.acknowledgments,
        notify_failures = snapshot.notify_failures,
        overruns = snapshot.overruns,
        "daemon stopped"
    );
    if let Some(ref journal) = journal {
        record(
            journal,
            JournalEvent::DaemonStopped,
            serde_json::json!({
                "ticks": snapshot.ticks,
                "transitions": snapshot.transitions,
                "notify_failures": snapshot.notify_failures,
            }),
        );
    }

    loop_result.map_err(AppError::from)
}

fn open_pins(config: &RuntimeConfig) -> Result<LabPins, AppError> {
    let loop_config = config.loop_config();
    if config.simulate {
        let mut pins = SimulatedPins::new()
            .with_input(loop_config.switch_pin, false)
            .with_output(loop_config.buzzer_pin);
        if let Some(ack) = loop_config.ack_pin {
            pins = pins.with_input(ack, false);
        }
        if let Some(secs) = config.simulate_toggle_secs {
            pins = pins.with_toggle(loop_config.switch_pin, Duration::from_secs(secs));
        }
        info!("Using simulated pins");
        return Ok(LabPins::Simulated(pins));
    }

    #[cfg(feature = "rpi")]
    {
        use crate::runtime::config::PinBias;
        use switch_io::{GpioPins, InputBias};

        let bias = match config.pin_bias {
            PinBias::Floating => InputBias::Floating,
            PinBias::PullUp => InputBias::PullUp,
            PinBias::PullDown => InputBias::PullDown,
        };
        let mut inputs = vec![loop_config.switch_pin];
        inputs.extend(loop_config.ack_pin);
        let pins = GpioPins::open(&inputs, &[loop_config.buzzer_pin], bias)?;
        Ok(LabPins::Gpio(pins))
    }

    #[cfg(not(feature = "rpi"))]
    {
        Err(AppError::Config(ConfigError::Invalid(
            "built without GPIO support; run with --simulate",
        )))
    }
}

/// Returns the notifier for the loop plus a handle to disconnect MQTT at
/// shutdown.
fn build_notifier(
    config: &RuntimeConfig,
    runtime: &Runtime,
    status: &Arc<SwitchStatus>,
) -> Result<(LabNotifier, Option<MqttNotifier>), AppError> {
    match config.notifier {
        NotifierKind::Mqtt => {
            let (notifier, _task) =
                runtime.block_on(mqtt::connect(config.mqtt_config(), Arc::clone(status)))?;
            Ok((LabNotifier::Mqtt(notifier.clone()), Some(notifier)))
        }
        NotifierKind::Http => {
            info!(base_url = %config.http_base_url, "Using legacy lab API");
            let notifier = HttpNotifier::new(config.http_config(), runtime.handle().clone())?;
            Ok((LabNotifier::Http(notifier), None))
        }
        NotifierKind::None => {
            warn!("Notifications disabled; transitions are only logged");
            Ok((LabNotifier::Disabled(NullNotifier), None))
        }
    }
}

fn install_stop_triggers(runtime: &Runtime, stop: &Arc<AtomicBool>, run_seconds: Option<u64>) {
    let on_signal = Arc::clone(stop);
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            on_signal.store(true, Ordering::Relaxed);
        }
    });

    if let Some(seconds) = run_seconds {
        info!(seconds, "Running for limited duration");
        let on_timer = Arc::clone(stop);
        runtime.spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            on_timer.store(true, Ordering::Relaxed);
        });
    }
}

fn init_journal(path: Option<&PathBuf>) -> Result<Option<Arc<Journal>>, AppError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let journal = Journal::open(path).map_err(|source| AppError::Journal {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Switch journal enabled");
    Ok(Some(Arc::new(journal)))
}

fn journal_outcome(journal: &Journal, outcome: &TickOutcome) {
    if let Some(state) = outcome.transition {
        record(
            journal,
            JournalEvent::SwitchChanged,
            serde_json::json!({ "state": state.as_payload() }),
        );
        if outcome.notify_failed {
            record(
                journal,
                JournalEvent::NotifyFailed,
                serde_json::json!({ "state": state.as_payload() }),
            );
        }
    }
    if outcome.acknowledged {
        record(
            journal,
            JournalEvent::Acknowledged,
            serde_json::json!({ "buzzing": outcome.buzzing }),
        );
    }
}

fn record(journal: &Journal, event: JournalEvent, details: serde_json::Value) {
    if let Err(e) = journal.record(event, details) {
        warn!(error = %e, "Failed to write journal entry");
    }
}
