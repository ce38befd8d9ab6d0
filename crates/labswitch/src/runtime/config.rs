use std::path::PathBuf;
use std::time::Duration;
use switch_core::{LoopConfig, PinId};
use switch_io::{HttpConfig, MqttConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option `{0}` (see --help)")]
    UnknownFlag(String),

    #[error("option `{0}` needs a value")]
    MissingValue(String),

    #[error("invalid value `{value}` for `{flag}`")]
    InvalidValue { flag: String, value: String },

    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierKind {
    #[default]
    Mqtt,
    Http,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinBias {
    #[default]
    Floating,
    PullUp,
    PullDown,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub journal_path: Option<PathBuf>,
    pub simulate: bool,
    pub simulate_toggle_secs: Option<u64>,
    pub notifier: NotifierKind,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_poll_topic: String,
    pub mqtt_status_topic: String,
    pub mqtt_connect_timeout_secs: u64,
    pub http_base_url: String,
    pub checks_per_second: u32,
    pub debounce_ms: u64,
    pub buzz_ms: u64,
    pub switch_pin: u8,
    pub ack_pin: Option<u8>,
    pub buzzer_pin: u8,
    pub pin_bias: PinBias,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mqtt = MqttConfig::default();
        Self {
            show_help: false,
            run_seconds: None,
            json_logs: false,
            log_file: Some(PathBuf::from("/var/log/labnet_mainswitch.log")),
            metrics_addr: None,
            journal_path: None,
            simulate: false,
            simulate_toggle_secs: None,
            notifier: NotifierKind::Mqtt,
            mqtt_host: mqtt.host,
            mqtt_port: mqtt.port,
            mqtt_poll_topic: mqtt.poll_topic,
            mqtt_status_topic: mqtt.status_topic,
            mqtt_connect_timeout_secs: mqtt.connect_timeout.as_secs(),
            http_base_url: HttpConfig::default().base_url,
            checks_per_second: 60,
            debounce_ms: 50,
            buzz_ms: 2000,
            switch_pin: 14,
            ack_pin: Some(15),
            buzzer_pin: 18,
            pin_bias: PinBias::Floating,
        }
    }
}

fn value<'a>(args: &'a [String], i: usize) -> Result<&'a str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(args[i].clone()))
}

fn parsed<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, ConfigError> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag: args[i].clone(),
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    cfg.run_seconds = Some(parsed(args, i)?);
                    i += 1;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-file" => {
                    cfg.log_file = Some(PathBuf::from(value(args, i)?));
                    i += 1;
                }
                "--no-log-file" => {
                    cfg.log_file = None;
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, i)?.to_string());
                    i += 1;
                }
                "--journal" => {
                    cfg.journal_path = Some(PathBuf::from(value(args, i)?));
                    i += 1;
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--simulate-toggle-secs" => {
                    cfg.simulate = true;
                    cfg.simulate_toggle_secs = Some(parsed(args, i)?);
                    i += 1;
                }
                "--notifier" => {
                    cfg.notifier = match value(args, i)? {
                        "mqtt" => NotifierKind::Mqtt,
                        "http" => NotifierKind::Http,
                        "none" => NotifierKind::None,
                        other => {
                            return Err(ConfigError::InvalidValue {
                                flag: args[i].clone(),
                                value: other.to_string(),
                            })
                        }
                    };
                    i += 1;
                }
                "--mqtt-host" => {
                    cfg.mqtt_host = value(args, i)?.to_string();
                    i += 1;
                }
                "--mqtt-port" => {
                    cfg.mqtt_port = parsed(args, i)?;
                    i += 1;
                }
                "--poll-topic" => {
                    cfg.mqtt_poll_topic = value(args, i)?.to_string();
                    i += 1;
                }
                "--status-topic" => {
                    cfg.mqtt_status_topic = value(args, i)?.to_string();
                    i += 1;
                }
                "--mqtt-connect-timeout" => {
                    cfg.mqtt_connect_timeout_secs = parsed(args, i)?;
                    i += 1;
                }
                "--http-base-url" => {
                    cfg.http_base_url = value(args, i)?.to_string();
                    i += 1;
                }
                "--rate" => {
                    cfg.checks_per_second = parsed(args, i)?;
                    i += 1;
                }
                "--debounce-ms" => {
                    cfg.debounce_ms = parsed(args, i)?;
                    i += 1;
                }
                "--buzz-ms" => {
                    cfg.buzz_ms = parsed(args, i)?;
                    i += 1;
                }
                "--switch-pin" => {
                    cfg.switch_pin = parsed(args, i)?;
                    i += 1;
                }
                "--ack-pin" => {
                    cfg.ack_pin = Some(parsed(args, i)?);
                    i += 1;
                }
                "--no-ack-switch" => {
                    cfg.ack_pin = None;
                }
                "--buzzer-pin" => {
                    cfg.buzzer_pin = parsed(args, i)?;
                    i += 1;
                }
                "--pin-bias" => {
                    cfg.pin_bias = match value(args, i)? {
                        "floating" => PinBias::Floating,
                        "up" => PinBias::PullUp,
                        "down" => PinBias::PullDown,
                        other => {
                            return Err(ConfigError::InvalidValue {
                                flag: args[i].clone(),
                                value: other.to_string(),
                            })
                        }
                    };
                    i += 1;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checks_per_second == 0 {
            return Err(ConfigError::Invalid("--rate must be at least 1"));
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("--debounce-ms must be at least 1"));
        }
        let mut pins = vec![self.switch_pin, self.buzzer_pin];
        pins.extend(self.ack_pin);
        pins.sort_unstable();
        pins.dedup();
        if pins.len() != 2 + usize::from(self.ack_pin.is_some()) {
            return Err(ConfigError::Invalid("switch, acknowledge and buzzer pins must differ"));
        }
        match self.notifier {
            NotifierKind::Mqtt => {
                if self.mqtt_host.is_empty() {
                    return Err(ConfigError::Invalid("--mqtt-host must not be empty"));
                }
                if self.mqtt_host.contains("://") {
                    return Err(ConfigError::Invalid(
                        "--mqtt-host takes a bare host name, not a URL",
                    ));
                }
                if self.mqtt_poll_topic.is_empty() || self.mqtt_status_topic.is_empty() {
                    return Err(ConfigError::Invalid("MQTT topics must not be empty"));
                }
            }
            NotifierKind::Http => {
                if !self.http_base_url.starts_with("http://")
                    && !self.http_base_url.starts_with("https://")
                {
                    return Err(ConfigError::Invalid("--http-base-url must be an http(s) URL"));
                }
            }
            NotifierKind::None => {}
        }
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            checks_per_second: self.checks_per_second,
            debounce_threshold: Duration::from_millis(self.debounce_ms),
            buzz_duration: Duration::from_millis(self.buzz_ms),
            switch_pin: PinId(self.switch_pin),
            ack_pin: self.ack_pin.map(PinId),
            buzzer_pin: PinId(self.buzzer_pin),
        }
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            poll_topic: self.mqtt_poll_topic.clone(),
            status_topic: self.mqtt_status_topic.clone(),
            connect_timeout: Duration::from_secs(self.mqtt_connect_timeout_secs),
            ..MqttConfig::default()
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.http_base_url.clone(),
            ..HttpConfig::default()
        }
    }

    pub fn print_help() {
        println!(
            r#"labswitch - Lab main switch monitor

USAGE:
    labswitch [OPTIONS]

OPTIONS:
    --notifier <KIND>           Where transitions go: mqtt | http | none [default: mqtt]
    --mqtt-host <HOST>          MQTT broker host [default: felicia.flka.space]
    --mqtt-port <PORT>          MQTT broker port [default: 1883]
    --poll-topic <TOPIC>        Topic answered with the current state [default: /FLKA/system/switch/poll]
    --status-topic <TOPIC>      Topic states are published to [default: /FLKA/system/switch/stat]
    --mqtt-connect-timeout <S>  Startup wait for the broker in seconds [default: 10]
    --http-base-url <URL>       Legacy lab API base URL [default: http://labnet.lab.flka.de]
    --rate <HZ>                 Polling rate [default: 60]
    --debounce-ms <MS>          Debounce threshold [default: 50]
    --buzz-ms <MS>              Buzzer duration after a transition [default: 2000]
    --switch-pin <BCM>          Main switch input [default: 14]
    --ack-pin <BCM>             Acknowledge switch input [default: 15]
    --no-ack-switch             Run without an acknowledge switch
    --buzzer-pin <BCM>          Buzzer output [default: 18]
    --pin-bias <MODE>           Input bias: floating | up | down [default: floating]
    --simulate                  Use simulated pins instead of GPIO
    --simulate-toggle-secs <S>  Flip the simulated main switch every S seconds
    --log-file <PATH>           Log file [default: /var/log/labnet_mainswitch.log]
    --no-log-file               Log to the console only
    --json-logs                 Output console logs in JSON format
    --metrics-addr <ADDR>       Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --journal <PATH>            Record switch events to a JSONL file
    --run-seconds <SECS>        Run for a fixed duration then exit
    -h, --help                  Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                    Set log filter (e.g., RUST_LOG=debug,switch_core=trace)

EXAMPLES:
    # Production run on the Pi (needs GPIO access)
    sudo labswitch --metrics-addr 0.0.0.0:9090

    # Legacy lab API instead of MQTT
    sudo labswitch --notifier http

    # Hardware-free smoke run
    labswitch --simulate --simulate-toggle-secs 2 --notifier none --no-log-file --run-seconds 10
"#
        );
    }
}
