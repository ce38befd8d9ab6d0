#[cfg(feature = "rpi")]
pub mod gpio;
pub mod http;
pub mod metrics;
pub mod mqtt;

#[cfg(feature = "rpi")]
pub use gpio::{GpioError, GpioPins, InputBias};
pub use http::{HttpConfig, HttpError, HttpNotifier};
pub use metrics::{init_metrics, serve_metrics};
pub use mqtt::{Backoff, MqttConfig, MqttError, MqttNotifier};
