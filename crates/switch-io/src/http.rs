//! Legacy lab API transport: `GET {base}/api/lab/on|off` per transition.

use crate::metrics::{PUBLISHES, TRANSPORT_FAILURES};
use std::time::Duration;
use switch_core::{Notifier, NotifyError, SwitchState};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://labnet.lab.flka.de".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub fn transition_url(base_url: &str, state: SwitchState) -> String {
    let action = match state {
        SwitchState::On => "on",
        SwitchState::Off => "off",
    };
    format!("{}/api/lab/{}", base_url.trim_end_matches('/'), action)
}

/// Fires one request per transition on the runtime and returns at once;
/// the outcome is only logged.
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
}

impl HttpNotifier {
    pub fn new(config: HttpConfig, runtime: Handle) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            runtime,
        })
    }
}

impl Notifier for HttpNotifier {
    fn notify(&self, state: SwitchState) -> Result<(), NotifyError> {
        let url = transition_url(&self.base_url, state);
        let client = self.client.clone();
        PUBLISHES.inc();

        self.runtime.spawn(async move {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %url, status = %response.status(), "Lab API request succeeded");
                }
                Ok(response) => {
                    TRANSPORT_FAILURES.inc();
                    warn!(url = %url, status = %response.status(), "Lab API returned an error");
                }
                Err(e) => {
                    TRANSPORT_FAILURES.inc();
                    warn!(url = %url, error = %e, "Lab API request failed");
                }
            }
        });
        Ok(())
    }
}
