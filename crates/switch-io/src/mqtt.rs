//! MQTT transport: publishes switch transitions and answers poll requests.

use crate::metrics::{BROKER_CONNECTED, POLL_REQUESTS, PUBLISHES, TRANSPORT_FAILURES};
use rumqttc::{AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use switch_core::{Notifier, NotifyError, SwitchState, SwitchStatus};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("broker {host}:{port} not reachable within {timeout:?}: {last_error}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
        last_error: String,
    },

    #[error("failed to subscribe to poll topic: {0}")]
    Subscribe(#[from] ClientError),
}

#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub poll_topic: String,
    pub status_topic: String,
    pub keep_alive: Duration,
    /// How long startup waits for the first ConnAck.
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Outbound request queue length; publishes beyond it are dropped.
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "felicia.flka.space".to_string(),
            port: 1883,
            client_id: format!("labswitch-{}", std::process::id()),
            poll_topic: "/FLKA/system/switch/poll".to_string(),
            status_topic: "/FLKA/system/switch/stat".to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            request_capacity: 32,
        }
    }
}

/// Exponential reconnect delay, reset whenever the broker accepts us.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Publishes transitions onto the client's request queue without waiting.
#[derive(Clone)]
pub struct MqttNotifier {
    client: AsyncClient,
    status_topic: String,
}

impl MqttNotifier {
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request dropped");
        }
    }
}

impl Notifier for MqttNotifier {
    fn notify(&self, state: SwitchState) -> Result<(), NotifyError> {
        match self.client.try_publish(
            self.status_topic.as_str(),
            QoS::AtMostOnce,
            false,
            state.as_payload(),
        ) {
            Ok(()) => {
                PUBLISHES.inc();
                debug!(topic = %self.status_topic, payload = state.as_payload(), "State queued");
                Ok(())
            }
            Err(ClientError::TryRequest(_)) => {
                TRANSPORT_FAILURES.inc();
                Err(NotifyError::Backlog)
            }
            Err(e) => {
                TRANSPORT_FAILURES.inc();
                Err(NotifyError::Transport(e.to_string()))
            }
        }
    }
}

/// Answers poll-topic messages with the current stable state.
///
/// Runs inside the event-loop task, so it must never wait on the request
/// queue: a full queue is only drained by that same task.
struct PollResponder {
    client: AsyncClient,
    poll_topic: String,
    status_topic: String,
    status: Arc<SwitchStatus>,
}

impl PollResponder {
    /// Payload to send back for a message on `topic`, if it is a poll.
    fn poll_reply(&self, topic: &str) -> Option<&'static str> {
        (topic == self.poll_topic).then(|| self.status.state().as_payload())
    }

    fn answer(&self, payload: &'static str) {
        POLL_REQUESTS.inc();
        match self
            .client
            .try_publish(self.status_topic.as_str(), QoS::AtMostOnce, false, payload)
        {
            Ok(()) => {
                PUBLISHES.inc();
                info!(payload, "Answered poll request");
            }
            Err(e) => {
                TRANSPORT_FAILURES.inc();
                warn!(error = %e, "Poll answer dropped");
            }
        }
    }

    fn subscribe(&self) {
        if let Err(e) = self
            .client
            .try_subscribe(self.poll_topic.as_str(), QoS::AtMostOnce)
        {
            TRANSPORT_FAILURES.inc();
            warn!(error = %e, topic = %self.poll_topic, "Poll topic subscription failed");
        }
    }
}

/// Connects to the broker, waiting up to `connect_timeout` for the first
/// ConnAck, then hands the event loop to a background task that answers
/// polls and reconnects with exponential backoff.
///
/// Must be called from within a tokio runtime.
pub async fn connect(
    config: MqttConfig,
    status: Arc<SwitchStatus>,
) -> Result<(MqttNotifier, JoinHandle<()>), MqttError> {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive);

    let (client, mut eventloop) = AsyncClient::new(options, config.request_capacity);
    let mut backoff = Backoff::new(config.backoff_initial, config.backoff_max);

    info!(host = %config.host, port = config.port, "Connecting to MQTT broker");
    let mut last_error = String::from("no response");
    let connected = tokio::time::timeout(config.connect_timeout, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return,
                Ok(_) => {}
                Err(e) => {
                    last_error = e.to_string();
                    let delay = backoff.next_delay();
                    debug!(error = %e, retry_in = ?delay, "Initial MQTT connect failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
    .await;

    if connected.is_err() {
        return Err(MqttError::ConnectTimeout {
            host: config.host,
            port: config.port,
            timeout: config.connect_timeout,
            last_error,
        });
    }

    BROKER_CONNECTED.set(1.0);
    info!(host = %config.host, port = config.port, "Connected to MQTT broker");
    client
        .subscribe(config.poll_topic.as_str(), QoS::AtMostOnce)
        .await?;
    backoff.reset();

    let responder = PollResponder {
        client: client.clone(),
        poll_topic: config.poll_topic.clone(),
        status_topic: config.status_topic.clone(),
        status,
    };
    let task = tokio::spawn(drive(eventloop, responder, backoff));

    Ok((
        MqttNotifier {
            client,
            status_topic: config.status_topic,
        },
        task,
    ))
}

async fn drive(mut eventloop: EventLoop, responder: PollResponder, mut backoff: Backoff) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                BROKER_CONNECTED.set(1.0);
                backoff.reset();
                info!("Reconnected to MQTT broker");
                responder.subscribe();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Some(payload) = responder.poll_reply(&publish.topic) {
                    debug!(topic = %publish.topic, "Poll request received");
                    responder.answer(payload);
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                info!("MQTT client disconnecting");
                BROKER_CONNECTED.set(0.0);
                return;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                BROKER_CONNECTED.set(0.0);
                return;
            }
            Err(e) => {
                BROKER_CONNECTED.set(0.0);
                let delay = backoff.next_delay();
                warn!(error = %e, retry_in = ?delay, "MQTT connection lost");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn backoff_reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn defaults_use_lab_topics() {
        let config = MqttConfig::default();
        assert_eq!(config.poll_topic, "/FLKA/system/switch/poll");
        assert_eq!(config.status_topic, "/FLKA/system/switch/stat");
        assert_eq!(config.port, 1883);
        assert!(!config.host.contains("://"));
    }

    #[test]
    fn notifier_queues_until_capacity() {
        let options = MqttOptions::new("test", "localhost", 1883);
        // The event loop is never polled, so nothing drains the queue.
        let (client, _eventloop) = AsyncClient::new(options, 2);
        let notifier = MqttNotifier {
            client,
            status_topic: "/FLKA/system/switch/stat".to_string(),
        };

        assert!(notifier.notify(SwitchState::On).is_ok());
        assert!(notifier.notify(SwitchState::Off).is_ok());
        assert!(matches!(
            notifier.notify(SwitchState::On),
            Err(NotifyError::Backlog)
        ));
    }

    fn responder(client: AsyncClient, status: Arc<SwitchStatus>) -> PollResponder {
        PollResponder {
            client,
            poll_topic: "/FLKA/system/switch/poll".to_string(),
            status_topic: "/FLKA/system/switch/stat".to_string(),
            status,
        }
    }

    #[test]
    fn poll_reply_follows_live_status() {
        use switch_core::{LoopConfig, NullNotifier, PinId, SimulatedPins, SwitchLoop};

        let config = LoopConfig {
            ack_pin: None,
            ..LoopConfig::default()
        };
        let pins = SimulatedPins::new()
            .with_input(config.switch_pin, false)
            .with_output(config.buzzer_pin);
        let status = Arc::new(SwitchStatus::new(SwitchState::Off));
        let mut switch_loop =
            SwitchLoop::new(pins, NullNotifier, config, Arc::clone(&status)).unwrap();

        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 4);
        let responder = responder(client, status);

        assert_eq!(responder.poll_reply("/FLKA/system/switch/poll"), Some("OFF"));

        switch_loop.io_mut().set_input(PinId(14), true);
        for _ in 0..4 {
            switch_loop.tick(Duration::from_millis(20)).unwrap();
        }
        assert_eq!(responder.poll_reply("/FLKA/system/switch/poll"), Some("ON"));

        assert_eq!(responder.poll_reply("/FLKA/system/switch/stat"), None);
        assert_eq!(responder.poll_reply("/FLKA/other"), None);
    }

    #[test]
    fn answer_is_queued_on_status_topic() {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 2);
        let responder = responder(
            client.clone(),
            Arc::new(SwitchStatus::new(SwitchState::On)),
        );
        let notifier = MqttNotifier {
            client,
            status_topic: "/FLKA/system/switch/stat".to_string(),
        };

        let answered_before = POLL_REQUESTS.get();
        responder.answer("ON");
        assert!(POLL_REQUESTS.get() > answered_before);

        // The answer took one of the two queue slots.
        assert!(notifier.notify(SwitchState::On).is_ok());
        assert!(matches!(
            notifier.notify(SwitchState::Off),
            Err(NotifyError::Backlog)
        ));
    }

    #[tokio::test]
    async fn full_queue_never_stalls_the_event_loop_task() {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 2);
        let notifier = MqttNotifier {
            client: client.clone(),
            status_topic: "/FLKA/system/switch/stat".to_string(),
        };
        while notifier.notify(SwitchState::On).is_ok() {}

        let responder = responder(client, Arc::new(SwitchStatus::new(SwitchState::Off)));
        let failures_before = TRANSPORT_FAILURES.get();
        let handled = tokio::time::timeout(Duration::from_secs(2), async {
            responder.subscribe();
            if let Some(payload) = responder.poll_reply("/FLKA/system/switch/poll") {
                responder.answer(payload);
            }
        })
        .await;

        assert!(handled.is_ok());
        assert!(TRANSPORT_FAILURES.get() >= failures_before + 2);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_startup() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(300),
            backoff_initial: Duration::from_millis(50),
            ..MqttConfig::default()
        };
        let status = Arc::new(SwitchStatus::new(SwitchState::Off));
        let err = connect(config, status).await.err();
        assert!(matches!(err, Some(MqttError::ConnectTimeout { port: 1, .. })));
    }
}
