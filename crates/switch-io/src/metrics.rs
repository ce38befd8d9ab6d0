//! Prometheus metrics for the lab switch daemon.
//!
//! The tick loop itself never touches these; the telemetry thread mirrors
//! `SwitchStatus` into them and the notifiers count their own traffic.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Switch Metrics
// ============================================================================

/// Stable main switch position (1=on, 0=off)
pub static SWITCH_ON: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("labswitch_switch_on", "Stable main switch position (1=on)").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Debounced main switch transitions
pub static TRANSITIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_transitions_total",
        "Debounced main switch transitions",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Acknowledge switch presses that silenced the buzzer
pub static ACKNOWLEDGMENTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_acknowledgments_total",
        "Acknowledge switch changes",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Loop Metrics
// ============================================================================

pub static TICKS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("labswitch_ticks_total", "Polling loop ticks executed").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Ticks whose processing exceeded the tick period
pub static TICK_OVERRUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_tick_overruns_total",
        "Ticks whose processing exceeded the tick period",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Transport Metrics
// ============================================================================

pub static PUBLISHES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_publishes_total",
        "State updates handed to the transport",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Failed publishes or HTTP calls
pub static TRANSPORT_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_transport_failures_total",
        "Failed MQTT publishes or lab API calls",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Poll requests received on the poll topic
pub static POLL_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labswitch_poll_requests_total",
        "Poll requests received from the broker",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Broker connection status (1=connected)
pub static BROKER_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("labswitch_broker_connected", "MQTT broker connection status").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Render the registry in the Prometheus text format.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Start the metrics HTTP server on the given address.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => match render() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        let _ = request.respond(response);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                    }
                },
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the polling loop has ticked
                    if TICKS.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = SWITCH_ON.get();
    let _ = TRANSITIONS.get();
    let _ = ACKNOWLEDGMENTS.get();
    let _ = TICKS.get();
    let _ = TICK_OVERRUNS.get();
    let _ = PUBLISHES.get();
    let _ = TRANSPORT_FAILURES.get();
    let _ = POLL_REQUESTS.get();
    let _ = BROKER_CONNECTED.get();
}
