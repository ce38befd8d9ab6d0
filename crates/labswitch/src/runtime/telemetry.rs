use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use switch_core::{StatusSnapshot, SwitchStatus};
use switch_io::metrics::{
    init_metrics, serve_metrics, ACKNOWLEDGMENTS, SWITCH_ON, TICKS, TICK_OVERRUNS, TRANSITIONS,
};
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Converts successive status snapshots into counter increments.
#[derive(Debug, Default)]
struct StatusMirror {
    last: StatusSnapshot,
}

impl StatusMirror {
    fn apply(&mut self, snapshot: StatusSnapshot) {
        SWITCH_ON.set(if snapshot.switch_on { 1.0 } else { 0.0 });
        TICKS.inc_by(snapshot.ticks.saturating_sub(self.last.ticks));
        TRANSITIONS.inc_by(snapshot.transitions.saturating_sub(self.last.transitions));
        ACKNOWLEDGMENTS.inc_by(
            snapshot
                .acknowledgments
                .saturating_sub(self.last.acknowledgments),
        );
        TICK_OVERRUNS.inc_by(snapshot.overruns.saturating_sub(self.last.overruns));
        self.last = snapshot;
    }
}

pub fn start_status_mirror(
    status: Arc<SwitchStatus>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut mirror = StatusMirror::default();
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            mirror.apply(status.snapshot());
            thread::sleep(Duration::from_millis(200));
        }
        mirror.apply(status.snapshot());
    })
}
