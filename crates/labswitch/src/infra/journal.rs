//! Switch event journal.
//!
//! Appends one JSON object per line for every event that matters to the lab
//! (daemon start/stop, main switch transitions, acknowledgments), so the
//! history survives log rotation and can be replayed by scripts.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use switch_core::clock::unix_us;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    DaemonStarted,
    SwitchChanged,
    Acknowledged,
    NotifyFailed,
    DaemonStopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Microseconds since the journal was opened
    pub monotonic_us: u64,
    pub unix_us: u64,
    pub event: JournalEvent,
    pub details: serde_json::Value,
}

/// Thread-safe JSONL writer.
pub struct Journal {
    writer: Mutex<BufWriter<File>>,
    opened: Instant,
}

impl Journal {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
            opened: Instant::now(),
        })
    }

    pub fn append(&self, entry: &JournalEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("journal writer poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn record(&self, event: JournalEvent, details: serde_json::Value) -> io::Result<()> {
        self.append(&JournalEntry {
            monotonic_us: self.opened.elapsed().as_micros() as u64,
            unix_us: unix_us(),
            event,
            details,
        })
    }
}
