//! Append-only backup writer
//!
//! A plain-text safety net beside the durable store: one JSON line per
//! event, one file per (instrument, event kind), written by a dedicated
//! worker thread so the hot path only enqueues. The files are for humans
//! and ad-hoc tooling; they are not read back and the writer does not
//! participate in replay.

use crate::writer::{Writer, WriterError, WriterEvent};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tracing::{error, warn};
use types::{InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade};

enum Command {
    Event(WriterEvent),
    Shutdown,
}

/// Line-oriented journal of every event, one file per instrument and kind.
pub struct BackupWriter {
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackupWriter {
    /// Create the backup directory and start the worker thread.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            WriterError::Store(crate::store::StoreError::Io(e))
        })?;

        let (tx, rx) = mpsc::channel();
        let worker = std::thread::spawn(move || worker_loop(rx, dir));
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn enqueue(&self, event: WriterEvent) -> Result<(), WriterError> {
        self.tx
            .send(Command::Event(event))
            .map_err(|_| WriterError::QueueClosed)
    }
}

impl Writer for BackupWriter {
    fn create_instrument(&self, record: &InstrumentRecord) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Instrument {
            record: record.clone(),
        })
    }

    fn record_order(&self, order: &Order) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Order {
            order: order.clone(),
        })
    }

    fn record_trade(&self, trade: &Trade) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Trade {
            trade: trade.clone(),
        })
    }

    fn record_cancel(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
        timestamp: i64,
    ) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Cancel {
            instrument_id,
            order_id,
            party_id,
            timestamp,
        })
    }

    fn upsert_live_order(&self, order: &Order) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::UpsertLive {
            order: order.clone(),
        })
    }

    fn remove_live_order(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::RemoveLive {
            instrument_id,
            order_id,
        })
    }

    fn update_order_quantity(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    ) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::UpdateLive {
            instrument_id,
            order_id,
            filled_quantity,
            remaining_quantity,
        })
    }

    fn shutdown(&self) {
        let handle = self.worker.lock().expect("worker lock").take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                error!("backup worker panicked during shutdown");
            }
        }
    }
}

impl Drop for BackupWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// File name for one (instrument, kind) stream. Live projection events
/// share a single file per instrument.
fn file_name(event: &WriterEvent) -> String {
    let suffix = match event.instrument_id() {
        Some(id) => id.as_u64().to_string(),
        None => "global".to_string(),
    };
    match event {
        WriterEvent::Instrument { .. } => "instruments.jsonl".to_string(),
        WriterEvent::Order { .. } => format!("orders_{}.jsonl", suffix),
        WriterEvent::Trade { .. } => format!("trades_{}.jsonl", suffix),
        WriterEvent::Cancel { .. } => format!("cancels_{}.jsonl", suffix),
        WriterEvent::UpsertLive { .. }
        | WriterEvent::RemoveLive { .. }
        | WriterEvent::UpdateLive { .. } => format!("live_events_{}.jsonl", suffix),
    }
}

fn worker_loop(rx: Receiver<Command>, dir: PathBuf) {
    let mut files: HashMap<String, BufWriter<File>> = HashMap::new();

    while let Ok(command) = rx.recv() {
        match command {
            Command::Event(event) => {
                let name = file_name(&event);
                let line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(kind = event.kind(), error = %e, "backup event not serializable; dropped");
                        continue;
                    }
                };
                let writer = match files.entry(name.clone()) {
                    std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        match OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(dir.join(&name))
                        {
                            Ok(file) => entry.insert(BufWriter::new(file)),
                            Err(e) => {
                                warn!(file = %name, error = %e, "backup file open failed; event dropped");
                                continue;
                            }
                        }
                    }
                };
                if let Err(e) = writeln!(writer, "{}", line) {
                    warn!(file = %name, error = %e, "backup append failed; event dropped");
                    continue;
                }
                if let Err(e) = writer.flush() {
                    warn!(file = %name, error = %e, "backup flush failed");
                }
            }
            Command::Shutdown => break,
        }
    }

    for (name, mut writer) in files {
        if let Err(e) = writer.flush() {
            warn!(file = %name, error = %e, "backup flush failed during shutdown");
        }
    }
}
