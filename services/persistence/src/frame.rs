//! Framed append-only log files with checksums
//!
//! Every stream in the store is a file of length-prefixed frames:
//!
//! ```text
//! [payload_len: u32][payload: bincode bytes][checksum: u32]  // CRC32C over payload
//! ```
//!
//! Readers verify the checksum of every frame and treat a truncated or
//! corrupted tail as end-of-log, so a crash mid-append loses at most the
//! frame being written and the valid prefix replays cleanly.

use crc32c::crc32c;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Frames larger than this are assumed to be corruption, not data.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error at byte offset {offset}: {detail}")]
    Decode { offset: u64, detail: String },
}

/// Controls when `fsync` is called on an appender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Fsync after every append.
    EveryWrite,
    /// Fsync every N appends.
    EveryN(usize),
    /// Fsync only on explicit `sync` (close/shutdown).
    OnSync,
}

/// Append-only frame writer over one log file.
///
/// Appends are flushed to the OS on every write; durability to disk follows
/// the configured [`FsyncPolicy`].
pub struct FrameWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    fsync_policy: FsyncPolicy,
    writes_since_fsync: usize,
}

impl FrameWriter {
    /// Open the log for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>, fsync_policy: FsyncPolicy) -> Result<Self, FrameError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            fsync_policy,
            writes_since_fsync: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize one record and append it as a framed entry.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<(), FrameError> {
        let payload = bincode::serialize(record).map_err(|e| FrameError::Encode(e.to_string()))?;
        let checksum = crc32c(&payload);

        let mut buf = Vec::with_capacity(4 + payload.len() + 4);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&checksum.to_le_bytes());

        self.writer.write_all(&buf)?;
        self.writer.flush()?;

        self.writes_since_fsync += 1;
        let should_fsync = match self.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnSync => false,
        };
        if should_fsync {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    /// Flush and fsync outstanding appends.
    pub fn sync(&mut self) -> Result<(), FrameError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_fsync = 0;
        Ok(())
    }
}

/// Read every valid record from a framed log.
///
/// A missing file reads as empty. A truncated or checksum-failing tail ends
/// the read: the valid prefix is returned and the damage is logged.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FrameError> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    let mut pos: usize = 0;
    while pos < data.len() {
        if pos + 4 > data.len() {
            warn!(path = %path.display(), offset = pos, "truncated length prefix; keeping valid prefix");
            break;
        }
        let len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        if len > MAX_FRAME_LEN {
            warn!(path = %path.display(), offset = pos, len, "implausible frame length; keeping valid prefix");
            break;
        }
        let end = pos + 4 + len + 4;
        if end > data.len() {
            warn!(path = %path.display(), offset = pos, "truncated frame; keeping valid prefix");
            break;
        }

        let payload = &data[pos + 4..pos + 4 + len];
        let stored =
            u32::from_le_bytes([data[end - 4], data[end - 3], data[end - 2], data[end - 1]]);
        if crc32c(payload) != stored {
            warn!(path = %path.display(), offset = pos, "checksum mismatch; keeping valid prefix");
            break;
        }

        let record = bincode::deserialize(payload).map_err(|e| FrameError::Decode {
            offset: pos as u64,
            detail: e.to_string(),
        })?;
        records.push(record);
        pos = end;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        id: u64,
        label: String,
    }

    fn rec(id: u64) -> Rec {
        Rec {
            id,
            label: format!("rec-{}", id),
        }
    }

    #[test]
    fn test_append_and_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stream.log");

        let mut writer = FrameWriter::open(&path, FsyncPolicy::EveryWrite).unwrap();
        for id in 1..=20 {
            writer.append(&rec(id)).unwrap();
        }
        writer.sync().unwrap();

        let records: Vec<Rec> = read_records(&path).unwrap();
        assert_eq!(records.len(), 20);
        assert_eq!(records[0], rec(1));
        assert_eq!(records[19], rec(20));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let records: Vec<Rec> = read_records(&tmp.path().join("absent.log")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_truncated_tail_keeps_valid_prefix() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stream.log");

        let mut writer = FrameWriter::open(&path, FsyncPolicy::EveryWrite).unwrap();
        for id in 1..=5 {
            writer.append(&rec(id)).unwrap();
        }
        writer.sync().unwrap();
        drop(writer);

        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 3]).unwrap();

        let records: Vec<Rec> = read_records(&path).unwrap();
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn test_checksum_mismatch_ends_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stream.log");

        let mut writer = FrameWriter::open(&path, FsyncPolicy::EveryWrite).unwrap();
        for id in 1..=5 {
            writer.append(&rec(id)).unwrap();
        }
        writer.sync().unwrap();
        drop(writer);

        // Flip a byte inside the first frame's payload.
        let mut data = std::fs::read(&path).unwrap();
        data[6] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let records: Vec<Rec> = read_records(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_reopen_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stream.log");

        let mut writer = FrameWriter::open(&path, FsyncPolicy::EveryN(8)).unwrap();
        writer.append(&rec(1)).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let mut writer = FrameWriter::open(&path, FsyncPolicy::EveryN(8)).unwrap();
        writer.append(&rec(2)).unwrap();
        writer.sync().unwrap();

        let records: Vec<Rec> = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], rec(2));
    }
}
