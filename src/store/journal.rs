//! Append-only fragment transaction journal.
//!
//! Every committed repository transaction is appended as one length-prefixed
//! bincode record holding the transaction's row operations. Reopening the
//! journal replays all complete records in order; a torn record at the tail
//! (a crash mid-append) ends replay and is truncated away before new writes.

use crate::tuples::Fragment;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Length prefix size for one journal record.
const RECORD_HEADER_LEN: usize = 4;

/// A single row-level operation inside a committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalOp {
    /// A fragment row was inserted (id already assigned).
    Insert(Fragment),
    /// A fragment row was replaced with the given state.
    Update(Fragment),
    /// The fragment row with the given id was deleted.
    Remove(u64),
}

/// Append-only journal of committed fragment transactions.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Journal {
    /// Open (or create) the journal at `path` and replay its records.
    ///
    /// Returns the journal positioned for appending together with every
    /// complete transaction found on disk, oldest first.
    pub fn open(path: &Path) -> Result<(Self, Vec<Vec<JournalOp>>)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create journal directory {}", parent.display()))?;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read journal {}", path.display()))
            }
        };

        let (transactions, valid_len) = Self::parse(&bytes);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;
        if (valid_len as u64) < file.metadata()?.len() {
            // Drop the torn tail so the next append starts on a record boundary.
            file.set_len(valid_len as u64)
                .context("failed to truncate torn journal tail")?;
        }
        file.seek(SeekFrom::End(0))
            .context("failed to seek journal to end")?;

        let journal = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        };
        Ok((journal, transactions))
    }

    /// Decode complete records from `bytes`, returning them plus the byte
    /// length of the valid prefix.
    fn parse(bytes: &[u8]) -> (Vec<Vec<JournalOp>>, usize) {
        let mut transactions = Vec::new();
        let mut offset = 0usize;
        while bytes.len() - offset >= RECORD_HEADER_LEN {
            let mut header = [0u8; RECORD_HEADER_LEN];
            header.copy_from_slice(&bytes[offset..offset + RECORD_HEADER_LEN]);
            let record_len = u32::from_le_bytes(header) as usize;
            let body_start = offset + RECORD_HEADER_LEN;
            let Some(body_end) = body_start.checked_add(record_len) else {
                break;
            };
            if body_end > bytes.len() {
                break;
            }
            match bincode::deserialize::<Vec<JournalOp>>(&bytes[body_start..body_end]) {
                Ok(ops) => {
                    transactions.push(ops);
                    offset = body_end;
                }
                Err(_) => break,
            }
        }
        (transactions, offset)
    }

    /// Append one committed transaction and flush it to disk.
    pub fn append(&mut self, ops: &[JournalOp]) -> Result<()> {
        let body = bincode::serialize(ops).context("failed to serialize journal record")?;
        let header = (body.len() as u32).to_le_bytes();
        self.writer
            .write_all(&header)
            .and_then(|_| self.writer.write_all(&body))
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("failed to append to journal {}", self.path.display()))?;
        self.writer
            .get_ref()
            .sync_data()
            .with_context(|| format!("failed to sync journal {}", self.path.display()))?;
        Ok(())
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
