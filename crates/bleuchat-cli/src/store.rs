//! Message history persisted as JSON lines
//!
//! Each accepted envelope is appended as one line. The file is rewritten with
//! only the newest entries once it grows past twice its capacity.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use bleuchat_core::{BleuchatError, BleuchatResult, MessageEnvelope, MessageStore};
use tracing::{debug, warn};

use crate::error::{CliError, Result};

const HISTORY_FILE_NAME: &str = "history.jsonl";

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    capacity: usize,
    /// Lines currently in the file
    line_count: usize,
}

impl JsonFileStore {
    /// Open or create `history.jsonl` under `data_dir`
    pub fn open(data_dir: &Path, capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(HISTORY_FILE_NAME);
        let line_count = if path.exists() {
            BufReader::new(File::open(&path)?).lines().count()
        } else {
            0
        };

        let mut store = Self {
            path,
            capacity: capacity.max(1),
            line_count,
        };
        if store.line_count > store.capacity * 2 {
            store.compact()?;
        }
        debug!(
            "Opened message history {} ({} entries)",
            store.path.display(),
            store.line_count
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<MessageEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut messages = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MessageEnvelope>(&line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping unreadable history line {}: {}", index + 1, e),
            }
        }
        Ok(messages)
    }

    /// Keep only the newest `capacity` entries
    pub fn compact(&mut self) -> Result<()> {
        let messages = self.read_all()?;
        let skip = messages.len().saturating_sub(self.capacity);

        let mut contents = String::new();
        for message in &messages[skip..] {
            contents.push_str(&serde_json::to_string(message)?);
            contents.push('\n');
        }
        let temp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &self.path)?;

        self.line_count = messages.len() - skip;
        debug!("Compacted message history to {} entries", self.line_count);
        Ok(())
    }
}

fn storage_error(err: CliError) -> BleuchatError {
    BleuchatError::Storage {
        reason: err.to_string(),
    }
}

impl MessageStore for JsonFileStore {
    fn append_message(&mut self, message: &MessageEnvelope) -> BleuchatResult<()> {
        let line = serde_json::to_string(message)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| storage_error(e.into()))?;
        writeln!(file, "{}", line).map_err(|e| storage_error(e.into()))?;

        self.line_count += 1;
        if self.line_count > self.capacity * 2 {
            self.compact().map_err(storage_error)?;
        }
        Ok(())
    }

    fn load_recent_messages(&self, limit: usize) -> BleuchatResult<Vec<MessageEnvelope>> {
        let mut recent: VecDeque<MessageEnvelope> = VecDeque::with_capacity(limit.min(1024));
        for message in self.read_all().map_err(storage_error)? {
            if recent.len() == limit {
                recent.pop_front();
            }
            if limit > 0 {
                recent.push_back(message);
            }
        }
        Ok(recent.into())
    }
}
