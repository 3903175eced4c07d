// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only JSONL session log. Appends are best-effort: a failed write
//! must never fail the verification response, so callers log and move on.

use clnp_core::session::SessionRecord;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("sessions.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SessionRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Reads every parseable record, skipping malformed lines. A missing
    /// file is an empty log.
    pub fn read_all(&self) -> Vec<SessionRecord> {
        let Ok(file) = std::fs::File::open(&self.path) else {
            return Vec::new();
        };
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }
}
