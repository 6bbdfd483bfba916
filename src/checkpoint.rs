//! Durable progress marker.
//!
//! Both halves live in one JSON record that is replaced atomically, so a crash
//! can never leave the post id and the timestamp out of sync.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint {path} is corrupt: {reason}. Fix or remove the file")]
    Corrupt { path: PathBuf, reason: String },

    #[error("checkpoint io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Last fully processed post.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_post_id: i64,
    /// Unix time of the last processed post, or of the last empty poll.
    pub last_seen_time: i64,
}

impl Checkpoint {
    /// Moves past a delivered post. Never goes backwards in time.
    pub fn advance(&mut self, post_id: i64, date: i64) {
        self.last_post_id = post_id;
        self.last_seen_time = self.last_seen_time.max(date);
    }

    /// Bumps only the timestamp, used when the feed had nothing new.
    pub fn touch(&mut self, time: i64) {
        self.last_seen_time = self.last_seen_time.max(time);
    }
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint. A missing file starts from `now` so the first
    /// run does not replay the whole feed history.
    pub fn load_or_init(&self, now: i64) -> Result<Checkpoint, CheckpointError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "No checkpoint found, starting from now");
                let checkpoint = Checkpoint { last_post_id: 0, last_seen_time: now };
                self.save(&checkpoint)?;
                return Ok(checkpoint);
            }
            Err(source) => return Err(self.io_error(source)),
        };

        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Replaces the record through a temp file in the same directory.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let json = serde_json::to_vec(checkpoint).map_err(|e| self.io_error(e.into()))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        temp.write_all(&json).map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        debug!(
            path = %self.path.display(),
            last_post_id = checkpoint.last_post_id,
            last_seen_time = checkpoint.last_seen_time,
            "Checkpoint written"
        );
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io { path: self.path.clone(), source }
    }
}
