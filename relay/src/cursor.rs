//! Durable record of the last video that was fully mirrored.
//!
//! The record is only ever replaced wholesale: a new version is written to a temporary file in
//! the same directory and then renamed over the old one, so a crash at any point leaves either
//! the previous record or the new one on disk.

use crate::VideoId;
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage for the id of the last fully processed video.
pub trait CursorStore {
    /// Returns the last saved video id, or `None` if there is none or it cannot be read.
    fn load(&self) -> Option<VideoId>;

    /// Replaces the saved video id.
    fn save(&mut self, id: &VideoId) -> eyre::Result<()>;
}

/// The on-disk shape of the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub video_id: VideoId,
    /// Unix time (seconds) at which the video finished processing.
    pub timestamp: i64,
}

/// A [`CursorStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCursor {
    path: PathBuf,
}

impl FileCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full record, distinguishing "no record" from "unreadable record".
    pub fn read_record(&self) -> eyre::Result<Option<CursorRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("parse {} as a cursor record", self.path.display()))?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &CursorRecord) -> eyre::Result<()> {
        let json = serde_json::to_vec_pretty(record).context("serialize cursor record")?;
        replace_file(&self.path, &json)
    }
}

/// Atomically replaces the contents of `path`.
///
/// The data goes to a temporary file in the same directory, which is flushed and then renamed
/// over `path`.
pub(crate) fn replace_file(path: &Path, contents: &[u8]) -> eyre::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temporary file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("flush temporary file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

impl CursorStore for FileCursor {
    fn load(&self) -> Option<VideoId> {
        match self.read_record() {
            Ok(record) => record.map(|r| r.video_id),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = format!("{e:#}"),
                    "ignoring unreadable cursor"
                );
                None
            }
        }
    }

    fn save(&mut self, id: &VideoId) -> eyre::Result<()> {
        let record = CursorRecord {
            video_id: id.clone(),
            timestamp: jiff::Timestamp::now().as_second(),
        };
        self.write_record(&record)?;
        tracing::debug!(video_id = %id, path = %self.path.display(), "saved cursor");
        Ok(())
    }
}
