//! Persisted live feed position

use hooklog_proto::StreamCursor;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor file error: {0}")]
    Io(#[from] io::Error),

    #[error("no data directory available for the cursor file")]
    NoDataDir,
}

/// Where the last seen log id is kept between runs
pub trait CursorStore: Send + Sync {
    /// Stored cursor, or `$` if nothing was stored yet
    fn load(&self) -> Result<StreamCursor, CursorError>;

    fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError>;
}

/// Cursor held in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryCursorStore {
    cursor: Arc<Mutex<StreamCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<StreamCursor, CursorError> {
        Ok(self
            .cursor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = cursor.clone();
        Ok(())
    }
}

/// Cursor kept in a small text file
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/hooklog/cursor`
    pub fn default_location() -> Result<Self, CursorError> {
        let dir = dirs::data_dir().ok_or(CursorError::NoDataDir)?;
        Ok(Self::new(dir.join("hooklog").join("cursor")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<StreamCursor, CursorError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(StreamCursor::new(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StreamCursor::latest()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a temporary sibling, then rename over the old file
    fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, cursor.as_str())?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Saved cursor {} to {}", cursor, self.path.display());
        Ok(())
    }
}
