//! Read-only view of the transport's device store.
//!
//! The bridge owns `store/whatsapp.db` and writes device/session rows into
//! it. We only ever read the paired device's JID.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

pub const DEFAULT_STORE_PATH: &str = "store/whatsapp.db";

#[derive(Debug)]
pub enum StoreError {
    Open { path: PathBuf, source: rusqlite::Error },
    Query(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "failed to open device store '{}': {}", path.display(), source)
            }
            Self::Query(source) => write!(f, "failed to read device store: {}", source),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Query(source) => Some(source),
        }
    }
}

pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    /// Open the store at `path`. A missing file is fine (nothing paired yet);
    /// a file that exists but can't be opened is not.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        if store.path.exists() {
            store.connect()?;
        }
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Open {
            path: self.path.clone(),
            source: e,
        })
    }

    /// JID of the paired device, `None` before first pairing.
    pub fn device_id(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            debug!("No device store at {:?}", self.path);
            return Ok(None);
        }

        let conn = self.connect()?;
        let has_table: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'whatsmeow_device')",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        if !has_table {
            return Ok(None);
        }

        conn.query_row("SELECT jid FROM whatsmeow_device LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(StoreError::Query)
    }
}
