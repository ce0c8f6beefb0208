use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::presentation::{HiddenDevices, SortOption};

pub const SORT_OPTION_KEY: &str = "DeviceListView.sortOption";
pub const HIDDEN_IDS_KEY: &str = "DeviceListView.hiddenDeviceIDs";

/// Local key/value store for list preferences.
pub struct PreferenceStore {
    conn: Connection,
}

impl PreferenceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("opening preferences at {}", path.display()))?;
        info!(path = %path.display(), "Opened preference store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM preferences WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(key, value, "Writing preference");
        self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Stored sort option, [`SortOption::Name`] when unset or unrecognised.
    pub fn sort_option(&self) -> Result<SortOption> {
        Ok(self
            .get(SORT_OPTION_KEY)?
            .map(|raw| SortOption::from_stored(&raw))
            .unwrap_or_default())
    }

    pub fn save_sort_option(&self, option: SortOption) -> Result<()> {
        self.set(SORT_OPTION_KEY, option.as_str())
    }

    pub fn hidden_devices(&self) -> Result<HiddenDevices> {
        Ok(self
            .get(HIDDEN_IDS_KEY)?
            .map(|raw| HiddenDevices::decode(&raw))
            .unwrap_or_default())
    }

    pub fn save_hidden_devices(&self, hidden: &HiddenDevices) -> Result<()> {
        self.set(HIDDEN_IDS_KEY, &hidden.encode())
    }
}
