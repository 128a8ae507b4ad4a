use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::PathBuf;

use super::schema;

const DATABASE_FILE: &str = "schedule.db";

/// Thin wrapper around the scheduling SQLite connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) a SQLite database at the provided path and
    /// enables foreign keys immediately.
    pub fn new(path: &str) -> Result<Self> {
        let conn =
            Connection::open(path).context(format!("Failed to open database at {}", path))?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        Ok(Self { conn })
    }

    /// Default on-disk location: the platform data dir, or the working
    /// directory when no home directory can be resolved.
    pub fn default_path() -> PathBuf {
        match ProjectDirs::from("br", "FisioFlow", "PhysioSchedule") {
            Some(dirs) => dirs.data_dir().join(DATABASE_FILE),
            None => PathBuf::from(DATABASE_FILE),
        }
    }

    /// Opens the database at `path`, creating parent directories and the
    /// schema as needed.
    pub fn open_initialized(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }

        let db = Self::new(&path.to_string_lossy())?;
        db.initialize_schema()?;
        log::info!("Schedule database ready at {}", path.display());
        Ok(db)
    }

    /// Provides read/write access to the underlying `rusqlite::Connection`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates tables, runs migrations, and seeds default data.
    pub fn initialize_schema(&self) -> Result<()> {
        schema::initialize_schema(self.connection())
    }
}
