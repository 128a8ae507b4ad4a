use anyhow::{Context, Result};
use rusqlite::Connection;

use super::migrations;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    create_settings_table(conn)?;
    run_settings_migrations(conn)?;
    insert_default_settings(conn)?;
    create_appointments_table(conn)?;
    create_recurring_series_table(conn)?;
    create_recurring_occurrences_table(conn)?;
    create_refresh_signals_table(conn)?;
    Ok(())
}

fn create_settings_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            card_height_multiplier REAL NOT NULL DEFAULT 1.0,
            base_slot_height_px REAL NOT NULL DEFAULT 80.0,
            min_card_height_px REAL NOT NULL DEFAULT 20.0,
            column_gutter_percent REAL NOT NULL DEFAULT 0.5,
            day_start_time TEXT NOT NULL DEFAULT '07:00',
            day_end_time TEXT NOT NULL DEFAULT '21:00',
            refresh_debounce_ms INTEGER NOT NULL DEFAULT 500,
            refresh_recency_secs INTEGER NOT NULL DEFAULT 5,
            refresh_poll_secs INTEGER NOT NULL DEFAULT 60,
            write_timeout_secs INTEGER NOT NULL DEFAULT 15,
            recurrence_horizon_days INTEGER NOT NULL DEFAULT 90,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create settings table")?;

    Ok(())
}

fn run_settings_migrations(conn: &Connection) -> Result<()> {
    migrations::ensure_column(
        conn,
        "settings",
        "write_timeout_secs",
        "ALTER TABLE settings ADD COLUMN write_timeout_secs INTEGER NOT NULL DEFAULT 15",
    )?;

    migrations::ensure_column(
        conn,
        "settings",
        "recurrence_extend_within_days",
        "ALTER TABLE settings ADD COLUMN recurrence_extend_within_days INTEGER NOT NULL DEFAULT 14",
    )?;

    Ok(())
}

fn insert_default_settings(conn: &Connection) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO settings (id) VALUES (1)", [])
        .context("Failed to insert default settings")?;

    Ok(())
}

fn create_appointments_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS appointments (
            id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            appointment_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            patient_id TEXT NOT NULL,
            therapist_id TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled',
            appointment_type TEXT,
            notes TEXT,
            room TEXT,
            series_id TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (tenant_id, id)
        )",
        [],
    )
    .context("Failed to create appointments table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_appointments_tenant_date
         ON appointments (tenant_id, appointment_date)",
        [],
    )
    .context("Failed to create appointments date index")?;

    Ok(())
}

fn create_recurring_series_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recurring_series (
            id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            patient_id TEXT NOT NULL,
            therapist_id TEXT,
            duration_minutes INTEGER NOT NULL,
            appointment_type TEXT,
            room TEXT,
            notes TEXT,
            start_datetime TEXT NOT NULL,
            frequency TEXT NOT NULL,
            interval INTEGER NOT NULL DEFAULT 1,
            weekdays TEXT,
            end_type TEXT NOT NULL,
            end_count INTEGER,
            end_until TEXT,
            skipped_dates TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            cancelled_at TEXT,
            PRIMARY KEY (tenant_id, id)
        )",
        [],
    )
    .context("Failed to create recurring_series table")?;

    Ok(())
}

fn create_recurring_occurrences_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recurring_occurrences (
            id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            series_id TEXT NOT NULL,
            occurrence_date TEXT NOT NULL,
            start_datetime TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            state TEXT NOT NULL DEFAULT 'materialized',
            is_exception INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (tenant_id, id),
            UNIQUE (tenant_id, series_id, occurrence_date)
        )",
        [],
    )
    .context("Failed to create recurring_occurrences table")?;

    Ok(())
}

fn create_refresh_signals_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS refresh_signals (
            tenant_id TEXT PRIMARY KEY,
            signaled_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create refresh_signals table")?;

    Ok(())
}
