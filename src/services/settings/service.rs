use crate::models::settings::Settings;
use crate::services::database::Database;
use anyhow::{anyhow, Context, Result};

use super::mapper::{row_to_settings, SETTINGS_COLUMNS};

pub struct SettingsService<'a> {
    db: &'a Database,
}

impl<'a> SettingsService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get the current settings
    pub fn get(&self) -> Result<Settings> {
        let conn = self.db.connection();

        let settings = conn
            .query_row(
                &format!("SELECT {} FROM settings WHERE id = 1", SETTINGS_COLUMNS),
                [],
                row_to_settings,
            )
            .context("Failed to load settings")?;

        Ok(settings)
    }

    /// Get the current settings, falling back to defaults when the stored
    /// row is missing or unreadable.
    pub fn get_or_default(&self) -> Settings {
        match self.get() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to load settings: {}, using defaults", e);
                Settings::default()
            }
        }
    }

    /// Update settings
    pub fn update(&self, settings: &Settings) -> Result<()> {
        settings
            .validate()
            .map_err(|e| anyhow!("Invalid settings: {}", e))?;

        let conn = self.db.connection();

        conn.execute(
            "UPDATE settings \
             SET card_height_multiplier = ?1, \
                 base_slot_height_px = ?2, \
                 min_card_height_px = ?3, \
                 column_gutter_percent = ?4, \
                 day_start_time = ?5, \
                 day_end_time = ?6, \
                 refresh_debounce_ms = ?7, \
                 refresh_recency_secs = ?8, \
                 refresh_poll_secs = ?9, \
                 write_timeout_secs = ?10, \
                 recurrence_horizon_days = ?11, \
                 recurrence_extend_within_days = ?12, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE id = 1",
            (
                settings.card_height_multiplier,
                settings.base_slot_height_px,
                settings.min_card_height_px,
                settings.column_gutter_percent,
                &settings.day_start_time,
                &settings.day_end_time,
                settings.refresh_debounce_ms as i64,
                settings.refresh_recency_secs as i64,
                settings.refresh_poll_secs as i64,
                settings.write_timeout_secs as i64,
                settings.recurrence_horizon_days as i64,
                settings.recurrence_extend_within_days as i64,
            ),
        )
        .context("Failed to update settings")?;

        Ok(())
    }

    /// Reset settings to defaults
    pub fn reset(&self) -> Result<()> {
        self.update(&Settings::default())
    }
}
