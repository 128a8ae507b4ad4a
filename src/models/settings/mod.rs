// Settings module
// Per-installation display and refresh settings, stored in a single row

use chrono::NaiveTime;

use crate::utils::date::parse_time;

pub const MIN_CARD_HEIGHT_MULTIPLIER: f64 = 0.5;
pub const MAX_CARD_HEIGHT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub id: Option<i64>,
    pub card_height_multiplier: f64,
    pub base_slot_height_px: f64,
    pub min_card_height_px: f64,
    pub column_gutter_percent: f64,
    pub day_start_time: String,
    pub day_end_time: String,
    pub refresh_debounce_ms: u64,
    pub refresh_recency_secs: u64,
    pub refresh_poll_secs: u64,
    pub write_timeout_secs: u64,
    pub recurrence_horizon_days: u32,
    pub recurrence_extend_within_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: Some(1),
            card_height_multiplier: 1.0,
            base_slot_height_px: 80.0,
            min_card_height_px: 20.0,
            column_gutter_percent: 0.5,
            day_start_time: "07:00".to_string(),
            day_end_time: "21:00".to_string(),
            refresh_debounce_ms: 500,
            refresh_recency_secs: 5,
            refresh_poll_secs: 60,
            write_timeout_secs: 15,
            recurrence_horizon_days: 90,
            recurrence_extend_within_days: 14,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_CARD_HEIGHT_MULTIPLIER..=MAX_CARD_HEIGHT_MULTIPLIER)
            .contains(&self.card_height_multiplier)
        {
            return Err(format!(
                "Card height multiplier must be between {} and {}",
                MIN_CARD_HEIGHT_MULTIPLIER, MAX_CARD_HEIGHT_MULTIPLIER
            ));
        }

        if self.base_slot_height_px <= 0.0 {
            return Err("Base slot height must be positive".to_string());
        }

        if self.min_card_height_px < 0.0 {
            return Err("Minimum card height cannot be negative".to_string());
        }

        if !(0.0..10.0).contains(&self.column_gutter_percent) {
            return Err("Column gutter must be between 0% and 10%".to_string());
        }

        let start = self.day_start()?;
        let end = self.day_end()?;
        if end <= start {
            return Err("Day end time must be after day start time".to_string());
        }

        if self.refresh_poll_secs == 0 {
            return Err("Refresh poll interval must be at least 1 second".to_string());
        }

        if self.write_timeout_secs == 0 {
            return Err("Write timeout must be at least 1 second".to_string());
        }

        if self.recurrence_horizon_days == 0 {
            return Err("Recurrence horizon must be at least 1 day".to_string());
        }

        if self.recurrence_extend_within_days > self.recurrence_horizon_days {
            return Err("Recurrence extension window cannot exceed the horizon".to_string());
        }

        Ok(())
    }

    pub fn day_start(&self) -> Result<NaiveTime, String> {
        parse_time(&self.day_start_time)
            .ok_or_else(|| format!("Invalid day start time '{}'", self.day_start_time))
    }

    pub fn day_end(&self) -> Result<NaiveTime, String> {
        parse_time(&self.day_end_time)
            .ok_or_else(|| format!("Invalid day end time '{}'", self.day_end_time))
    }
}
