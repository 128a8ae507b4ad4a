//! Settings persistence and the conversions that hand display and refresh
//! parameters to the layout and realtime services.

mod mapper;
mod service;

pub use service::SettingsService;

use std::time::Duration;

use crate::models::settings::Settings;
use crate::services::layout::GridConfig;
use crate::services::realtime::RefreshPolicy;

impl Settings {
    /// Grid geometry for the positioning engine. Falls back to the default
    /// day start when the stored value cannot be parsed.
    pub fn grid_config(&self) -> GridConfig {
        let defaults = GridConfig::default();
        GridConfig {
            card_height_multiplier: self.card_height_multiplier,
            base_slot_height_px: self.base_slot_height_px,
            min_card_height_px: self.min_card_height_px,
            column_gutter_percent: self.column_gutter_percent,
            day_start: self.day_start().unwrap_or(defaults.day_start),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            debounce: Duration::from_millis(self.refresh_debounce_ms),
            recency_window: Duration::from_secs(self.refresh_recency_secs),
            poll_interval: Duration::from_secs(self.refresh_poll_secs.max(1)),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}
