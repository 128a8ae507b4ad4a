//! Pixel geometry for appointment cards.

use chrono::NaiveTime;
use serde::Serialize;

use crate::models::appointment::Appointment;
use crate::models::settings::{MAX_CARD_HEIGHT_MULTIPLIER, MIN_CARD_HEIGHT_MULTIPLIER};
use crate::utils::date::minutes_since;

/// Display density and grid origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub card_height_multiplier: f64,
    /// Height of a one-hour slot at multiplier 1.0.
    pub base_slot_height_px: f64,
    pub min_card_height_px: f64,
    pub column_gutter_percent: f64,
    pub day_start: NaiveTime,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            card_height_multiplier: 1.0,
            base_slot_height_px: 80.0,
            min_card_height_px: 20.0,
            column_gutter_percent: 0.5,
            day_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl GridConfig {
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.card_height_multiplier = multiplier;
        self
    }

    /// Vertical scale. Depends only on the multiplier (clamped to the
    /// supported range) and the base slot height.
    pub fn pixels_per_minute(&self) -> f64 {
        pixels_per_minute(self.card_height_multiplier, self.base_slot_height_px)
    }
}

pub fn pixels_per_minute(multiplier: f64, base_slot_height_px: f64) -> f64 {
    let multiplier = if multiplier.is_finite() {
        multiplier.clamp(MIN_CARD_HEIGHT_MULTIPLIER, MAX_CARD_HEIGHT_MULTIPLIER)
    } else {
        1.0
    };
    base_slot_height_px.max(0.0) * multiplier / 60.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub top_px: f64,
    pub height_px: f64,
    pub left_percent: f64,
    pub width_percent: f64,
}

/// Place an appointment on the grid. Appointments starting before the grid
/// origin are pinned to the top.
pub fn compute_position(
    appointment: &Appointment,
    column_index: usize,
    column_count: usize,
    config: &GridConfig,
) -> Position {
    let scale = config.pixels_per_minute();

    let minutes_from_top = minutes_since(config.day_start, appointment.start_time).max(0);
    let top_px = minutes_from_top as f64 * scale;
    let height_px = (appointment.duration_minutes as f64 * scale).max(config.min_card_height_px);

    let (left_percent, width_percent) = horizontal_span(column_index, column_count, config);

    Position {
        top_px,
        height_px,
        left_percent,
        width_percent,
    }
}

fn horizontal_span(column_index: usize, column_count: usize, config: &GridConfig) -> (f64, f64) {
    let column_count = column_count.max(1);
    let column_index = column_index.min(column_count - 1);

    let slot = 100.0 / column_count as f64;
    // Gutter never eats more than a tenth of the slot.
    let gutter = config.column_gutter_percent.max(0.0).min(slot / 10.0);

    (column_index as f64 * slot, slot - gutter)
}
