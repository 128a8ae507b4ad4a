use crate::models::settings::Settings;
use rusqlite::Row;

pub const SETTINGS_COLUMNS: &str = "id, card_height_multiplier, base_slot_height_px, min_card_height_px,
    column_gutter_percent, day_start_time, day_end_time, refresh_debounce_ms,
    refresh_recency_secs, refresh_poll_secs, write_timeout_secs,
    recurrence_horizon_days, recurrence_extend_within_days";

pub fn row_to_settings(row: &Row) -> Result<Settings, rusqlite::Error> {
    Ok(Settings {
        id: Some(row.get(0)?),
        card_height_multiplier: row.get(1)?,
        base_slot_height_px: row.get(2)?,
        min_card_height_px: row.get(3)?,
        column_gutter_percent: row.get(4)?,
        day_start_time: row.get(5)?,
        day_end_time: row.get(6)?,
        refresh_debounce_ms: row.get::<_, i64>(7)?.max(0) as u64,
        refresh_recency_secs: row.get::<_, i64>(8)?.max(0) as u64,
        refresh_poll_secs: row.get::<_, i64>(9)?.max(0) as u64,
        write_timeout_secs: row.get::<_, i64>(10).unwrap_or(15).max(0) as u64,
        recurrence_horizon_days: row.get::<_, i64>(11)?.max(0) as u32,
        recurrence_extend_within_days: row.get::<_, i64>(12).unwrap_or(14).max(0) as u32,
    })
}
