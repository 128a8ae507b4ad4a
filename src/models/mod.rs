// Module exports for models

pub mod appointment;
pub mod recurrence;
pub mod settings;
pub mod tenant;
