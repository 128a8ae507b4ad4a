// Service module exports

pub mod appointment;
pub mod database;
pub mod layout;
pub mod realtime;
pub mod recurrence;
pub mod schedule;
pub mod settings;
