// Schedule client module
// Cached, optimistically updated view of a tenant's appointments

mod cache;
mod client;
mod error;

pub use cache::AppointmentCache;
pub use client::ScheduleClient;
pub use error::ScheduleError;
