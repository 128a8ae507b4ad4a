// Physio Schedule Library
// Exports all modules for the CLI, tests and benchmarks

pub mod models;
pub mod services;
pub mod utils;
