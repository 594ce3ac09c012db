// Library crate for apicheck
// Exports modules for use by the binary and integration tests

pub mod config;
pub mod error;
pub mod models;
pub mod services;
