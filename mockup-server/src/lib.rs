pub mod config;
pub mod error;
mod handler;
pub mod scope;
pub mod startup;
pub mod telemetry;
