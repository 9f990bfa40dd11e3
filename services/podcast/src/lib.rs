pub mod adapters;
pub mod batch;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod telemetry;
pub mod voices;
