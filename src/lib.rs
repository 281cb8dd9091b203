pub mod artifact;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod pipeline;
pub mod telemetry;
