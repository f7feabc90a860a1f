pub mod auth;
pub mod client;
pub mod document;
pub mod narrative;
pub mod settings;
pub mod telemetry;
