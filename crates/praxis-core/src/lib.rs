//! praxis-core
//!
//! Pure domain types, REST path conventions, and the request descriptor.
//! No network dependency; this is the shared vocabulary of the Praxis
//! data-access layer.

pub mod error;
pub mod models;
pub mod paths;
pub mod request;
