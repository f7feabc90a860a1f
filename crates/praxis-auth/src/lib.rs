//! praxis-auth
//!
//! Credential storage, token expiry checks, and the token lifecycle
//! (refresh, session end).

pub mod error;
pub mod flows;
pub mod jwt;
pub mod lifecycle;
pub mod store;
