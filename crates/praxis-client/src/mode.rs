use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    #[default]
    Simulated,
    Networked,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Simulated => "simulated",
            BackendMode::Networked => "networked",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "mock" => Ok(BackendMode::Simulated),
            "networked" | "live" => Ok(BackendMode::Networked),
            other => Err(ClientError::Config(format!("unknown backend mode: {other}"))),
        }
    }
}

/// The shared mode flag. Every component of one client holds a clone and
/// reads it on each call, so flipping it takes effect on the next call.
#[derive(Debug, Clone)]
pub struct ModeSwitch(Arc<AtomicU8>);

impl ModeSwitch {
    pub fn new(mode: BackendMode) -> Self {
        Self(Arc::new(AtomicU8::new(encode(mode))))
    }

    pub fn get(&self) -> BackendMode {
        match self.0.load(Ordering::SeqCst) {
            0 => BackendMode::Simulated,
            _ => BackendMode::Networked,
        }
    }

    pub fn set(&self, mode: BackendMode) {
        self.0.store(encode(mode), Ordering::SeqCst);
    }
}

fn encode(mode: BackendMode) -> u8 {
    match mode {
        BackendMode::Simulated => 0,
        BackendMode::Networked => 1,
    }
}
