//! JSON bodies of the HTTP endpoints that are not a `RunResult`.

use serde::{Deserialize, Serialize};

/// `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
}

impl HealthResponse {
    pub fn ok(running: bool) -> Self {
        Self {
            status: "ok".to_string(),
            running,
        }
    }
}

/// `409` answer of `/sync` while another run holds the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyResponse {
    pub status: String,
}

impl BusyResponse {
    pub fn already_running() -> Self {
        Self {
            status: "already_running".to_string(),
        }
    }
}
