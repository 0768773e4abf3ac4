//! Health check endpoint
//!
//! Liveness only: returns 200 whenever the process is serving requests,
//! and reports which store backend is active.

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub store: &'static str,
}

pub fn health_check(state: &AppState) -> Response<FullBody> {
    let response = HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: state.service.store().backend(),
    };

    json_response(StatusCode::OK, &response)
}
