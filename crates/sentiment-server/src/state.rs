use std::sync::Arc;
use std::time::Instant;

use sentiment_runtime::Lifecycle;

use crate::telemetry::TelemetryClient;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
    pub telemetry: Option<TelemetryClient>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(lifecycle: Arc<Lifecycle>, telemetry: Option<TelemetryClient>) -> Self {
        Self {
            lifecycle,
            telemetry,
            started_at: Instant::now(),
        }
    }
}
