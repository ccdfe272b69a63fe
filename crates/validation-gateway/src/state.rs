//! Shared application state for the gateway

use std::sync::Arc;
use std::time::Instant;

use consensus::{ReportSink, SharedOrchestrator, SharedSessionRegistry, ValidationConfig};

/// Everything the route handlers need, shared behind one Arc
pub struct AppState {
    pub config: Arc<ValidationConfig>,
    pub registry: SharedSessionRegistry,
    pub orchestrator: SharedOrchestrator,
    pub report_sink: Arc<dyn ReportSink>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<ValidationConfig>,
        registry: SharedSessionRegistry,
        orchestrator: SharedOrchestrator,
        report_sink: Arc<dyn ReportSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            orchestrator,
            report_sink,
            started_at: Instant::now(),
        })
    }

    /// Seconds since the gateway started (liveness probe)
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
