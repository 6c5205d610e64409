//! Application state

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use confab_config::Settings;

/// Shared state across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Composed system prompt, loaded once at startup
    pub system_prompt: Arc<String>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(settings: Settings, system_prompt: String, metrics: PrometheusHandle) -> Self {
        Self {
            settings: Arc::new(settings),
            system_prompt: Arc::new(system_prompt),
            metrics,
        }
    }
}
