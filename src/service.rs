//! Boundary to the display-management service.

use crate::types::{ApplyMethod, CurrentState, LogicalMonitor, Properties};
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("failed to parse display state: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot send {0}")]
    Unsupported(String),
    #[error("{0}")]
    Rejected(String),
}

/// `org.gnome.Mutter.DisplayConfig` as seen by the controller.
pub(crate) trait DisplayConfigService: Send + Sync + 'static {
    fn get_current_state(&self) -> impl Future<Output = Result<CurrentState, ServiceError>> + Send;

    fn apply_monitors_config(
        &self,
        serial: u32,
        method: ApplyMethod,
        logical_monitors: Vec<LogicalMonitor>,
        properties: Properties,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// A fresh subscription to the payload-less `MonitorsChanged` signal.
    fn monitors_changed(&self) -> broadcast::Receiver<()>;
}
