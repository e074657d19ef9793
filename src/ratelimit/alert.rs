use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::DomainError;
use crate::types::ProjectId;

pub const ALERT_TYPE_API_LIMIT: &str = "api_limit";

/// Ordered so that a later threshold compares greater than an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage thresholds in ascending order, in percent of the hourly limit
const THRESHOLDS: [(f64, AlertSeverity, &str, &str); 3] = [
    (
        75.0,
        AlertSeverity::Warning,
        "API request limit needs attention",
        "API requests have passed 75% of the hourly limit. Consider raising the limit.",
    ),
    (
        85.0,
        AlertSeverity::Error,
        "API request limit is approaching",
        "API requests have passed 85% of the hourly limit. Check current usage.",
    ),
    (
        95.0,
        AlertSeverity::Critical,
        "API request limit reached",
        "API requests have passed 95% of the hourly limit. Raise the limit now.",
    ),
];

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub project_id: ProjectId,
    pub severity: AlertSeverity,
    pub alert_type: &'static str,
    pub title: String,
    pub message: String,
    pub usage_percent: f64,
    pub request_count: u64,
    pub limit: u32,
}

/// Alert persistence collaborator
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn record(&self, event: &AlertEvent) -> Result<(), DomainError>;
}

/// Decides when a bucket's usage crosses a new threshold
#[derive(Debug, Clone)]
pub struct AlertThresholdEngine {
    every: u64,
}

impl AlertThresholdEngine {
    pub fn new(every: u64) -> Self {
        Self { every: every.max(1) }
    }

    /// Check usage on every `every`-th admitted request. Emits at most one event,
    /// for the highest threshold reached, and only if it is higher than the one
    /// already alerted for this bucket.
    pub fn evaluate(
        &self,
        project_id: ProjectId,
        count: u64,
        limit: u32,
        alerted: &mut Option<AlertSeverity>,
    ) -> Option<AlertEvent> {
        if limit == 0 || count == 0 || count % self.every != 0 {
            return None;
        }

        let usage_percent = count as f64 / limit as f64 * 100.0;
        let (_, severity, title, message) = THRESHOLDS
            .iter()
            .rev()
            .find(|(threshold, ..)| usage_percent >= *threshold)?;

        if alerted.map_or(false, |previous| previous >= *severity) {
            return None;
        }
        *alerted = Some(*severity);

        Some(AlertEvent {
            project_id,
            severity: *severity,
            alert_type: ALERT_TYPE_API_LIMIT,
            title: title.to_string(),
            message: message.to_string(),
            usage_percent,
            request_count: count,
            limit,
        })
    }
}

/// Record an alert off the request path. Sink failures are logged and dropped.
pub fn dispatch(sink: Arc<dyn AlertSink>, event: AlertEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sink.record(&event).await {
            Ok(()) => tracing::info!(
                project_id = event.project_id,
                severity = %event.severity,
                usage_percent = event.usage_percent,
                "Recorded API limit alert"
            ),
            Err(e) => tracing::warn!(
                project_id = event.project_id,
                severity = %event.severity,
                "Failed to record API limit alert: {}",
                e
            ),
        }
    })
}
