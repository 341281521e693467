//! Per-transformation telemetry records and the default `tracing` sink.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::contract::TelemetrySink;
use crate::model::SourceItemId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TransformationOutcome {
    Succeeded,
    Failed { message: String },
}

/// Duration and outcome of one page transformation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationTelemetry {
    pub correlation_id: Uuid,
    pub task_id: Uuid,
    pub source_item_id: SourceItemId,
    pub duration: Duration,
    #[serde(flatten)]
    pub outcome: TransformationOutcome,
    pub properties: BTreeMap<String, String>,
}

impl TransformationTelemetry {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TransformationOutcome::Succeeded)
    }
}

/// Emits each record as a structured `tracing` event under the `telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, telemetry: &TransformationTelemetry) {
        let properties = serde_json::to_string(&telemetry.properties).unwrap_or_default();
        match &telemetry.outcome {
            TransformationOutcome::Succeeded => info!(
                target: "telemetry",
                correlation_id = %telemetry.correlation_id,
                task_id = %telemetry.task_id,
                source_item_id = %telemetry.source_item_id,
                duration_ms = telemetry.duration.as_millis() as u64,
                %properties,
                "[TELEMETRY] Page transformation succeeded"
            ),
            TransformationOutcome::Failed { message } => info!(
                target: "telemetry",
                correlation_id = %telemetry.correlation_id,
                task_id = %telemetry.task_id,
                source_item_id = %telemetry.source_item_id,
                duration_ms = telemetry.duration.as_millis() as u64,
                error = %message,
                %properties,
                "[TELEMETRY] Page transformation failed"
            ),
        }
    }
}
