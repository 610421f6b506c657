//! Audit sink that writes structured tracing events.

use tracing::info;

use drivehub_core::events::AuditEvent;
use drivehub_core::traits::audit::AuditSink;

/// Emits every audit event under the `audit` tracing target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates a new tracing audit sink.
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = ?event.action,
            outcome = ?event.outcome,
            resource = %event.resource_ref,
            actor_id = ?event.actor_id,
            metadata = %event.metadata,
            at = %event.timestamp,
            "Audit event"
        );
    }
}
