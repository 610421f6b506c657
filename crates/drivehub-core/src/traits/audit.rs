//! Audit sink trait.

use crate::events::AuditEvent;

/// Receiver for audit events.
///
/// Recording is fire-and-forget: implementations must not block the
/// caller and must not fail, so the method has no return value.
pub trait AuditSink: Send + Sync + std::fmt::Debug + 'static {
    /// Record one audit event.
    fn record(&self, event: AuditEvent);
}
