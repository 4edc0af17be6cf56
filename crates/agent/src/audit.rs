use tracing::{debug, warn};

use altura_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit events to the log. Failed outcomes are raised to `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let user_id = event.user_id.as_ref().map(|user| user.0.as_str()).unwrap_or("-");
        let metadata = format!("{:?}", event.metadata);
        match event.outcome {
            AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                user_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Success | AuditOutcome::Rejected => debug!(
                event_name = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                user_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
