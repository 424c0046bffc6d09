use crate::error::SettingsError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Marker reported in place of a value when an override is reset.
pub const RESET_REPORTED_VALUE: &str = "DEFAULT";

/// Structured record of one committed setting write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingChangeEvent {
    pub setting_name: String,
    /// Human-readable value, or [`RESET_REPORTED_VALUE`] for a reset.
    pub reported_value: String,
    /// Numeric tenant identifier affected; 0 for an all-tenant operation.
    pub tenant_id: u64,
    pub all_tenants: bool,
}

/// Fire-and-forget sink invoked after a successful write. An emission
/// failure is logged by the write path and does not roll the mutation back.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &SettingChangeEvent) -> Result<(), SettingsError>;
}

/// Default sink: one structured log line per event, JSON payload attached.
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&self, event: &SettingChangeEvent) -> Result<(), SettingsError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| SettingsError::Validation(format!("audit payload encoding: {e}")))?;
        tracing::info!(
            target: "tenant_settings::audit",
            setting = %event.setting_name,
            tenant_id = event.tenant_id,
            all_tenants = event.all_tenants,
            %payload,
            "cluster setting changed"
        );
        Ok(())
    }
}

/// In-memory sink capturing events in order. Used by the integration tests
/// and useful to embedders wiring the engine into their own event pipeline.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SettingChangeEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> MemoryAuditSink {
        MemoryAuditSink::default()
    }

    pub fn events(&self) -> Vec<SettingChangeEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: &SettingChangeEvent) -> Result<(), SettingsError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
