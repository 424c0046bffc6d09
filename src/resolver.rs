use crate::error::SettingsError;
use crate::registry::{AccessClass, LookupPurpose, Setting, SettingRegistry};
use crate::store::{OverrideRecord, OverrideScope, OverrideTxn, TenantId};
use crate::value::SettingValue;
use serde::{Deserialize, Serialize};

/// Which layer produced the effective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// The registry default.
    Default,
    /// The tenant's own self-service value.
    SelfService,
    /// Operator override applying to all tenants.
    AllTenants,
    /// Operator override for this specific tenant.
    TenantSpecific,
}

impl ValueSource {
    pub fn is_operator_override(self) -> bool {
        matches!(self, ValueSource::AllTenants | ValueSource::TenantSpecific)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSetting {
    pub value: SettingValue,
    pub source: ValueSource,
}

impl ResolvedSetting {
    /// True when an operator override at either layer produced the value.
    pub fn is_overridden(&self) -> bool {
        self.source.is_operator_override()
    }
}

/// Computes the effective value of `name` for `tenant`.
///
/// Precedence, highest first: the tenant-specific operator override, the
/// all-tenant operator override, the tenant's own self-service value, the
/// registry default. Always defined: the registry default is the floor.
///
/// The read runs against the unit of work's view of current committed
/// state; callers begin a fresh unit of work per resolution, so a
/// concurrent operator write changing precedence is visible to the very
/// next read.
pub fn resolve(
    txn: &OverrideTxn<'_>,
    registry: &SettingRegistry,
    tenant: TenantId,
    name: &str,
    purpose: LookupPurpose,
) -> Result<ResolvedSetting, SettingsError> {
    let setting = registry.lookup(name, purpose)?;

    let layers = [
        (
            txn.get_override(OverrideScope::Tenant(tenant), setting.name()),
            ValueSource::TenantSpecific,
        ),
        (
            txn.get_override(OverrideScope::AllTenants, setting.name()),
            ValueSource::AllTenants,
        ),
        (txn.get_local(tenant, setting.name()), ValueSource::SelfService),
    ];
    for (record, source) in layers {
        if source == ValueSource::SelfService && setting.class() != AccessClass::TenantWritable {
            // A local row for a non-writable setting can only come from an
            // out-of-band writer; the governing class wins over the row.
            if let Some(record) = &record {
                tracing::warn!(
                    setting = setting.name(),
                    tenant = record.scope.numeric(),
                    "self-service row exists for a non-writable setting; masking it"
                );
            }
            continue;
        }
        if let Some(record) = record {
            if let Some(value) = decode_layer(setting, &record) {
                return Ok(ResolvedSetting { value, source });
            }
        }
    }
    Ok(ResolvedSetting {
        value: setting.default_value().clone(),
        source: ValueSource::Default,
    })
}

/// Reports whether an operator override is in force for (tenant, name) at
/// either layer, and which one. Presence only; the row is not decoded.
/// Re-evaluated per write attempt inside the caller's unit of work.
pub fn operator_override_in_force(
    txn: &OverrideTxn<'_>,
    tenant: TenantId,
    name: &str,
) -> Option<ValueSource> {
    if txn
        .get_override(OverrideScope::Tenant(tenant), name)
        .is_some()
    {
        Some(ValueSource::TenantSpecific)
    } else if txn.get_override(OverrideScope::AllTenants, name).is_some() {
        Some(ValueSource::AllTenants)
    } else {
        None
    }
}

fn decode_layer(setting: &Setting, record: &OverrideRecord) -> Option<SettingValue> {
    if record.value_type != setting.value_type() {
        tracing::warn!(
            setting = setting.name(),
            scope = record.scope.numeric(),
            stored = %record.value_type,
            declared = %setting.value_type(),
            "override row type tag disagrees with the registry; masking this layer"
        );
        return None;
    }
    match SettingValue::decode(record.value_type, &record.encoded_value) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                setting = setting.name(),
                scope = record.scope.numeric(),
                %err,
                "undecodable override row; masking this layer"
            );
            None
        }
    }
}
