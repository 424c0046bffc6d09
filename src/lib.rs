pub mod audit;
pub mod error;
pub mod gate;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod value;

use crate::audit::{AuditSink, SettingChangeEvent, RESET_REPORTED_VALUE};
use crate::error::SettingsError;
use crate::gate::{authorize_operator_write, authorize_tenant_write, CallerContext, TenantDirectory};
use crate::registry::{AccessClass, LookupPurpose, SettingRegistry};
use crate::resolver::ResolvedSetting;
use crate::store::{OverrideScope, OverrideStore, TenantId};
use crate::value::SettingValue;
use std::sync::Arc;
use tracing::{info, warn};

/// The override resolution and access-control engine.
///
/// Owns the immutable setting registry and the override store, and consumes
/// the tenant directory and audit sink as collaborators. Every operation is
/// one serializable unit of work: validation and authorization run strictly
/// before persistence, and a rejected request leaves store state untouched.
pub struct SettingsController {
    registry: Arc<SettingRegistry>,
    store: OverrideStore,
    tenants: Arc<dyn TenantDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl SettingsController {
    pub fn new(
        registry: SettingRegistry,
        tenants: Arc<dyn TenantDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> SettingsController {
        SettingsController {
            registry: Arc::new(registry),
            store: OverrideStore::new(),
            tenants,
            audit,
        }
    }

    pub fn registry(&self) -> &SettingRegistry {
        &self.registry
    }

    pub fn store(&self) -> &OverrideStore {
        &self.store
    }

    /// ALTER TENANT <id|ALL> SET CLUSTER SETTING <name> = <value>.
    pub fn set_tenant_override(
        &self,
        ctx: &CallerContext,
        target: OverrideScope,
        name: &str,
        value: SettingValue,
    ) -> Result<(), SettingsError> {
        let setting = self.registry.lookup(name, LookupPurpose::OperatorAccess)?;
        authorize_operator_write(ctx, target, setting, self.tenants.as_ref())?;
        let encoded = setting.encode(&value)?;

        let mut txn = self.store.begin();
        txn.upsert_override(target, setting.name(), encoded.clone(), setting.value_type());
        txn.commit();

        self.emit_audit(SettingChangeEvent {
            setting_name: setting.name().to_string(),
            reported_value: encoded,
            tenant_id: target.numeric(),
            all_tenants: target.is_all_tenants(),
        });
        Ok(())
    }

    /// ALTER TENANT <id|ALL> RESET CLUSTER SETTING <name>. Resetting an
    /// override that does not exist is not an error.
    pub fn reset_tenant_override(
        &self,
        ctx: &CallerContext,
        target: OverrideScope,
        name: &str,
    ) -> Result<(), SettingsError> {
        let setting = self.registry.lookup(name, LookupPurpose::OperatorAccess)?;
        authorize_operator_write(ctx, target, setting, self.tenants.as_ref())?;

        let mut txn = self.store.begin();
        txn.delete_override(target, setting.name());
        txn.commit();

        self.emit_audit(SettingChangeEvent {
            setting_name: setting.name().to_string(),
            reported_value: RESET_REPORTED_VALUE.to_string(),
            tenant_id: target.numeric(),
            all_tenants: target.is_all_tenants(),
        });
        Ok(())
    }

    /// SET CLUSTER SETTING <name> = <value>, issued by a tenant against its
    /// own scope.
    pub fn set_setting(
        &self,
        ctx: &CallerContext,
        name: &str,
        value: SettingValue,
    ) -> Result<(), SettingsError> {
        let setting = self.registry.lookup(name, LookupPurpose::TenantAccess)?;
        let tenant = ctx.scope();

        let mut txn = self.store.begin();
        let in_force = resolver::operator_override_in_force(&txn, tenant, setting.name());
        authorize_tenant_write(ctx, setting, in_force)?;
        if setting.class() != AccessClass::TenantWritable {
            return Err(SettingsError::AssertionFailed(format!(
                "non-writable setting '{}' ({:?}) passed the tenant write gate",
                setting.name(),
                setting.class()
            )));
        }
        let encoded = setting.encode(&value)?;
        txn.upsert_local(tenant, setting.name(), encoded.clone(), setting.value_type());
        txn.commit();

        self.emit_audit(SettingChangeEvent {
            setting_name: setting.name().to_string(),
            reported_value: encoded,
            tenant_id: tenant.get(),
            all_tenants: false,
        });
        Ok(())
    }

    /// RESET CLUSTER SETTING <name>, issued by a tenant against its own
    /// scope. Idempotent, but refused while an operator override is in
    /// force, like any other self-service write.
    pub fn reset_setting(&self, ctx: &CallerContext, name: &str) -> Result<(), SettingsError> {
        let setting = self.registry.lookup(name, LookupPurpose::TenantAccess)?;
        let tenant = ctx.scope();

        let mut txn = self.store.begin();
        let in_force = resolver::operator_override_in_force(&txn, tenant, setting.name());
        authorize_tenant_write(ctx, setting, in_force)?;
        txn.delete_local(tenant, setting.name());
        txn.commit();

        self.emit_audit(SettingChangeEvent {
            setting_name: setting.name().to_string(),
            reported_value: RESET_REPORTED_VALUE.to_string(),
            tenant_id: tenant.get(),
            all_tenants: false,
        });
        Ok(())
    }

    /// SHOW CLUSTER SETTING <name>: the effective value for the caller's
    /// own scope. Resolved fresh against committed state on every call.
    pub fn show_setting(
        &self,
        ctx: &CallerContext,
        name: &str,
    ) -> Result<ResolvedSetting, SettingsError> {
        let purpose = if ctx.is_operator() && ctx.scope() == TenantId::SYSTEM {
            LookupPurpose::OperatorAccess
        } else {
            LookupPurpose::TenantAccess
        };
        let txn = self.store.begin();
        resolver::resolve(&txn, &self.registry, ctx.scope(), name, purpose)
    }

    /// SHOW CLUSTER SETTING ... FOR TENANT <id>: displaying another
    /// tenant's effective value is not supported yet.
    pub fn show_tenant_setting(
        &self,
        _ctx: &CallerContext,
        _target: TenantId,
        _name: &str,
    ) -> Result<ResolvedSetting, SettingsError> {
        Err(SettingsError::Unimplemented {
            message: "tenant-level cluster settings not supported".into(),
            issue: 73857,
        })
    }

    /// Invoked by the tenant lifecycle manager during tear-down. Removes
    /// every setting row scoped to the tenant; the all-tenant layer is
    /// untouched. Idempotent and safe when the tenant had no rows.
    pub fn on_tenant_destroyed(&self, tenant: TenantId) {
        let mut txn = self.store.begin();
        let removed = txn.delete_all_for_tenant(tenant);
        txn.commit();
        info!(
            tenant = tenant.get(),
            removed, "dropped setting rows for destroyed tenant"
        );
    }

    fn emit_audit(&self, event: SettingChangeEvent) {
        // Mutation durability takes precedence over audit completeness.
        if let Err(err) = self.audit.emit(&event) {
            warn!(
                setting = %event.setting_name,
                tenant_id = event.tenant_id,
                %err,
                "audit emission failed after committed mutation"
            );
        }
    }
}
