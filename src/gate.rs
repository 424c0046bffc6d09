use crate::error::SettingsError;
use crate::registry::{AccessClass, Setting};
use crate::resolver::ValueSource;
use crate::store::{OverrideScope, TenantId};
use serde::{Deserialize, Serialize};

/// Tenant-existence check, supplied by the tenant lifecycle manager.
pub trait TenantDirectory: Send + Sync {
    fn exists(&self, tenant: TenantId) -> bool;
}

/// Identity and role of the caller issuing an administrative statement.
///
/// The role flag is resolved by the session layer's privilege machinery
/// before the request reaches this crate; the gate only consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    caller: String,
    operator: bool,
    scope: TenantId,
}

impl CallerContext {
    /// An ordinary caller executing inside its own tenant.
    pub fn tenant(caller: impl Into<String>, scope: TenantId) -> CallerContext {
        CallerContext {
            caller: caller.into(),
            operator: false,
            scope,
        }
    }

    /// An operator executing in the system tenant.
    pub fn operator(caller: impl Into<String>) -> CallerContext {
        CallerContext {
            caller: caller.into(),
            operator: true,
            scope: TenantId::SYSTEM,
        }
    }

    /// A caller holding the operator role but executing from an arbitrary
    /// tenant. The operator write path refuses these.
    pub fn operator_in_tenant(caller: impl Into<String>, scope: TenantId) -> CallerContext {
        CallerContext {
            caller: caller.into(),
            operator: true,
            scope,
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn is_operator(&self) -> bool {
        self.operator
    }

    pub fn scope(&self) -> TenantId {
        self.scope
    }
}

/// Authorizes an operator-path write (ALTER TENANT ... SET/RESET CLUSTER
/// SETTING) targeting `target`.
///
/// Runs strictly before persistence; a rejection leaves store state
/// untouched.
pub fn authorize_operator_write(
    ctx: &CallerContext,
    target: OverrideScope,
    setting: &Setting,
    directory: &dyn TenantDirectory,
) -> Result<(), SettingsError> {
    // Changing cluster settings for other tenants is a more privileged
    // operation than changing local cluster settings, so the plain
    // modify-setting role option is not enough.
    if !ctx.is_operator() {
        return Err(SettingsError::InsufficientPrivilege(
            "changing a tenant cluster setting requires the operator role".into(),
        ));
    }
    if ctx.scope() != TenantId::SYSTEM {
        return Err(SettingsError::InsufficientPrivilege(
            "ALTER TENANT can only be called by system operators".into(),
        ));
    }
    if setting.class() == AccessClass::SystemOnly {
        return Err(SettingsError::InsufficientPrivilege(format!(
            "{} is a system-only setting and must be set in the system tenant \
             using SET CLUSTER SETTING",
            setting.name()
        )));
    }
    if setting.is_version_gate() {
        return Err(SettingsError::Unimplemented {
            message: "cannot change the version of another tenant".into(),
            issue: 77733,
        });
    }
    if let OverrideScope::Tenant(target_id) = target {
        if target_id == TenantId::SYSTEM {
            return Err(SettingsError::InvalidParameterValue {
                message: "cannot use ALTER TENANT to change cluster settings in the system \
                          tenant"
                    .into(),
                hint: Some("Use a regular SET CLUSTER SETTING statement.".into()),
            });
        }
        if !directory.exists(target_id) {
            return Err(SettingsError::invalid_parameter(format!(
                "no tenant found with ID {target_id}"
            )));
        }
    }
    Ok(())
}

/// Authorizes a self-service write by a tenant against its own scope.
///
/// `override_in_force` is the gate's view of operator overrides for this
/// (tenant, setting) pair, computed inside the same unit of work as the
/// write so a concurrent operator decision cannot be missed. Any operator
/// override at either layer blocks the write, even when the tenant-specific
/// layer would take precedence anyway; self-service must never silently
/// conflict with an operator decision.
pub fn authorize_tenant_write(
    ctx: &CallerContext,
    setting: &Setting,
    override_in_force: Option<ValueSource>,
) -> Result<(), SettingsError> {
    match setting.class() {
        AccessClass::TenantWritable => {}
        AccessClass::TenantReadOnly | AccessClass::SystemOnly => {
            return Err(SettingsError::InsufficientPrivilege(format!(
                "cluster setting '{}' is only settable by the operator",
                setting.name()
            )));
        }
    }
    if let Some(layer) = override_in_force {
        tracing::debug!(
            caller = ctx.caller(),
            tenant = ctx.scope().get(),
            setting = setting.name(),
            ?layer,
            "self-service write blocked by operator override"
        );
        return Err(SettingsError::invalid_parameter(format!(
            "cluster setting '{}' is currently overridden by the operator",
            setting.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        authorize_operator_write, authorize_tenant_write, CallerContext, TenantDirectory,
    };
    use crate::error::SettingsErrorCode;
    use crate::registry::{LookupPurpose, SettingRegistry};
    use crate::resolver::ValueSource;
    use crate::store::{OverrideScope, TenantId};
    use std::collections::BTreeSet;

    struct FixedTenants(BTreeSet<u64>);

    impl FixedTenants {
        fn of(ids: &[u64]) -> FixedTenants {
            FixedTenants(ids.iter().copied().collect())
        }
    }

    impl TenantDirectory for FixedTenants {
        fn exists(&self, tenant: TenantId) -> bool {
            self.0.contains(&tenant.get())
        }
    }

    fn tenant(raw: u64) -> TenantId {
        TenantId::new(raw).expect("tenant id")
    }

    #[test]
    fn operator_role_is_required() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("sql.notices.enabled", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10]);

        let err = authorize_operator_write(
            &CallerContext::tenant("alice", tenant(10)),
            OverrideScope::Tenant(tenant(10)),
            setting,
            &directory,
        )
        .unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::InsufficientPrivilege);
    }

    #[test]
    fn operator_role_outside_the_system_tenant_is_refused() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("sql.notices.enabled", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10, 20]);

        let err = authorize_operator_write(
            &CallerContext::operator_in_tenant("mallory", tenant(20)),
            OverrideScope::Tenant(tenant(10)),
            setting,
            &directory,
        )
        .unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::InsufficientPrivilege);
        assert!(err
            .to_string()
            .contains("can only be called by system operators"));
    }

    #[test]
    fn system_only_settings_are_not_an_override_target() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("kv.snapshot_rebalance.max_rate", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10]);

        let err = authorize_operator_write(
            &CallerContext::operator("root"),
            OverrideScope::Tenant(tenant(10)),
            setting,
            &directory,
        )
        .unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::InsufficientPrivilege);
        assert!(err.to_string().contains("system-only setting"));
    }

    #[test]
    fn version_gate_override_is_unimplemented() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("version", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10]);

        let err = authorize_operator_write(
            &CallerContext::operator("root"),
            OverrideScope::Tenant(tenant(10)),
            setting,
            &directory,
        )
        .unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::Unimplemented);
    }

    #[test]
    fn system_tenant_target_gets_a_hint() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("sql.notices.enabled", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10]);

        let err = authorize_operator_write(
            &CallerContext::operator("root"),
            OverrideScope::Tenant(TenantId::SYSTEM),
            setting,
            &directory,
        )
        .unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::InvalidParameterValue);
        assert_eq!(
            err.hint(),
            Some("Use a regular SET CLUSTER SETTING statement.")
        );
    }

    #[test]
    fn nonexistent_tenant_is_refused() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("sql.notices.enabled", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[10]);

        let err = authorize_operator_write(
            &CallerContext::operator("root"),
            OverrideScope::Tenant(tenant(404)),
            setting,
            &directory,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no tenant found with ID 404"));
    }

    #[test]
    fn all_tenants_target_needs_no_directory_check() {
        let registry = SettingRegistry::builtin();
        let setting = registry
            .lookup("sql.notices.enabled", LookupPurpose::OperatorAccess)
            .expect("lookup");
        let directory = FixedTenants::of(&[]);

        authorize_operator_write(
            &CallerContext::operator("root"),
            OverrideScope::AllTenants,
            setting,
            &directory,
        )
        .expect("authorize");
    }

    #[test]
    fn self_service_is_limited_to_writable_settings() {
        let registry = SettingRegistry::builtin();
        let ctx = CallerContext::tenant("alice", tenant(10));

        let read_only = registry
            .lookup("cluster.organization", LookupPurpose::TenantAccess)
            .expect("lookup");
        let err = authorize_tenant_write(&ctx, read_only, None).unwrap_err();
        assert_eq!(err.code(), SettingsErrorCode::InsufficientPrivilege);
        assert!(err.to_string().contains("only settable by the operator"));

        let writable = registry
            .lookup("sql.notices.enabled", LookupPurpose::TenantAccess)
            .expect("lookup");
        authorize_tenant_write(&ctx, writable, None).expect("authorize");
    }

    #[test]
    fn self_service_is_blocked_under_any_operator_override() {
        let registry = SettingRegistry::builtin();
        let ctx = CallerContext::tenant("alice", tenant(10));
        let writable = registry
            .lookup("sql.notices.enabled", LookupPurpose::TenantAccess)
            .expect("lookup");

        for layer in [ValueSource::TenantSpecific, ValueSource::AllTenants] {
            let err = authorize_tenant_write(&ctx, writable, Some(layer)).unwrap_err();
            assert_eq!(err.code(), SettingsErrorCode::InvalidParameterValue);
            assert!(err.to_string().contains("currently overridden by the operator"));
        }
    }
}
