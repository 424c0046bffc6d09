use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tenant_settings::audit::{MemoryAuditSink, RESET_REPORTED_VALUE};
use tenant_settings::gate::{CallerContext, TenantDirectory};
use tenant_settings::registry::SettingRegistry;
use tenant_settings::resolver::ValueSource;
use tenant_settings::store::{OverrideScope, TenantId};
use tenant_settings::value::SettingValue;
use tenant_settings::SettingsController;

struct FixedTenants(BTreeSet<u64>);

impl TenantDirectory for FixedTenants {
    fn exists(&self, tenant: TenantId) -> bool {
        self.0.contains(&tenant.get())
    }
}

fn tenant(raw: u64) -> TenantId {
    TenantId::new(raw).expect("tenant id")
}

fn controller_with(tenants: &[u64]) -> (SettingsController, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let controller = SettingsController::new(
        SettingRegistry::builtin(),
        Arc::new(FixedTenants(tenants.iter().copied().collect())),
        audit.clone(),
    );
    (controller, audit)
}

fn effective_bool(controller: &SettingsController, t: TenantId, name: &str) -> bool {
    match controller
        .show_setting(&CallerContext::tenant("app", t), name)
        .expect("show")
        .value
    {
        SettingValue::Boolean(v) => v,
        other => panic!("expected boolean, got {other:?}"),
    }
}

/// The full precedence walk: default, tenant-specific override, reset,
/// all-tenant override, tenant-specific winning over all-tenant, blocked
/// self-service, all-tenant reset with the specific override still in
/// force.
#[test]
fn precedence_scenario() {
    let (controller, _audit) = controller_with(&[10, 1234]);
    let root = CallerContext::operator("root");
    let t10 = tenant(10);

    assert!(effective_bool(&controller, t10, "sql.notices.enabled"));

    controller
        .set_tenant_override(
            &root,
            OverrideScope::Tenant(t10),
            "sql.notices.enabled",
            SettingValue::Boolean(false),
        )
        .expect("set tenant 10");
    assert!(!effective_bool(&controller, t10, "sql.notices.enabled"));

    controller
        .reset_tenant_override(&root, OverrideScope::Tenant(t10), "sql.notices.enabled")
        .expect("reset tenant 10");
    assert!(effective_bool(&controller, t10, "sql.notices.enabled"));

    controller
        .set_tenant_override(
            &root,
            OverrideScope::AllTenants,
            "sql.notices.enabled",
            SettingValue::Boolean(false),
        )
        .expect("set all tenants");
    assert!(!effective_bool(&controller, t10, "sql.notices.enabled"));

    controller
        .set_tenant_override(
            &root,
            OverrideScope::Tenant(t10),
            "sql.notices.enabled",
            SettingValue::Boolean(true),
        )
        .expect("set tenant 10 over all-tenant");
    assert!(effective_bool(&controller, t10, "sql.notices.enabled"));

    // Self-service is refused while either operator layer is in force.
    let err = controller
        .set_setting(
            &CallerContext::tenant("app", t10),
            "sql.notices.enabled",
            SettingValue::Boolean(false),
        )
        .unwrap_err();
    assert!(err.to_string().contains("currently overridden by the operator"));

    controller
        .reset_tenant_override(&root, OverrideScope::AllTenants, "sql.notices.enabled")
        .expect("reset all tenants");
    // Tenant-specific override still wins.
    assert!(effective_bool(&controller, t10, "sql.notices.enabled"));
    let resolved = controller
        .show_setting(&CallerContext::tenant("app", t10), "sql.notices.enabled")
        .expect("show");
    assert_eq!(resolved.source, ValueSource::TenantSpecific);
}

#[test]
fn set_then_show_round_trips_every_type() {
    let (controller, _audit) = controller_with(&[10]);
    let root = CallerContext::operator("root");
    let target = OverrideScope::Tenant(tenant(10));
    let reader = CallerContext::tenant("app", tenant(10));

    let cases = [
        ("sql.notices.enabled", SettingValue::Boolean(false)),
        (
            "sql.trace.stmt.enable_threshold",
            SettingValue::Duration(Duration::from_millis(250)),
        ),
        ("sql.defaults.vectorize", SettingValue::Enum("off".into())),
        (
            "sql.stats.cleanup.rows_to_delete_per_txn",
            SettingValue::Float(0.5),
        ),
        (
            "cluster.organization",
            SettingValue::String("Initech".into()),
        ),
    ];
    for (name, value) in cases {
        controller
            .set_tenant_override(&root, target, name, value.clone())
            .expect("set");
        let resolved = controller.show_setting(&reader, name).expect("show");
        assert_eq!(resolved.value, value, "round trip for {name}");
        assert!(resolved.is_overridden());
    }
}

#[test]
fn reset_without_an_override_is_a_no_op() {
    let (controller, audit) = controller_with(&[10]);
    let root = CallerContext::operator("root");

    controller
        .reset_tenant_override(&root, OverrideScope::Tenant(tenant(10)), "sql.notices.enabled")
        .expect("reset with nothing to reset");
    assert!(effective_bool(&controller, tenant(10), "sql.notices.enabled"));

    // The reset is still an administrative action and is audited.
    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reported_value, RESET_REPORTED_VALUE);
}

#[test]
fn audit_records_describe_each_write() {
    let (controller, audit) = controller_with(&[10]);
    let root = CallerContext::operator("root");

    controller
        .set_tenant_override(
            &root,
            OverrideScope::Tenant(tenant(10)),
            "SQL.Notices.Enabled",
            SettingValue::Boolean(false),
        )
        .expect("set tenant 10");
    controller
        .set_tenant_override(
            &root,
            OverrideScope::AllTenants,
            "sql.notices.enabled",
            SettingValue::Boolean(false),
        )
        .expect("set all tenants");
    controller
        .reset_tenant_override(&root, OverrideScope::AllTenants, "sql.notices.enabled")
        .expect("reset all tenants");

    let events = audit.events();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].setting_name, "sql.notices.enabled");
    assert_eq!(events[0].reported_value, "false");
    assert_eq!(events[0].tenant_id, 10);
    assert!(!events[0].all_tenants);

    assert_eq!(events[1].tenant_id, 0);
    assert!(events[1].all_tenants);

    assert_eq!(events[2].reported_value, RESET_REPORTED_VALUE);
    assert!(events[2].all_tenants);
}

#[test]
fn self_service_value_applies_until_overridden() {
    let (controller, audit) = controller_with(&[10]);
    let app = CallerContext::tenant("app", tenant(10));
    let root = CallerContext::operator("root");

    controller
        .set_setting(&app, "sql.defaults.vectorize", SettingValue::Enum("off".into()))
        .expect("self-service set");
    let resolved = controller
        .show_setting(&app, "sql.defaults.vectorize")
        .expect("show");
    assert_eq!(resolved.source, ValueSource::SelfService);
    assert_eq!(resolved.value, SettingValue::Enum("off".into()));
    assert!(!resolved.is_overridden());
    assert_eq!(audit.events().last().expect("event").tenant_id, 10);

    // The operator's all-tenant decision takes precedence over the
    // tenant's own value.
    controller
        .set_tenant_override(
            &root,
            OverrideScope::AllTenants,
            "sql.defaults.vectorize",
            SettingValue::Enum("experimental_always".into()),
        )
        .expect("operator set");
    let resolved = controller
        .show_setting(&app, "sql.defaults.vectorize")
        .expect("show");
    assert_eq!(resolved.source, ValueSource::AllTenants);

    // And once the override is lifted the tenant's value resurfaces.
    controller
        .reset_tenant_override(&root, OverrideScope::AllTenants, "sql.defaults.vectorize")
        .expect("operator reset");
    let resolved = controller
        .show_setting(&app, "sql.defaults.vectorize")
        .expect("show");
    assert_eq!(resolved.source, ValueSource::SelfService);
    assert_eq!(resolved.value, SettingValue::Enum("off".into()));
}

#[test]
fn destroying_a_tenant_drops_only_its_rows() {
    let (controller, _audit) = controller_with(&[10, 1234]);
    let root = CallerContext::operator("root");
    let doomed = tenant(1234);

    controller
        .set_tenant_override(
            &root,
            OverrideScope::Tenant(doomed),
            "sql.notices.enabled",
            SettingValue::Boolean(false),
        )
        .expect("set doomed tenant");
    controller
        .set_setting(
            &CallerContext::tenant("app", doomed),
            "sql.defaults.vectorize",
            SettingValue::Enum("off".into()),
        )
        .expect("self-service set");
    controller
        .set_tenant_override(
            &root,
            OverrideScope::AllTenants,
            "sql.trace.stmt.enable_threshold",
            SettingValue::Duration(Duration::from_secs(1)),
        )
        .expect("set all tenants");

    {
        let txn = controller.store().begin();
        assert_eq!(txn.count_overrides_for_scope(OverrideScope::Tenant(doomed)), 1);
        assert_eq!(txn.count_locals_for_tenant(doomed), 1);
    }

    controller.on_tenant_destroyed(doomed);

    let txn = controller.store().begin();
    assert_eq!(txn.count_overrides_for_scope(OverrideScope::Tenant(doomed)), 0);
    assert_eq!(txn.count_locals_for_tenant(doomed), 0);
    assert_eq!(txn.count_overrides_for_scope(OverrideScope::AllTenants), 1);
    drop(txn);

    // Running the hook again is harmless.
    controller.on_tenant_destroyed(doomed);
}
