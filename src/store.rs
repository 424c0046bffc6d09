use crate::error::SettingsError;
use crate::value::SettingType;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::time::{SystemTime, UNIX_EPOCH};

/// A validated tenant identifier. Zero is not representable; the reserved
/// "all tenants" pseudo-scope is expressed by [`OverrideScope::AllTenants`]
/// instead of overloading an integer value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TenantId(NonZeroU64);

impl TenantId {
    /// The system tenant hosting the operator surface.
    pub const SYSTEM: TenantId = TenantId(NonZeroU64::MIN);

    pub fn new(raw: u64) -> Result<TenantId, SettingsError> {
        NonZeroU64::new(raw)
            .map(TenantId)
            .ok_or_else(|| SettingsError::invalid_parameter("tenant ID must be non-zero"))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target scope of an operator override row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum OverrideScope {
    AllTenants,
    Tenant(TenantId),
}

impl OverrideScope {
    pub fn is_all_tenants(self) -> bool {
        matches!(self, OverrideScope::AllTenants)
    }

    /// Numeric form used in persisted rows and audit events; 0 encodes the
    /// all-tenant pseudo-scope.
    pub fn numeric(self) -> u64 {
        match self {
            OverrideScope::AllTenants => 0,
            OverrideScope::Tenant(id) => id.get(),
        }
    }
}

/// One persisted settings row. At most one record exists per
/// (namespace, scope, setting name); a write replaces, never duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub scope: OverrideScope,
    pub setting_name: String,
    pub encoded_value: String,
    pub value_type: SettingType,
    /// Microseconds since the epoch, non-decreasing per key.
    pub last_updated_micros: u64,
}

type RowKey = (OverrideScope, String);

/// Operator override rows and tenant-local self-service rows live in
/// separate namespaces: an operator override for a tenant and that tenant's
/// own value for the same setting are distinct rows with distinct
/// lifecycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Overrides,
    Locals,
}

#[derive(Debug, Default)]
struct Tables {
    overrides: BTreeMap<RowKey, OverrideRecord>,
    locals: BTreeMap<RowKey, OverrideRecord>,
}

impl Tables {
    fn table(&self, ns: Namespace) -> &BTreeMap<RowKey, OverrideRecord> {
        match ns {
            Namespace::Overrides => &self.overrides,
            Namespace::Locals => &self.locals,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut BTreeMap<RowKey, OverrideRecord> {
        match ns {
            Namespace::Overrides => &mut self.overrides,
            Namespace::Locals => &mut self.locals,
        }
    }
}

/// Durable mapping from (scope, setting name) to override rows.
///
/// The single mutex is the serialization point required by the concurrency
/// model: a unit of work holds the guard for its whole lifetime, so the
/// existence check, the authorization decision, and the mutation all observe
/// one consistent snapshot.
#[derive(Debug, Default)]
pub struct OverrideStore {
    tables: Mutex<Tables>,
}

#[derive(Debug)]
enum StagedOp {
    Upsert(Namespace, OverrideRecord),
    Delete(Namespace, OverrideScope, String),
    DeleteScope(Namespace, OverrideScope),
}

/// Explicit unit-of-work handle. Mutations are staged and become visible to
/// other units of work only on [`OverrideTxn::commit`]; dropping the handle
/// discards them. Reads within the unit of work observe its own staged
/// mutations.
#[derive(Debug)]
pub struct OverrideTxn<'a> {
    tables: MutexGuard<'a, Tables>,
    staged: Vec<StagedOp>,
}

impl OverrideStore {
    pub fn new() -> OverrideStore {
        OverrideStore::default()
    }

    pub fn begin(&self) -> OverrideTxn<'_> {
        OverrideTxn {
            tables: self.tables.lock(),
            staged: Vec::new(),
        }
    }
}

impl OverrideTxn<'_> {
    pub fn get_override(&self, scope: OverrideScope, name: &str) -> Option<OverrideRecord> {
        self.get(Namespace::Overrides, scope, name)
    }

    pub fn get_local(&self, tenant: TenantId, name: &str) -> Option<OverrideRecord> {
        self.get(Namespace::Locals, OverrideScope::Tenant(tenant), name)
    }

    pub fn upsert_override(
        &mut self,
        scope: OverrideScope,
        name: &str,
        encoded_value: String,
        value_type: SettingType,
    ) {
        self.upsert(Namespace::Overrides, scope, name, encoded_value, value_type);
    }

    pub fn upsert_local(
        &mut self,
        tenant: TenantId,
        name: &str,
        encoded_value: String,
        value_type: SettingType,
    ) {
        self.upsert(
            Namespace::Locals,
            OverrideScope::Tenant(tenant),
            name,
            encoded_value,
            value_type,
        );
    }

    /// Deletes the override row if present; absence is not an error.
    /// Returns whether a row existed.
    pub fn delete_override(&mut self, scope: OverrideScope, name: &str) -> bool {
        self.delete(Namespace::Overrides, scope, name)
    }

    pub fn delete_local(&mut self, tenant: TenantId, name: &str) -> bool {
        self.delete(Namespace::Locals, OverrideScope::Tenant(tenant), name)
    }

    /// Removes every row scoped to `tenant` in both namespaces. The
    /// all-tenant pseudo-scope is not reachable from here: no single tenant
    /// owns it. Returns the number of rows scheduled for removal.
    pub fn delete_all_for_tenant(&mut self, tenant: TenantId) -> usize {
        let scope = OverrideScope::Tenant(tenant);
        let mut removed = 0;
        for ns in [Namespace::Overrides, Namespace::Locals] {
            removed += self
                .tables
                .table(ns)
                .keys()
                .filter(|(s, _)| *s == scope)
                .count();
            self.staged.push(StagedOp::DeleteScope(ns, scope));
        }
        removed
    }

    pub fn count_overrides_for_scope(&self, scope: OverrideScope) -> usize {
        self.count(Namespace::Overrides, scope)
    }

    pub fn count_locals_for_tenant(&self, tenant: TenantId) -> usize {
        self.count(Namespace::Locals, OverrideScope::Tenant(tenant))
    }

    /// Publishes the staged mutations. Until this point no other unit of
    /// work can observe them.
    pub fn commit(mut self) {
        let staged = std::mem::take(&mut self.staged);
        for op in staged {
            match op {
                StagedOp::Upsert(ns, record) => {
                    let key = (record.scope, record.setting_name.clone());
                    self.tables.table_mut(ns).insert(key, record);
                }
                StagedOp::Delete(ns, scope, name) => {
                    self.tables.table_mut(ns).remove(&(scope, name));
                }
                StagedOp::DeleteScope(ns, scope) => {
                    self.tables.table_mut(ns).retain(|(s, _), _| *s != scope);
                }
            }
        }
    }

    fn get(&self, ns: Namespace, scope: OverrideScope, name: &str) -> Option<OverrideRecord> {
        // Staged ops shadow committed rows, latest first.
        for op in self.staged.iter().rev() {
            match op {
                StagedOp::Upsert(n, record)
                    if *n == ns && record.scope == scope && record.setting_name == name =>
                {
                    return Some(record.clone());
                }
                StagedOp::Delete(n, s, nm) if *n == ns && *s == scope && nm == name => {
                    return None;
                }
                StagedOp::DeleteScope(n, s) if *n == ns && *s == scope => return None,
                _ => {}
            }
        }
        self.tables
            .table(ns)
            .get(&(scope, name.to_string()))
            .cloned()
    }

    fn upsert(
        &mut self,
        ns: Namespace,
        scope: OverrideScope,
        name: &str,
        encoded_value: String,
        value_type: SettingType,
    ) {
        let previous = self.get(ns, scope, name);
        let floor = previous.map(|r| r.last_updated_micros).unwrap_or(0);
        self.staged.push(StagedOp::Upsert(
            ns,
            OverrideRecord {
                scope,
                setting_name: name.to_string(),
                encoded_value,
                value_type,
                last_updated_micros: now_micros().max(floor),
            },
        ));
    }

    fn delete(&mut self, ns: Namespace, scope: OverrideScope, name: &str) -> bool {
        let existed = self.get(ns, scope, name).is_some();
        self.staged
            .push(StagedOp::Delete(ns, scope, name.to_string()));
        existed
    }

    fn count(&self, ns: Namespace, scope: OverrideScope) -> usize {
        self.tables
            .table(ns)
            .keys()
            .filter(|(s, name)| *s == scope && self.get(ns, scope, name).is_some())
            .count()
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
