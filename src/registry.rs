use crate::error::SettingsError;
use crate::value::{SettingType, SettingValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Governs who may write a setting. Fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessClass {
    /// Settable only in the system tenant with a regular SET CLUSTER
    /// SETTING; never visible to tenants and not an override target.
    SystemOnly,
    /// Visible to tenants, writable only through the operator override path.
    TenantReadOnly,
    /// Writable by the owning tenant, unless an operator override is in
    /// force.
    TenantWritable,
}

/// Context a registry lookup is performed for. Lookups on behalf of a
/// tenant must not resolve system-only settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupPurpose {
    OperatorAccess,
    TenantAccess,
}

/// An immutable registry entry: name, declared type, access class, default.
#[derive(Debug, Clone)]
pub struct Setting {
    name: String,
    description: String,
    value_type: SettingType,
    class: AccessClass,
    default: SettingValue,
    allowed_values: Option<Vec<String>>,
    version_gate: bool,
}

impl Setting {
    pub fn boolean(
        name: &str,
        description: &str,
        class: AccessClass,
        default: bool,
    ) -> Setting {
        Setting::new(name, description, class, SettingValue::Boolean(default))
    }

    pub fn integer(name: &str, description: &str, class: AccessClass, default: i64) -> Setting {
        Setting::new(name, description, class, SettingValue::Integer(default))
    }

    pub fn float(name: &str, description: &str, class: AccessClass, default: f64) -> Setting {
        Setting::new(name, description, class, SettingValue::Float(default))
    }

    pub fn duration(
        name: &str,
        description: &str,
        class: AccessClass,
        default: Duration,
    ) -> Setting {
        Setting::new(name, description, class, SettingValue::Duration(default))
    }

    pub fn string(name: &str, description: &str, class: AccessClass, default: &str) -> Setting {
        Setting::new(name, description, class, SettingValue::String(default.into()))
    }

    pub fn enumeration(
        name: &str,
        description: &str,
        class: AccessClass,
        default: &str,
        allowed: &[&str],
    ) -> Setting {
        let mut setting = Setting::new(name, description, class, SettingValue::Enum(default.into()));
        setting.allowed_values = Some(allowed.iter().map(|v| v.to_string()).collect());
        setting
    }

    fn new(name: &str, description: &str, class: AccessClass, default: SettingValue) -> Setting {
        Setting {
            name: name.to_ascii_lowercase(),
            description: description.to_string(),
            value_type: default.setting_type(),
            class,
            default,
            allowed_values: None,
            version_gate: false,
        }
    }

    /// Marks this setting as a cluster version/upgrade gate. Version gates
    /// are driven by the upgrade machinery and are never a valid override
    /// target.
    pub fn version_gated(mut self) -> Setting {
        self.version_gate = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value_type(&self) -> SettingType {
        self.value_type
    }

    pub fn class(&self) -> AccessClass {
        self.class
    }

    pub fn default_value(&self) -> &SettingValue {
        &self.default
    }

    pub fn is_version_gate(&self) -> bool {
        self.version_gate
    }

    /// Type-checks `value` against the declared type and produces the
    /// canonical encoded form. Runs strictly before any persistence.
    pub fn encode(&self, value: &SettingValue) -> Result<String, SettingsError> {
        if value.setting_type() != self.value_type {
            return Err(SettingsError::Validation(format!(
                "setting '{}' expects a {} value, got {}",
                self.name,
                self.value_type,
                value.setting_type()
            )));
        }
        if let (SettingValue::Enum(chosen), Some(allowed)) = (value, &self.allowed_values) {
            if !allowed.iter().any(|v| v == chosen) {
                return Err(SettingsError::Validation(format!(
                    "invalid value '{}' for setting '{}', valid values are [{}]",
                    chosen,
                    self.name,
                    allowed.join(", ")
                )));
            }
        }
        Ok(value.encode())
    }
}

/// Static catalog of known settings. Built once at startup and passed by
/// reference into the resolver, gate, and write path; safe for
/// unsynchronized concurrent reads.
#[derive(Debug)]
pub struct SettingRegistry {
    settings: BTreeMap<String, Setting>,
}

#[derive(Debug, Default)]
pub struct SettingRegistryBuilder {
    settings: BTreeMap<String, Setting>,
}

impl SettingRegistryBuilder {
    pub fn register(mut self, setting: Setting) -> Result<SettingRegistryBuilder, SettingsError> {
        if self.settings.contains_key(setting.name()) {
            return Err(SettingsError::Validation(format!(
                "setting '{}' registered twice",
                setting.name()
            )));
        }
        self.settings.insert(setting.name().to_string(), setting);
        Ok(self)
    }

    pub fn build(self) -> SettingRegistry {
        SettingRegistry {
            settings: self.settings,
        }
    }
}

impl SettingRegistry {
    pub fn builder() -> SettingRegistryBuilder {
        SettingRegistryBuilder::default()
    }

    /// The stock catalog served by the controller when the embedder does not
    /// supply its own.
    pub fn builtin() -> SettingRegistry {
        let builder = SettingRegistry::builder()
            .and_register(Setting::boolean(
                "sql.notices.enabled",
                "enable notices in the server/client protocol being sent",
                AccessClass::TenantWritable,
                true,
            ))
            .and_register(Setting::duration(
                "sql.trace.stmt.enable_threshold",
                "enables tracing on all statements; statements executing for longer than \
                 this duration will have their trace logged",
                AccessClass::TenantWritable,
                Duration::ZERO,
            ))
            .and_register(Setting::enumeration(
                "sql.defaults.vectorize",
                "default vectorize mode",
                AccessClass::TenantWritable,
                "on",
                &["on", "off", "experimental_always"],
            ))
            .and_register(Setting::float(
                "sql.stats.cleanup.rows_to_delete_per_txn",
                "fraction of stale statement statistics deleted per cleanup transaction",
                AccessClass::TenantWritable,
                0.2,
            ))
            .and_register(Setting::string(
                "cluster.organization",
                "organization name",
                AccessClass::TenantReadOnly,
                "",
            ))
            .and_register(Setting::boolean(
                "sql.telemetry.query_sampling.enabled",
                "when set to true, executed queries will emit an event on the telemetry \
                 logging channel",
                AccessClass::TenantReadOnly,
                false,
            ))
            .and_register(Setting::integer(
                "kv.snapshot_rebalance.max_rate",
                "the rate limit (bytes/sec) to use for rebalance and upreplication snapshots",
                AccessClass::SystemOnly,
                32 << 20,
            ))
            .and_register(Setting::duration(
                "server.shutdown.drain_wait",
                "the amount of time a server waits in an unready state before draining",
                AccessClass::SystemOnly,
                Duration::ZERO,
            ))
            .and_register(
                Setting::string(
                    "version",
                    "set the active cluster version in the format '<major>.<minor>'",
                    AccessClass::TenantReadOnly,
                    "22.1",
                )
                .version_gated(),
            );
        builder.build()
    }

    /// Case-insensitive lookup. A lookup performed for a tenant context
    /// refuses to resolve system-only settings; they are reported as unknown
    /// so their existence is not leaked across the tenant boundary.
    pub fn lookup(&self, name: &str, purpose: LookupPurpose) -> Result<&Setting, SettingsError> {
        let key = name.to_ascii_lowercase();
        let setting = self
            .settings
            .get(&key)
            .ok_or_else(|| SettingsError::UnknownSetting(key.clone()))?;
        if purpose == LookupPurpose::TenantAccess && setting.class == AccessClass::SystemOnly {
            return Err(SettingsError::UnknownSetting(key));
        }
        Ok(setting)
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }
}

impl SettingRegistryBuilder {
    /// Panicking register for static catalogs whose names are known unique.
    fn and_register(self, setting: Setting) -> SettingRegistryBuilder {
        match self.register(setting) {
            Ok(builder) => builder,
            Err(err) => panic!("builtin catalog registration failed: {err}"),
        }
    }
}
