use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Closed set of value types a cluster setting can carry.
///
/// The type is persisted alongside every override row as a tag so that a
/// later read can decode the row without consulting the registry's declared
/// type at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingType {
    #[serde(rename = "b")]
    Boolean,
    #[serde(rename = "i")]
    Integer,
    #[serde(rename = "f")]
    Float,
    #[serde(rename = "d")]
    Duration,
    #[serde(rename = "s")]
    String,
    #[serde(rename = "e")]
    Enum,
}

impl SettingType {
    /// Short wire tag, one character per type.
    pub fn tag(self) -> &'static str {
        match self {
            SettingType::Boolean => "b",
            SettingType::Integer => "i",
            SettingType::Float => "f",
            SettingType::Duration => "d",
            SettingType::String => "s",
            SettingType::Enum => "e",
        }
    }
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingType::Boolean => "boolean",
            SettingType::Integer => "integer",
            SettingType::Float => "float",
            SettingType::Duration => "duration",
            SettingType::String => "string",
            SettingType::Enum => "enumeration",
        };
        write!(f, "{name}")
    }
}

/// A typed setting value, either a registry default or a decoded override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Duration(Duration),
    String(String),
    Enum(String),
}

impl SettingValue {
    pub fn setting_type(&self) -> SettingType {
        match self {
            SettingValue::Boolean(_) => SettingType::Boolean,
            SettingValue::Integer(_) => SettingType::Integer,
            SettingValue::Float(_) => SettingType::Float,
            SettingValue::Duration(_) => SettingType::Duration,
            SettingValue::String(_) => SettingType::String,
            SettingValue::Enum(_) => SettingType::Enum,
        }
    }

    /// Canonical string encoding. `decode` with the matching type tag
    /// round-trips exactly.
    pub fn encode(&self) -> String {
        match self {
            SettingValue::Boolean(v) => v.to_string(),
            SettingValue::Integer(v) => v.to_string(),
            SettingValue::Float(v) => v.to_string(),
            SettingValue::Duration(v) => format_duration(*v),
            SettingValue::String(v) => v.clone(),
            SettingValue::Enum(v) => v.clone(),
        }
    }

    /// Decodes the canonical string form of a value of type `ty`.
    pub fn decode(ty: SettingType, raw: &str) -> Result<SettingValue, SettingsError> {
        match ty {
            SettingType::Boolean => match raw {
                "true" => Ok(SettingValue::Boolean(true)),
                "false" => Ok(SettingValue::Boolean(false)),
                _ => Err(decode_error(ty, raw)),
            },
            SettingType::Integer => raw
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| decode_error(ty, raw)),
            SettingType::Float => raw
                .parse::<f64>()
                .map(SettingValue::Float)
                .map_err(|_| decode_error(ty, raw)),
            SettingType::Duration => parse_duration(raw).map(SettingValue::Duration),
            SettingType::String => Ok(SettingValue::String(raw.to_string())),
            SettingType::Enum => Ok(SettingValue::Enum(raw.to_string())),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

fn decode_error(ty: SettingType, raw: &str) -> SettingsError {
    SettingsError::Validation(format!("could not parse '{raw}' as type {ty}"))
}

// (nanoseconds per unit, suffix), largest first; encoding picks the largest
// unit that divides the value evenly.
const DURATION_UNITS: &[(u128, &str)] = &[
    (3_600_000_000_000, "h"),
    (60_000_000_000, "m"),
    (1_000_000_000, "s"),
    (1_000_000, "ms"),
    (1_000, "us"),
    (1, "ns"),
];

fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    for (scale, suffix) in DURATION_UNITS {
        if nanos % scale == 0 {
            return format!("{}{suffix}", nanos / scale);
        }
    }
    unreachable!("every duration is a whole number of nanoseconds")
}

fn parse_duration(raw: &str) -> Result<Duration, SettingsError> {
    // Longer suffixes first so "250ms" does not strip as "250m" + "s".
    const SUFFIXES: &[&str] = &["ns", "us", "ms", "s", "m", "h"];
    let suffix = SUFFIXES
        .iter()
        .find(|s| raw.ends_with(*s))
        .ok_or_else(|| decode_error(SettingType::Duration, raw))?;
    let digits = &raw[..raw.len() - suffix.len()];
    let count: u64 = digits
        .parse()
        .map_err(|_| decode_error(SettingType::Duration, raw))?;
    let scale = DURATION_UNITS
        .iter()
        .find(|(_, s)| s == suffix)
        .map(|(scale, _)| *scale)
        .unwrap_or(1);
    let nanos = u128::from(count)
        .checked_mul(scale)
        .filter(|n| *n <= u128::from(u64::MAX))
        .ok_or_else(|| {
            SettingsError::Validation(format!("duration '{raw}' is out of range"))
        })?;
    Ok(Duration::from_nanos(nanos as u64))
}
