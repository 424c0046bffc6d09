use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsErrorCode {
    InsufficientPrivilege,
    InvalidParameterValue,
    UnknownSetting,
    Validation,
    Unimplemented,
    AssertionFailed,
}

impl SettingsErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingsErrorCode::InsufficientPrivilege => "insufficient_privilege",
            SettingsErrorCode::InvalidParameterValue => "invalid_parameter_value",
            SettingsErrorCode::UnknownSetting => "unknown_setting",
            SettingsErrorCode::Validation => "validation",
            SettingsErrorCode::Unimplemented => "unimplemented",
            SettingsErrorCode::AssertionFailed => "assertion_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),
    #[error("invalid parameter value: {message}")]
    InvalidParameterValue {
        message: String,
        hint: Option<String>,
    },
    #[error("unknown cluster setting '{0}'")]
    UnknownSetting(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unimplemented: {message} (tracking issue #{issue})")]
    Unimplemented { message: String, issue: u32 },
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

impl SettingsError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SettingsError::InvalidParameterValue {
            message: message.into(),
            hint: None,
        }
    }

    pub fn code(&self) -> SettingsErrorCode {
        match self {
            SettingsError::InsufficientPrivilege(_) => SettingsErrorCode::InsufficientPrivilege,
            SettingsError::InvalidParameterValue { .. } => SettingsErrorCode::InvalidParameterValue,
            SettingsError::UnknownSetting(_) => SettingsErrorCode::UnknownSetting,
            SettingsError::Validation(_) => SettingsErrorCode::Validation,
            SettingsError::Unimplemented { .. } => SettingsErrorCode::Unimplemented,
            SettingsError::AssertionFailed(_) => SettingsErrorCode::AssertionFailed,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Usage hint attached to the error, when one exists. Surfaced to the
    /// client alongside the message.
    pub fn hint(&self) -> Option<&str> {
        match self {
            SettingsError::InvalidParameterValue { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}
