//! Configuration validation.
//!
//! Checks that the values the core relies on are present and within range
//! before any store is touched.

use thiserror::Error;

use crate::config::{ApiConfig, Config, MirrorConfig, NotifyConfig, WaitConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.api.validate(),
            self.mirror.validate(),
            self.wait.validate(),
            self.notify.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ApiConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "api.base_url".into(),
            });
        }

        let parsed = url::Url::parse(&self.base_url).map_err(|e| ValidationError::InvalidValue {
            field: "api.base_url".into(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidValue {
                field: "api.base_url".into(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "api.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for MirrorConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.approvals_dir.as_os_str().is_empty() {
            return Err(ValidationError::MissingField {
                field: "mirror.approvals_dir".into(),
            });
        }
        Ok(())
    }
}

impl Validate for WaitConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "wait.poll_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for NotifyConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.command.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "notify.command".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "notify.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}
