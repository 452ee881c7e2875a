//! Govern Common - Shared configuration, errors, and logging for the governance tools.
//!
//! This crate provides:
//! - Configuration types and loading (file, environment, overrides)
//! - Configuration validation
//! - The error taxonomy shared by the core and the CLI
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    ApiConfig, Config, IdentityConfig, LoggingConfig, MirrorConfig, NotifyConfig, OperationMode,
    WaitConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

