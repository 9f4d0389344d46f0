//! robundle configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `config.json`
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation

pub mod resolve;
pub mod settings;
pub mod validate;

pub use resolve::{load_config, resolve_config, ConfigPaths, ConfigSource};
pub use settings::{ArchiveSettings, BundleConfig, Compression, OverwritePolicy, StoreSettings};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
