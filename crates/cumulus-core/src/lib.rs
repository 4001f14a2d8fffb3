//! Core types, configuration, and error handling for the CumulusCI toolkit.
//!
//! This crate provides the shared foundation used by all other Cumulus crates:
//! - [`CumulusError`]: unified error type using `thiserror`
//! - [`CumulusConfig`]: configuration loaded from `.cumulus.toml` and the environment
//! - [`ReleaseVersion`]: package version numbers and their release tag names

mod config;
mod error;
mod version;

pub use config::{
    ApexConfig, CumulusConfig, GitHubConfig, PackageConfig, PushConfig, ReleaseConfig,
    SalesforceConfig,
};
pub use error::CumulusError;
pub use version::{ReleaseVersion, TagPrefixes};

/// A convenience `Result` type for Cumulus operations.
pub type Result<T> = std::result::Result<T, CumulusError>;
