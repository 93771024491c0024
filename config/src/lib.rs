//! Warden Configuration
//!
//! Loads the TOML configuration consumed by the Warden MCP server: resource
//! access patterns, the audit sink, and per-backend settings including the
//! set of operations that require confirmation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use warden_config::ConfigLoader;
//!
//! let config = ConfigLoader::system().load().unwrap();
//! println!("deny patterns: {:?}", config.access.deny);
//! ```
//!
//! # File Layout
//!
//! ```toml
//! [server]
//! call_timeout_secs = 60
//!
//! [access]
//! allow = ["plex*", "sonarr"]
//! deny = ["unraid-*"]
//!
//! [audit]
//! path = "/var/log/warden/audit.jsonl"
//!
//! [docker]
//! endpoint = "http://127.0.0.1:2375"
//!
//! [vm]
//! connect_uri = "qemu:///system"
//! ```

pub mod error;
pub mod loader;
pub mod settings;

pub use error::{ConfigError, Result};
pub use loader::{env_vars, paths, validate_config, ConfigLoader};
pub use settings::{
    AccessSection, AuditSection, DockerSection, NetworkSection, ServerSection, VmSection,
    WardenConfig,
};
