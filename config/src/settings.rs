//! Warden configuration types
//!
//! Every section is optional in the TOML file; missing sections and keys
//! fall back to the defaults defined here.

use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete Warden configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// MCP server settings
    pub server: ServerSection,
    /// Resource allow/deny patterns
    pub access: AccessSection,
    /// Audit trail destination
    pub audit: AuditSection,
    /// Docker container backend
    pub docker: DockerSection,
    /// Docker network operations
    pub network: NetworkSection,
    /// Virtual machine backend
    pub vm: VmSection,
}

impl WardenConfig {
    /// Load configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the configuration back to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `WARDEN_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(crate::env_vars::DOCKER_ENDPOINT) {
            if !endpoint.is_empty() {
                self.docker.endpoint = endpoint;
            }
        }
        if let Ok(path) = std::env::var(crate::env_vars::AUDIT_LOG) {
            self.audit.path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Name reported in the MCP `initialize` response
    pub name: String,
    /// Upper bound for a single backend call, in seconds
    pub call_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "warden".to_string(),
            call_timeout_secs: 60,
        }
    }
}

/// `[access]` section
///
/// Shell-style glob patterns matched against resource names. Deny patterns
/// always win; an empty allow list allows everything not denied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSection {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// `[audit]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Append-only audit file. Auditing is disabled when unset.
    pub path: Option<PathBuf>,
}

/// `[docker]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSection {
    /// Docker Engine API endpoint
    pub endpoint: String,
    /// HTTP request timeout, in seconds
    pub timeout_secs: u64,
    /// Container operations that require confirmation
    pub destructive: Vec<String>,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:2375".to_string(),
            timeout_secs: 30,
            destructive: [
                "docker_stop",
                "docker_restart",
                "docker_remove",
                "docker_create",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// `[network]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Network operations that require confirmation
    pub destructive: Vec<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            destructive: [
                "docker_network_create",
                "docker_network_remove",
                "docker_network_connect",
                "docker_network_disconnect",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// `[vm]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSection {
    /// Path to the virsh binary
    pub virsh_path: PathBuf,
    /// libvirt connection URI passed as `--connect`
    pub connect_uri: Option<String>,
    /// VM operations that require confirmation
    pub destructive: Vec<String>,
}

impl Default for VmSection {
    fn default() -> Self {
        Self {
            virsh_path: PathBuf::from("virsh"),
            connect_uri: None,
            destructive: [
                "vm_stop",
                "vm_force_stop",
                "vm_restart",
                "vm_create",
                "vm_delete",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
