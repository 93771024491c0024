//! MCP server context
//!
//! Holds the operation gate and the registry of operation families. Built
//! once at startup and shared by every request.

use crate::access::AccessFilter;
use crate::audit::AuditLogger;
use crate::backend::{DockerClient, VirshClient};
use crate::error::{McpError, Result};
use crate::gate::OperationGate;
use crate::handlers::{container_ops, network_ops, vm_ops, OperationRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warden_config::WardenConfig;

/// Shared server state
#[derive(Debug)]
pub struct McpServerContext {
    pub gate: OperationGate,
    pub registry: OperationRegistry,
}

impl McpServerContext {
    pub fn new(gate: OperationGate, registry: OperationRegistry) -> Self {
        Self { gate, registry }
    }

    /// Build the gate and all backend families from configuration
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        let filter = AccessFilter::from_config(&config.access);

        let audit = match &config.audit.path {
            Some(path) => {
                let logger = AuditLogger::open(path).map_err(|e| {
                    McpError::Internal(format!(
                        "failed to open audit log {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(path = %path.display(), "Audit logging enabled");
                Some(Arc::new(logger))
            }
            None => {
                info!("Audit logging disabled");
                None
            }
        };

        let gate = OperationGate::new(
            filter,
            audit,
            Duration::from_secs(config.server.call_timeout_secs),
        );

        let docker = Arc::new(
            DockerClient::new(
                &config.docker.endpoint,
                Duration::from_secs(config.docker.timeout_secs),
            )
            .map_err(|e| McpError::Internal(format!("invalid Docker endpoint: {}", e)))?,
        );
        let virsh = Arc::new(VirshClient::from_config(&config.vm));

        let registry = OperationRegistry::new()
            .with(container_ops::family(
                docker.clone(),
                config.docker.destructive.iter().cloned(),
            ))
            .with(network_ops::family(
                docker,
                config.network.destructive.iter().cloned(),
            ))
            .with(vm_ops::family(virsh, config.vm.destructive.iter().cloned()));

        info!(
            tools = registry.operations().count(),
            endpoint = %config.docker.endpoint,
            "Operation registry built"
        );

        Ok(Self::new(gate, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let context = McpServerContext::from_config(&WardenConfig::default()).unwrap();
        assert!(!context.gate.audit_enabled());

        let (family, op) = context.registry.find("docker_remove").unwrap();
        assert_eq!(family.name, "containers");
        assert!(family.is_destructive(op));

        let (family, op) = context.registry.find("vm_info").unwrap();
        assert_eq!(family.name, "vms");
        assert!(!family.is_destructive(op));

        assert!(context.registry.find("docker_network_connect").is_some());
        assert!(context.registry.find("docker_teleport").is_none());
    }

    #[test]
    fn test_audit_path_opens_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WardenConfig::default();
        config.audit.path = Some(dir.path().join("audit.jsonl"));

        let context = McpServerContext::from_config(&config).unwrap();
        assert!(context.gate.audit_enabled());
    }

    #[test]
    fn test_bad_endpoint_is_rejected() {
        let mut config = WardenConfig::default();
        config.docker.endpoint = "not a url".to_string();
        assert!(McpServerContext::from_config(&config).is_err());
    }
}
