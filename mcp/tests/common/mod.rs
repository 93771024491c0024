//! Fake backends and fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use warden_config::WardenConfig;
use warden_mcp::backend::{
    BackendError, ContainerBackend, CreateContainer, NetworkBackend, Result, VmBackend,
};
use warden_mcp::handlers::{container_ops, network_ops, vm_ops};
use warden_mcp::{AccessFilter, AuditLogger, McpServerContext, OperationGate, OperationRegistry};

/// Identifier that makes a fake backend call hang
pub const SLOW: &str = "slow";

/// Identifier the fake backends report as missing
pub const GHOST: &str = "ghost";

/// Records every backend call as `"<method> <args>"`
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

async fn lookup(kind: &str, id: &str) -> Result<()> {
    if id == GHOST {
        return Err(BackendError::NotFound(format!("{} '{}'", kind, id)));
    }
    if id == SLOW {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct FakeDocker {
    pub log: CallLog,
}

#[async_trait]
impl ContainerBackend for FakeDocker {
    async fn list_containers(&self, all: bool) -> Result<Value> {
        self.log.push(format!("list_containers {}", all));
        Ok(json!([{"id": "4f2a9c1e0b3d", "name": "plex-media", "state": "running"}]))
    }

    async fn inspect_container(&self, id: &str) -> Result<Value> {
        self.log.push(format!("inspect_container {}", id));
        lookup("container", id).await?;
        Ok(json!({"Name": format!("/{}", id), "State": {"Running": true}}))
    }

    async fn container_logs(&self, id: &str, tail: u64) -> Result<String> {
        self.log.push(format!("container_logs {} {}", id, tail));
        lookup("container", id).await?;
        Ok("listening on :32400\n".to_string())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.log.push(format!("start_container {}", id));
        lookup("container", id).await
    }

    async fn stop_container(&self, id: &str, timeout: Option<u64>) -> Result<()> {
        self.log.push(format!("stop_container {} {:?}", id, timeout));
        lookup("container", id).await
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        self.log.push(format!("restart_container {}", id));
        lookup("container", id).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.log.push(format!("remove_container {} {}", id, force));
        lookup("container", id).await
    }

    async fn create_container(&self, options: &CreateContainer) -> Result<String> {
        self.log.push(format!(
            "create_container {} {}",
            options.image,
            options.name.as_deref().unwrap_or("-")
        ));
        Ok("9b1e77d0c4a2".to_string())
    }
}

#[async_trait]
impl NetworkBackend for FakeDocker {
    async fn list_networks(&self) -> Result<Value> {
        self.log.push("list_networks".to_string());
        Ok(json!([{"id": "a1b2c3d4e5f6", "name": "bridge"}]))
    }

    async fn inspect_network(&self, id: &str) -> Result<Value> {
        self.log.push(format!("inspect_network {}", id));
        lookup("network", id).await?;
        Ok(json!({"Name": id, "Driver": "bridge"}))
    }

    async fn create_network(&self, name: &str, driver: Option<&str>) -> Result<String> {
        self.log
            .push(format!("create_network {} {}", name, driver.unwrap_or("-")));
        Ok("f00dfacecafe".to_string())
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.log.push(format!("remove_network {}", id));
        lookup("network", id).await
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        self.log
            .push(format!("connect_network {} {}", network, container));
        lookup("network", network).await
    }

    async fn disconnect_network(&self, network: &str, container: &str, force: bool) -> Result<()> {
        self.log
            .push(format!("disconnect_network {} {} {}", network, container, force));
        lookup("network", network).await
    }
}

#[derive(Debug, Default)]
pub struct FakeVirsh {
    pub log: CallLog,
}

#[async_trait]
impl VmBackend for FakeVirsh {
    async fn list_domains(&self) -> Result<Value> {
        self.log.push("list_domains".to_string());
        Ok(json!([{"id": "1", "name": "win11", "state": "running"}]))
    }

    async fn domain_info(&self, name: &str) -> Result<Value> {
        self.log.push(format!("domain_info {}", name));
        lookup("domain", name).await?;
        Ok(json!({"name": name, "state": "running"}))
    }

    async fn start_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("start_domain {}", name));
        lookup("domain", name).await
    }

    async fn pause_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("pause_domain {}", name));
        lookup("domain", name).await
    }

    async fn resume_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("resume_domain {}", name));
        lookup("domain", name).await
    }

    async fn shutdown_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("shutdown_domain {}", name));
        lookup("domain", name).await
    }

    async fn destroy_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("destroy_domain {}", name));
        lookup("domain", name).await
    }

    async fn reboot_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("reboot_domain {}", name));
        lookup("domain", name).await
    }

    async fn create_domain(&self, name: &str, xml_path: &str) -> Result<()> {
        self.log.push(format!("create_domain {} {}", name, xml_path));
        Ok(())
    }

    async fn undefine_domain(&self, name: &str) -> Result<()> {
        self.log.push(format!("undefine_domain {}", name));
        lookup("domain", name).await
    }
}

/// A server context wired to fake backends
pub struct Fixture {
    pub context: McpServerContext,
    pub docker: Arc<FakeDocker>,
    pub virsh: Arc<FakeVirsh>,
}

pub struct FixtureBuilder {
    allow: Vec<String>,
    deny: Vec<String>,
    audit: Option<Arc<AuditLogger>>,
    call_timeout: Duration,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            audit: None,
            call_timeout: Duration::from_secs(5),
        }
    }

    pub fn allow(mut self, patterns: &[&str]) -> Self {
        self.allow = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn deny(mut self, patterns: &[&str]) -> Self {
        self.deny = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn audit_to(mut self, path: &Path) -> Self {
        self.audit = Some(Arc::new(AuditLogger::open(path).unwrap()));
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn build(self) -> Fixture {
        let defaults = WardenConfig::default();
        let docker = Arc::new(FakeDocker::default());
        let virsh = Arc::new(FakeVirsh::default());

        let registry = OperationRegistry::new()
            .with(container_ops::family(
                docker.clone(),
                defaults.docker.destructive.clone(),
            ))
            .with(network_ops::family(
                docker.clone(),
                defaults.network.destructive.clone(),
            ))
            .with(vm_ops::family(virsh.clone(), defaults.vm.destructive.clone()));

        let gate = OperationGate::new(
            AccessFilter::new(&self.allow, &self.deny),
            self.audit,
            self.call_timeout,
        );

        Fixture {
            context: McpServerContext::new(gate, registry),
            docker,
            virsh,
        }
    }
}

/// Read every record from an audit file
pub fn audit_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
