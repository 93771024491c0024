//! Resource manager backends
//!
//! The gate treats these as opaque "perform this action on this resource"
//! capabilities. Concrete implementations talk to the Docker Engine HTTP
//! API and to libvirt through `virsh`.

pub mod docker;
pub mod virsh;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use docker::DockerClient;
pub use virsh::VirshClient;

/// Result type for backend calls
pub type Result<T> = std::result::Result<T, BackendError>;

/// Backend failures, surfaced to the caller as `ERROR:` payloads
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("missing required parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

/// Options for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainer {
    pub image: String,
    pub name: Option<String>,
    pub command: Vec<String>,
    pub env: Vec<String>,
}

/// Container lifecycle operations
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    async fn list_containers(&self, all: bool) -> Result<Value>;

    async fn inspect_container(&self, id: &str) -> Result<Value>;

    /// Last `tail` lines of stdout and stderr
    async fn container_logs(&self, id: &str, tail: u64) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop, waiting `timeout` seconds before killing
    async fn stop_container(&self, id: &str, timeout: Option<u64>) -> Result<()>;

    async fn restart_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Create a container and return its id
    async fn create_container(&self, options: &CreateContainer) -> Result<String>;
}

/// Container network operations
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn list_networks(&self) -> Result<Value>;

    async fn inspect_network(&self, id: &str) -> Result<Value>;

    /// Create a network and return its id
    async fn create_network(&self, name: &str, driver: Option<&str>) -> Result<String>;

    async fn remove_network(&self, id: &str) -> Result<()>;

    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;

    async fn disconnect_network(&self, network: &str, container: &str, force: bool) -> Result<()>;
}

/// Virtual machine lifecycle operations
#[async_trait]
pub trait VmBackend: Send + Sync {
    async fn list_domains(&self) -> Result<Value>;

    async fn domain_info(&self, name: &str) -> Result<Value>;

    async fn start_domain(&self, name: &str) -> Result<()>;

    async fn pause_domain(&self, name: &str) -> Result<()>;

    async fn resume_domain(&self, name: &str) -> Result<()>;

    /// Graceful ACPI shutdown
    async fn shutdown_domain(&self, name: &str) -> Result<()>;

    /// Immediate power-off
    async fn destroy_domain(&self, name: &str) -> Result<()>;

    async fn reboot_domain(&self, name: &str) -> Result<()>;

    /// Define a domain from an XML file and start it
    async fn create_domain(&self, name: &str, xml_path: &str) -> Result<()>;

    /// Remove the domain definition
    async fn undefine_domain(&self, name: &str) -> Result<()>;
}
