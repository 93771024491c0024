//! # Warden MCP Server
//!
//! Model Context Protocol server exposing Docker container, Docker network
//! and libvirt VM administration to automated callers over JSON-RPC 2.0 on
//! stdio.
//!
//! ## Architecture
//!
//! - **Protocol Layer**: JSON-RPC 2.0 types and line-delimited transport
//! - **Control Plane**: [`AccessFilter`], [`ConfirmationTracker`] and
//!   [`AuditLogger`], composed around every call by the [`OperationGate`]
//! - **Handler Layer**: operation descriptors per backend family
//! - **Backend Layer**: Docker Engine API and `virsh` clients
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warden_config::ConfigLoader;
//! use warden_mcp::McpServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::user()?.load()?;
//!     let server = McpServer::from_config(&config)?;
//!     server.serve_stdio().await?;
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod audit;
pub mod backend;
pub mod confirmation;
pub mod context;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use access::AccessFilter;
pub use audit::{AuditError, AuditLogger, AuditRecord, Outcome};
pub use confirmation::{ConfirmationTracker, PendingConfirmation, CONFIRMATION_TTL};
pub use context::McpServerContext;
pub use error::{McpError, Result};
pub use gate::{ConfirmationPrompt, GateResponse, Operation, OperationGate, Params};
pub use handlers::{OperationFamily, OperationRegistry};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, MessageReader, MessageWriter};
pub use server::{McpServer, ServerConfig};
