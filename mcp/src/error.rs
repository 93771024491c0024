//! Error types for the MCP server

use crate::protocol::JsonRpcError;
use thiserror::Error;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;

/// MCP server errors
///
/// These are protocol-level failures. Outcomes of a gated tool call
/// (denial, confirmation prompt, backend failure) are not errors at this
/// level; they travel back as tool results.
#[derive(Debug, Error)]
pub enum McpError {
    /// Protocol error (invalid JSON-RPC)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Tool name not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] warden_config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Convert to JSON-RPC error
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            McpError::Protocol(msg) => JsonRpcError::invalid_request(msg),
            McpError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            McpError::InvalidParams(msg) => JsonRpcError::invalid_params(msg),
            McpError::UnknownTool(name) => JsonRpcError::unknown_tool(name),
            McpError::Json(e) => JsonRpcError::invalid_params(e.to_string()),
            McpError::Config(e) => JsonRpcError::internal_error(e.to_string()),
            McpError::Io(e) => JsonRpcError::internal_error(e.to_string()),
            McpError::Internal(msg) => JsonRpcError::internal_error(msg),
        }
    }
}
