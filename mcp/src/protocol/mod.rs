//! MCP protocol implementation
//!
//! JSON-RPC 2.0 message types and the line-delimited transport.

pub mod jsonrpc;
pub mod transport;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use transport::{MessageReader, MessageWriter};
