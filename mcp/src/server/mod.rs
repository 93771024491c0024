//! MCP server implementation
//!
//! Reads requests on one task and handles each `tools/call` on its own task,
//! so a slow backend call never blocks other requests. Responses share a
//! single writer and are emitted one line at a time.

pub mod tools;

use crate::context::McpServerContext;
use crate::error::{McpError, Result};
use crate::gate::{GateResponse, Params};
use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, MessageReader, MessageWriter, RequestId,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_config::WardenConfig;

pub use tools::ToolDefinition;

/// MCP protocol revision implemented by this server
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const INSTRUCTIONS: &str = "Tools manage Docker containers, Docker networks and libvirt \
virtual machines. Resources outside the configured access rules are refused with \
ACCESS DENIED. Destructive tools first answer CONFIRMATION REQUIRED with a single-use \
token; repeat the call with confirmation_token set to that token within five minutes \
to proceed. Failures start with ERROR.";

type SharedWriter<W> = Arc<AsyncMutex<MessageWriter<W>>>;

/// MCP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "warden".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            name: config.server.name.clone(),
            ..Self::default()
        }
    }
}

/// MCP server
#[derive(Clone)]
pub struct McpServer {
    context: Arc<McpServerContext>,
    config: Arc<ServerConfig>,
    in_flight: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
}

impl McpServer {
    pub fn new(context: McpServerContext, config: ServerConfig) -> Self {
        info!(
            server = config.name,
            version = config.version,
            tools = context.registry.operations().count(),
            audit = context.gate.audit_enabled(),
            "MCP server initialized"
        );

        Self {
            context: Arc::new(context),
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the server with its backends from configuration
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        Ok(Self::new(
            McpServerContext::from_config(config)?,
            ServerConfig::from_config(config),
        ))
    }

    pub fn context(&self) -> &McpServerContext {
        &self.context
    }

    /// Serve requests over stdio
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("MCP server listening on stdio");
        self.serve(tokio::io::BufReader::new(io::stdin()), io::stdout())
            .await
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`
    ///
    /// Returns once the input is exhausted and every in-flight call has
    /// finished.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer: SharedWriter<W> = Arc::new(AsyncMutex::new(MessageWriter::new(writer)));
        let mut incoming = spawn_reader(reader);
        let mut tasks = JoinSet::new();

        loop {
            let message = tokio::select! {
                message = incoming.recv() => message,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                    continue;
                }
            };

            match message {
                Some(Ok(request)) => self.dispatch(request, &writer, &mut tasks).await?,
                Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    writer.lock().await.write_response(&response).await?;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("Client disconnected");
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        writer.lock().await.close().await?;
        Ok(())
    }

    async fn dispatch<W>(
        &self,
        request: JsonRpcRequest,
        writer: &SharedWriter<W>,
        tasks: &mut JoinSet<()>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return Ok(());
        };

        if request.jsonrpc != "2.0" {
            let e = McpError::Protocol(format!("unsupported version '{}'", request.jsonrpc));
            let response = JsonRpcResponse::error(Some(id), e.to_jsonrpc());
            writer.lock().await.write_response(&response).await?;
            return Ok(());
        }

        if request.method == "tools/call" {
            let cancel = CancellationToken::new();
            self.in_flight.lock().insert(id.clone(), cancel.clone());

            let server = self.clone();
            let writer = writer.clone();
            tasks.spawn(async move {
                let result = server.handle_tool_call(request.params, &cancel).await;
                server.in_flight.lock().remove(&id);

                if cancel.is_cancelled() {
                    debug!(%id, "Request cancelled, no response sent");
                    return;
                }
                let response = match result {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => {
                        warn!(error = %e, "Tool call failed");
                        JsonRpcResponse::error(Some(id), e.to_jsonrpc())
                    }
                };
                if let Err(e) = writer.lock().await.write_response(&response).await {
                    error!(error = %e, "Failed to write response");
                }
            });
            return Ok(());
        }

        let response = self.handle_request(request, id).await;
        writer.lock().await.write_response(&response).await?;
        Ok(())
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/cancelled" => {
                let id = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .and_then(|v| serde_json::from_value::<RequestId>(v).ok());
                match id {
                    Some(id) => match self.in_flight.lock().get(&id) {
                        Some(token) => {
                            info!(%id, "Cancelling request");
                            token.cancel();
                        }
                        None => debug!(%id, "Cancellation for unknown request"),
                    },
                    None => warn!("Cancellation without a valid requestId"),
                }
            }
            "notifications/initialized" => debug!("Client initialized"),
            method => debug!(method, "Ignoring notification"),
        }
    }

    /// Handle a request that is answered inline
    async fn handle_request(&self, request: JsonRpcRequest, id: RequestId) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            _ => Err(McpError::MethodNotFound(request.method.clone())),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                warn!(error = %e, "Request failed");
                JsonRpcResponse::error(Some(id), e.to_jsonrpc())
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let client = params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client, "Received initialize request");

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.config.name,
                "version": self.config.version
            },
            "instructions": INSTRUCTIONS
        }))
    }

    fn handle_tools_list(&self) -> Result<Value> {
        Ok(json!({
            "tools": tools::get_all_tools(&self.context.registry)
        }))
    }

    /// Handle tools/call
    async fn handle_tool_call(
        &self,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let params =
            params.ok_or_else(|| McpError::InvalidParams("Missing parameters".to_string()))?;

        let tool_name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("Missing tool name".to_string()))?;

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(McpError::InvalidParams(
                    "arguments must be an object".to_string(),
                ))
            }
        };

        let (family, op) = self
            .context
            .registry
            .find(tool_name)
            .ok_or_else(|| McpError::UnknownTool(tool_name.to_string()))?;

        info!(tool = tool_name, family = family.name, "Calling tool");

        let response = self
            .context
            .gate
            .invoke(&family.tracker, op, Params::new(arguments), cancel)
            .await;

        if matches!(response, GateResponse::Cancelled) {
            debug!(tool = tool_name, "Call cancelled before execution");
        }

        Ok(json!({
            "content": [{
                "type": "text",
                "text": response.text()
            }],
            "isError": response.is_error()
        }))
    }
}

/// Read requests on a dedicated task so the serve loop can wait on
/// requests and finished calls at the same time
fn spawn_reader<R>(reader: R) -> mpsc::Receiver<io::Result<JsonRpcRequest>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut reader = MessageReader::new(reader);
        loop {
            let message = match reader.read_request().await {
                Ok(Some(request)) => Ok(request),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            let fatal = matches!(&message, Err(e) if e.kind() != io::ErrorKind::InvalidData);
            if tx.send(message).await.is_err() || fatal {
                break;
            }
        }
    });
    rx
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Request task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessFilter;
    use crate::gate::OperationGate;
    use crate::handlers::OperationRegistry;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn server() -> McpServer {
        let gate = OperationGate::new(
            AccessFilter::new(["*"], Vec::<String>::new()),
            None,
            Duration::from_secs(5),
        );
        McpServer::new(
            McpServerContext::new(gate, OperationRegistry::new()),
            ServerConfig::default(),
        )
    }

    async fn exchange(lines: &[&str]) -> Vec<Value> {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = server();
        let handle =
            tokio::spawn(async move { server.serve(BufReader::new(server_read), server_write).await });

        let (client_read, mut client_write) = tokio::io::split(client);
        for line in lines {
            client_write.write_all(line.as_bytes()).await.unwrap();
            client_write.write_all(b"\n").await.unwrap();
        }
        client_write.shutdown().await.unwrap();
        drop(client_write);

        let mut responses = Vec::new();
        let mut reader = BufReader::new(client_read).lines();
        while let Some(line) = reader.next_line().await.unwrap() {
            responses.push(serde_json::from_str(&line).unwrap());
        }
        handle.await.unwrap().unwrap();
        responses
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let responses = exchange(&[
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{"name":"t"}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        ])
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "warden");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let responses = exchange(&[
            "{garbage",
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope"}}"#,
            r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#,
        ])
        .await;

        assert_eq!(responses.len(), 4);
        let code = |id: Value| {
            responses
                .iter()
                .find(|r| r["id"] == id)
                .map(|r| r["error"]["code"].clone())
                .unwrap()
        };
        assert_eq!(code(Value::Null), -32700);
        assert_eq!(code(json!(1)), -32601);
        assert_eq!(code(json!(2)), -32001);
        assert_eq!(code(json!(3)), -32600);
    }
}
