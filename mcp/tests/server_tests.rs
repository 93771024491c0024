//! End-to-end MCP session tests over an in-memory pipe

mod common;

use common::{FixtureBuilder, SLOW};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;
use warden_mcp::{ConfirmationPrompt, McpServer, ServerConfig};

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<warden_mcp::Result<()>>,
}

impl Client {
    fn start(builder: FixtureBuilder) -> Self {
        let fixture = builder.build();
        let server = McpServer::new(fixture.context, ServerConfig::default());

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(async move {
            server
                .serve(BufReader::new(server_read), server_write)
                .await
        });

        let (read, writer) = tokio::io::split(client_io);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
            server,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = serde_json::to_vec(&message).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response timed out")
            .unwrap()
            .expect("server closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        let response = self.recv().await;
        assert_eq!(response["id"], id);
        response
    }

    async fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> (String, bool) {
        let response = self
            .request(id, "tools/call", json!({"name": name, "arguments": arguments}))
            .await;
        let result = &response["result"];
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        assert_eq!(result["content"][0]["type"], "text");
        (text, result["isError"].as_bool().unwrap())
    }

    /// Close the input and collect whatever the server still writes
    async fn finish(mut self) -> Vec<Value> {
        self.writer.shutdown().await.unwrap();
        drop(self.writer);

        let mut rest = Vec::new();
        while let Some(line) = self.lines.next_line().await.unwrap() {
            rest.push(serde_json::from_str(&line).unwrap());
        }
        self.server.await.unwrap().unwrap();
        rest
    }
}

#[tokio::test]
async fn test_tools_list_matches_catalogue() {
    let mut client = Client::start(FixtureBuilder::new());

    let response = client.request(1, "tools/list", json!({})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 24);
    assert!(names.contains(&"docker_network_disconnect"));
    assert!(names.contains(&"vm_force_stop"));

    let find = |name: &str| tools.iter().find(|t| t["name"] == name).unwrap().clone();

    let remove = find("docker_remove");
    assert!(remove["inputSchema"]["properties"]["confirmation_token"].is_object());
    assert_eq!(remove["inputSchema"]["required"], json!(["container_id"]));

    let logs = find("docker_logs");
    assert!(logs["inputSchema"]["properties"]
        .get("confirmation_token")
        .is_none());

    let create = find("vm_create");
    assert_eq!(create["inputSchema"]["required"], json!(["name", "xml_path"]));

    assert!(client.finish().await.is_empty());
}

#[tokio::test]
async fn test_confirmation_round_trip() {
    let mut client = Client::start(FixtureBuilder::new().allow(&["win*"]));

    let (text, is_error) = client
        .call_tool(1, "vm_delete", json!({"name": "win11"}))
        .await;
    assert!(!is_error);
    assert!(text.starts_with("CONFIRMATION REQUIRED: vm_delete on 'win11'."));
    let token = ConfirmationPrompt::extract_token(&text).unwrap().to_string();

    let (text, is_error) = client
        .call_tool(
            2,
            "vm_delete",
            json!({"name": "win11", "confirmation_token": token}),
        )
        .await;
    assert!(!is_error);
    assert_eq!(text, "Virtual machine 'win11' deleted.");

    let (text, is_error) = client
        .call_tool(3, "vm_delete", json!({"name": "ubuntu"}))
        .await;
    assert!(is_error);
    assert!(text.starts_with("ACCESS DENIED:"));

    assert!(client.finish().await.is_empty());
}

#[tokio::test]
async fn test_tool_call_errors() {
    let mut client = Client::start(FixtureBuilder::new());

    let response = client
        .request(1, "tools/call", json!({"name": "docker_teleport"}))
        .await;
    assert_eq!(response["error"]["code"], -32001);
    assert_eq!(response["error"]["data"]["tool"], "docker_teleport");

    let response = client
        .request(
            2,
            "tools/call",
            json!({"name": "docker_list", "arguments": "all"}),
        )
        .await;
    assert_eq!(response["error"]["code"], -32602);

    let (text, is_error) = client.call_tool(3, "docker_start", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "ERROR: missing required parameter 'container_id'");

    assert!(client.finish().await.is_empty());
}

#[tokio::test]
async fn test_slow_call_does_not_block_others() {
    let mut client = Client::start(FixtureBuilder::new());

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "tools/call",
            "params": {"name": "vm_info", "arguments": {"name": SLOW}}
        }))
        .await;

    let (text, _) = client.call_tool(11, "vm_list", json!({})).await;
    assert!(text.starts_with("Virtual machines:"));

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 10, "reason": "user aborted"}
        }))
        .await;

    let pong = client.request(12, "ping", json!({})).await;
    assert_eq!(pong["result"], json!({}));

    let rest = client.finish().await;
    assert!(
        rest.iter().all(|r| r["id"] != 10),
        "cancelled request must not be answered: {:?}",
        rest
    );
}
