//! Docker Engine API client
//!
//! Talks to the Engine's HTTP API over TCP. Resource identifiers from the
//! caller are always pushed as escaped path segments, never spliced into the
//! URL string.

use super::{BackendError, ContainerBackend, CreateContainer, NetworkBackend, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Engine API version prefix
const API_VERSION: &str = "v1.43";

/// Docker Engine client
#[derive(Debug, Clone)]
pub struct DockerClient {
    client: Client,
    base: Url,
}

impl DockerClient {
    /// Create a client for `endpoint`, e.g. `http://127.0.0.1:2375`
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|e| BackendError::InvalidParam {
            name: "docker.endpoint".to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidParam {
                name: "docker.endpoint".to_string(),
                reason: format!("'{}' cannot be used as a base URL", endpoint),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    /// Build the URL for an API path
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Internal("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(API_VERSION)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(method = %method, url = %url, "Docker API request");
        Ok(self.client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(response);
        }
        Err(api_error(status, response, what).await)
    }

    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = self.send(request, what).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, request: RequestBuilder, what: &str) -> Result<()> {
        self.send(request, what).await?;
        Ok(())
    }
}

async fn api_error(status: StatusCode, response: Response, what: &str) -> BackendError {
    if status == StatusCode::NOT_FOUND {
        return BackendError::NotFound(what.to_string());
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

fn created_id(body: &Value) -> Result<String> {
    body["Id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BackendError::Internal("create response has no Id".to_string()))
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Split a raw logs body into text
///
/// Containers without a TTY multiplex stdout and stderr into frames with an
/// 8-byte header (stream type, three zero bytes, big-endian length). TTY
/// containers return plain bytes.
pub fn demux_log_stream(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;

    while !rest.is_empty() {
        let framed = rest.len() >= 8 && matches!(rest[0], 0..=2) && rest[1..4] == [0, 0, 0];
        if !framed {
            return String::from_utf8_lossy(raw).into_owned();
        }
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = (8 + len).min(rest.len());
        out.extend_from_slice(&rest[8..end]);
        rest = &rest[end..];
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[async_trait]
impl ContainerBackend for DockerClient {
    async fn list_containers(&self, all: bool) -> Result<Value> {
        let req = self
            .request(Method::GET, &["containers", "json"])?
            .query(&[("all", all)]);
        let body = self.send_json(req, "containers").await?;

        let summary = body
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c["Id"].as_str().map(short_id),
                            "names": c["Names"],
                            "image": c["Image"],
                            "state": c["State"],
                            "status": c["Status"],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Value::Array(summary))
    }

    async fn inspect_container(&self, id: &str) -> Result<Value> {
        let req = self.request(Method::GET, &["containers", id, "json"])?;
        self.send_json(req, &format!("container '{}'", id)).await
    }

    async fn container_logs(&self, id: &str, tail: u64) -> Result<String> {
        let req = self
            .request(Method::GET, &["containers", id, "logs"])?
            .query(&[("stdout", "1"), ("stderr", "1")])
            .query(&[("tail", tail)]);
        let response = self.send(req, &format!("container '{}'", id)).await?;
        let raw = response.bytes().await?;
        Ok(demux_log_stream(&raw))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let req = self.request(Method::POST, &["containers", id, "start"])?;
        self.send_empty(req, &format!("container '{}'", id)).await
    }

    async fn stop_container(&self, id: &str, timeout: Option<u64>) -> Result<()> {
        let mut req = self.request(Method::POST, &["containers", id, "stop"])?;
        if let Some(t) = timeout {
            req = req.query(&[("t", t)]);
        }
        self.send_empty(req, &format!("container '{}'", id)).await
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        let req = self.request(Method::POST, &["containers", id, "restart"])?;
        self.send_empty(req, &format!("container '{}'", id)).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let req = self
            .request(Method::DELETE, &["containers", id])?
            .query(&[("force", force)]);
        self.send_empty(req, &format!("container '{}'", id)).await
    }

    async fn create_container(&self, options: &CreateContainer) -> Result<String> {
        let mut body = json!({ "Image": options.image });
        if !options.command.is_empty() {
            body["Cmd"] = json!(options.command);
        }
        if !options.env.is_empty() {
            body["Env"] = json!(options.env);
        }

        let mut req = self
            .request(Method::POST, &["containers", "create"])?
            .json(&body);
        if let Some(name) = &options.name {
            req = req.query(&[("name", name)]);
        }

        let created = self
            .send_json(req, &format!("image '{}'", options.image))
            .await?;
        created_id(&created)
    }
}

#[async_trait]
impl NetworkBackend for DockerClient {
    async fn list_networks(&self) -> Result<Value> {
        let req = self.request(Method::GET, &["networks"])?;
        let body = self.send_json(req, "networks").await?;

        let summary = body
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|n| {
                        json!({
                            "id": n["Id"].as_str().map(short_id),
                            "name": n["Name"],
                            "driver": n["Driver"],
                            "scope": n["Scope"],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Value::Array(summary))
    }

    async fn inspect_network(&self, id: &str) -> Result<Value> {
        let req = self.request(Method::GET, &["networks", id])?;
        self.send_json(req, &format!("network '{}'", id)).await
    }

    async fn create_network(&self, name: &str, driver: Option<&str>) -> Result<String> {
        let body = json!({
            "Name": name,
            "Driver": driver.unwrap_or("bridge"),
            "CheckDuplicate": true,
        });
        let req = self
            .request(Method::POST, &["networks", "create"])?
            .json(&body);
        let created = self.send_json(req, &format!("network '{}'", name)).await?;
        created_id(&created)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &["networks", id])?;
        self.send_empty(req, &format!("network '{}'", id)).await
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let req = self
            .request(Method::POST, &["networks", network, "connect"])?
            .json(&json!({ "Container": container }));
        self.send_empty(req, &format!("network '{}'", network)).await
    }

    async fn disconnect_network(&self, network: &str, container: &str, force: bool) -> Result<()> {
        let req = self
            .request(Method::POST, &["networks", network, "disconnect"])?
            .json(&json!({ "Container": container, "Force": force }));
        self.send_empty(req, &format!("network '{}'", network)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> DockerClient {
        DockerClient::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_escapes_identifiers() {
        let c = client("http://127.0.0.1:2375");
        let url = c.url(&["containers", "../images/evil", "json"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:2375/v1.43/containers/..%2Fimages%2Fevil/json"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let c = client("http://docker.local:2375/proxy/");
        let url = c.url(&["networks"]).unwrap();
        assert_eq!(url.as_str(), "http://docker.local:2375/proxy/v1.43/networks");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(DockerClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(DockerClient::new("mailto:root@localhost", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_demux_multiplexed_frames() {
        let mut raw = vec![1, 0, 0, 0, 0, 0, 0, 6];
        raw.extend_from_slice(b"hello\n");
        raw.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 5]);
        raw.extend_from_slice(b"oops\n");
        assert_eq!(demux_log_stream(&raw), "hello\noops\n");
    }

    #[test]
    fn test_demux_plain_tty_output() {
        assert_eq!(demux_log_stream(b"plain output\n"), "plain output\n");
        assert_eq!(demux_log_stream(b""), "");
    }

    #[test]
    fn test_demux_truncated_frame() {
        let mut raw = vec![1, 0, 0, 0, 0, 0, 0, 10];
        raw.extend_from_slice(b"abc");
        assert_eq!(demux_log_stream(&raw), "abc");
    }

    #[test]
    fn test_created_id() {
        assert_eq!(created_id(&json!({"Id": "abc123"})).unwrap(), "abc123");
        assert!(created_id(&json!({})).is_err());
    }
}
