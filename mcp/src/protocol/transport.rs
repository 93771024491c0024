//! Line-delimited JSON transport
//!
//! Each message is a single line of JSON terminated by a newline. Reader and
//! writer are split so responses can be written while requests are still
//! being read.

use super::{JsonRpcRequest, JsonRpcResponse};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// Reads JSON-RPC requests from a buffered reader
pub struct MessageReader<R> {
    inner: R,
    line: String,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
        }
    }

    /// Read the next request
    ///
    /// Returns `None` on EOF. A line that is not a valid request yields an
    /// error of kind [`io::ErrorKind::InvalidData`]; the stream stays usable.
    pub async fn read_request(&mut self) -> io::Result<Option<JsonRpcRequest>> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return match serde_json::from_str(trimmed) {
                Ok(request) => {
                    debug!(request = ?request, "Received JSON-RPC request");
                    Ok(Some(request))
                }
                Err(e) => {
                    error!(error = %e, "Failed to parse JSON-RPC request");
                    Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Invalid JSON: {}", e),
                    ))
                }
            };
        }
    }
}

/// Writes JSON-RPC responses, one per line
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Serialize `response` as one line and flush
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let mut json = serde_json::to_vec(response).map_err(|e| {
            error!(error = %e, "Failed to serialize JSON-RPC response");
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )
        })?;
        json.push(b'\n');

        debug!(id = ?response.id, "Sending JSON-RPC response");

        self.inner.write_all(&json).await?;
        self.inner.flush().await
    }

    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcError, RequestId};

    #[tokio::test]
    async fn test_read_skips_blank_lines() {
        let input: &[u8] = b"\n  \n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut reader = MessageReader::new(input);

        let request = reader.read_request().await.unwrap().unwrap();
        assert_eq!(request.method, "ping");
        assert!(reader.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_end_stream() {
        let input: &[u8] = b"{not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let mut reader = MessageReader::new(input);

        let err = reader.read_request().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let request = reader.read_request().await.unwrap().unwrap();
        assert_eq!(request.id, Some(RequestId::Number(2)));
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":\"a\",")
            .read(b"\"method\":\"tools/list\"}\n")
            .build();
        let mut reader = MessageReader::new(tokio::io::BufReader::new(mock));

        let request = reader.read_request().await.unwrap().unwrap();
        assert_eq!(request.id, Some(RequestId::String("a".to_string())));
        assert_eq!(request.method, "tools/list");
    }

    #[tokio::test]
    async fn test_exact_wire_format() {
        let mock = tokio_test::io::Builder::new()
            .write(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
            .build();
        let mut writer = MessageWriter::new(mock);
        writer
            .write_response(&JsonRpcResponse::success(
                RequestId::Number(1),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_one_line_per_response() {
        let mut writer = MessageWriter::new(Vec::new());
        writer
            .write_response(&JsonRpcResponse::success(
                RequestId::Number(1),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        writer
            .write_response(&JsonRpcResponse::error(
                Some(RequestId::Number(2)),
                JsonRpcError::method_not_found("resources/list"),
            ))
            .await
            .unwrap();

        let out = String::from_utf8(writer.inner).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"result\":{}"));
        assert!(lines[1].contains("-32601"));
        assert!(!lines[1].contains("\"result\""));
    }
}
