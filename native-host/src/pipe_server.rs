//! Unix socket front end for local applications.
//!
//! Clients write one JSON record per line, `{"action": "getTabMeta"}`, and
//! read back `{"action": ..., "data": ...}`. `data` is an empty string when
//! the extension did not answer in time.

use crate::config::ServerSettings;
use crate::error::ServerError;
use crate::host::NativeMessagingHost;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Client request line
#[derive(Debug, Deserialize)]
struct PipeRequest {
    action: String,
}

/// Reply line sent back to the client
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PipeReply {
    Data { action: String, data: Value },
    Error { error: String },
}

impl PipeReply {
    fn error(message: impl Into<String>) -> Self {
        PipeReply::Error {
            error: message.into(),
        }
    }
}

/// Relays socket requests to the extension through the host
pub struct PipeServer {
    settings: ServerSettings,
    host: Arc<NativeMessagingHost>,
}

impl PipeServer {
    pub fn new(settings: ServerSettings, host: Arc<NativeMessagingHost>) -> Self {
        Self { settings, host }
    }

    /// Bind the socket and serve clients until the task is dropped
    pub async fn run(&self) -> Result<(), ServerError> {
        self.remove_socket()?;

        let listener = UnixListener::bind(&self.settings.socket_path)?;
        info!("Pipe server listening on {:?}", self.settings.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let host = Arc::clone(&self.host);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, host).await {
                            error!("Client connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.settings.socket_path
    }

    /// Remove the socket file if present
    pub fn remove_socket(&self) -> std::io::Result<()> {
        if self.settings.socket_path.exists() {
            std::fs::remove_file(&self.settings.socket_path)?;
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    host: Arc<NativeMessagingHost>,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        if !line.trim().is_empty() {
            let reply = answer(&host, line.trim()).await;
            let reply_json = serde_json::to_string(&reply)?;
            writer.write_all(reply_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        line.clear();
    }

    debug!("Client disconnected");
    Ok(())
}

async fn answer(host: &NativeMessagingHost, line: &str) -> PipeReply {
    let request = match serde_json::from_str::<PipeRequest>(line) {
        Ok(request) if !request.action.is_empty() => request,
        Ok(_) => return PipeReply::error("Missing action"),
        Err(e) => {
            warn!("Failed to parse client request: {}", e);
            return PipeReply::error(format!("Parse error: {}", e));
        }
    };

    match host.request(&request.action).await {
        Ok(data) => PipeReply::Data {
            action: request.action,
            data: data.unwrap_or_else(|| Value::String(String::new())),
        },
        Err(e) => PipeReply::error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_frame, write_frame};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, split};

    /// Host wired to a fake extension that answers every request
    fn host_with_extension(answering: bool) -> Arc<NativeMessagingHost> {
        let (host_side, browser_side) = duplex(4096);
        let (host_reader, host_writer) = split(host_side);
        let (mut reader, mut writer) = split(browser_side);

        tokio::spawn(async move {
            while let Ok(Some(request)) = read_frame(&mut reader).await {
                if answering {
                    let reply = json!({
                        "action": request["action"],
                        "id": request["id"],
                        "data": {"url": "https://example.com/"}
                    });
                    write_frame(&mut writer, &reply).await.unwrap();
                }
            }
        });

        Arc::new(NativeMessagingHost::start(
            host_reader,
            host_writer,
            Duration::from_millis(50),
        ))
    }

    async fn start_server(host: Arc<NativeMessagingHost>) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("host.sock");
        let server = PipeServer::new(
            ServerSettings {
                socket_path: socket_path.clone(),
            },
            host,
        );
        tokio::spawn(async move { server.run().await });

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        (dir, socket_path)
    }

    async fn exchange(socket_path: &Path, lines: &[&str]) -> Vec<Value> {
        let stream = UnixStream::connect(socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut replies = Vec::new();
        for line in lines {
            writer.write_all(line.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
            let mut reply = String::new();
            reader.read_line(&mut reply).await.unwrap();
            replies.push(serde_json::from_str(&reply).unwrap());
        }
        replies
    }

    #[tokio::test]
    async fn test_relays_request_to_extension() {
        let (_dir, socket_path) = start_server(host_with_extension(true)).await;

        let replies = exchange(&socket_path, &[r#"{"action":"getTabMeta"}"#]).await;
        assert_eq!(
            replies,
            vec![json!({"action": "getTabMeta", "data": {"url": "https://example.com/"}})]
        );
    }

    #[tokio::test]
    async fn test_timeout_yields_empty_data() {
        let (_dir, socket_path) = start_server(host_with_extension(false)).await;

        let replies = exchange(&socket_path, &[r#"{"action":"urlInfo"}"#]).await;
        assert_eq!(replies, vec![json!({"action": "urlInfo", "data": ""})]);
    }

    #[tokio::test]
    async fn test_bad_requests_get_error_replies() {
        let (_dir, socket_path) = start_server(host_with_extension(true)).await;

        let replies = exchange(&socket_path, &["not json", r#"{"action":""}"#]).await;
        assert!(replies[0]["error"]
            .as_str()
            .unwrap()
            .starts_with("Parse error"));
        assert_eq!(replies[1], json!({"error": "Missing action"}));
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("host.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let server = PipeServer::new(
            ServerSettings {
                socket_path: socket_path.clone(),
            },
            host_with_extension(true),
        );
        let handle = tokio::spawn(async move { server.run().await });

        let mut connected = false;
        for _ in 0..100 {
            if UnixStream::connect(&socket_path).await.is_ok() {
                connected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert!(connected);
    }
}
