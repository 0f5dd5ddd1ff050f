use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::McpServerConfig;
use crate::mcp::protocol::{
    CallToolResult, Incoming, InitializeResult, ListToolsResult, Notification, Request,
    ReviewRequest, ServerInfo, ToolInfo, JSONRPC_VERSION, PROTOCOL_VERSION, REVIEW_TOOL,
};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP server command is not configured")]
    MissingCommand,
    #[error("Invalid MCP server arguments: {0}")]
    InvalidArgs(String),
    #[error("Failed to start MCP server '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("MCP server closed the connection")]
    Closed,
    #[error("MCP server did not answer '{0}' in time")]
    Timeout(String),
    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("MCP tool failed: {0}")]
    Tool(String),
    #[error("Unexpected MCP payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type McpResult<T> = std::result::Result<T, McpError>;

pub struct McpClient {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    request_timeout: Duration,
    server_info: Option<ServerInfo>,
}

impl McpClient {
    /// Spawns the server and completes the `initialize` handshake.
    pub async fn connect(config: &McpServerConfig) -> McpResult<Self> {
        let command = config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(McpError::MissingCommand)?;
        let args = config
            .args()
            .map_err(|e| McpError::InvalidArgs(e.to_string()))?;

        debug!(command, ?args, "Starting MCP server");
        let mut child = Command::new(command)
            .args(&args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        let mut client = McpClient {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            request_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            server_info: None,
        };

        let init: InitializeResult = client
            .send_request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "prdesk",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        client.send_notification("notifications/initialized").await?;

        if let Some(server) = &init.server_info {
            info!(
                server = %server.name,
                protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                "Connected to MCP server"
            );
        }
        client.server_info = init.server_info;
        Ok(client)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub async fn list_tools(&mut self) -> McpResult<Vec<ToolInfo>> {
        let result: ListToolsResult = self.send_request("tools/list", json!({})).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let result: CallToolResult = self
            .send_request(
                "tools/call",
                json!({
                    "name": name,
                    "arguments": arguments,
                }),
            )
            .await?;
        if result.is_error {
            return Err(McpError::Tool(result.first_text()));
        }
        Ok(result)
    }

    /// Calls the review tool and returns its first text item.
    pub async fn request_review(&mut self, request: &ReviewRequest) -> McpResult<String> {
        let result = self
            .call_tool(REVIEW_TOOL, serde_json::to_value(request)?)
            .await?;
        Ok(result.first_text())
    }

    pub async fn disconnect(mut self) {
        let _ = self.stdin.shutdown().await;
        if let Err(err) = self.child.kill().await {
            debug!(error = %err, "MCP server already exited");
        }
    }

    async fn send_request<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> McpResult<T> {
        let id = self.next_id;
        self.next_id += 1;
        self.write_message(&Request {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        })
        .await?;

        let value = timeout(self.request_timeout, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout(method.to_string()))??;
        Ok(serde_json::from_value(value)?)
    }

    async fn send_notification(&mut self, method: &str) -> McpResult<()> {
        self.write_message(&Notification {
            jsonrpc: JSONRPC_VERSION,
            method,
        })
        .await
    }

    async fn write_message<T: serde::Serialize>(&mut self, message: &T) -> McpResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self, id: u64) -> McpResult<Value> {
        loop {
            let line = self.stdout.next_line().await?.ok_or(McpError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: Incoming = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(err) => {
                    debug!(error = %err, "Skipping non JSON-RPC output from MCP server");
                    continue;
                }
            };

            if let Some(method) = &message.method {
                debug!(method, "Ignoring server-initiated MCP message");
                continue;
            }
            if message.id.as_ref().and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = message.error {
                return Err(McpError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(message.result.unwrap_or(Value::Null));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::McpArgs;
    use crate::mcp::protocol::PullRequestInfo;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FAKE_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      echo "not json, just noise"
      printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0.1"}}}'
      ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"tools":[{"name":"review_pull_request"},{"name":"echo","description":"Echo"}]}}'
      ;;
    *'"name":"review_pull_request"'*)
      case "$line" in
        *'"pr_number":7'*) printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"content":[{"type":"text","text":"{\"summary\":\"from '"$REVIEWER_NAME"'\"}"}]}}' ;;
        *) printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"isError":true,"content":[{"type":"text","text":"bad pr"}]}}' ;;
      esac
      ;;
    *'"name":"slow"'*)
      sleep 5
      ;;
    *)
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"error":{"code":-32601,"message":"Method not found"}}'
      ;;
  esac
done
"#;

    fn server_config(timeout_secs: u64) -> (NamedTempFile, McpServerConfig) {
        let mut script = NamedTempFile::new().unwrap();
        script.write_all(FAKE_SERVER.as_bytes()).unwrap();
        let config = McpServerConfig {
            command: Some("sh".into()),
            args: McpArgs::List(vec![script.path().display().to_string()]),
            env: [("REVIEWER_NAME".to_string(), "fake-mcp".to_string())]
                .into_iter()
                .collect(),
            timeout_secs,
        };
        (script, config)
    }

    fn review_request(pr_number: u64) -> ReviewRequest {
        ReviewRequest {
            owner: "acme".into(),
            repo: "widgets".into(),
            pr_number,
            files: vec![],
            pull_request: PullRequestInfo {
                title: "t".into(),
                body: None,
            },
            custom_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_handshake_list_and_review() {
        let (_script, config) = server_config(10);
        let mut client = McpClient::connect(&config).await.unwrap();
        assert_eq!(client.server_info().unwrap().name, "fake");

        let tools = client.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["review_pull_request", "echo"]);

        let text = client.request_review(&review_request(7)).await.unwrap();
        assert_eq!(text, r#"{"summary":"from fake-mcp"}"#);

        let err = client.request_review(&review_request(8)).await.unwrap_err();
        assert!(matches!(err, McpError::Tool(ref msg) if msg == "bad pr"));

        let err = client.call_tool("unknown", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (_script, config) = server_config(1);
        let mut client = McpClient::connect(&config).await.unwrap();
        let err = client.call_tool("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout(_)));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let missing = McpServerConfig::default();
        assert!(matches!(
            McpClient::connect(&missing).await,
            Err(McpError::MissingCommand)
        ));

        let bogus = McpServerConfig {
            command: Some("/nonexistent/prdesk-mcp-server".into()),
            ..Default::default()
        };
        assert!(matches!(
            McpClient::connect(&bogus).await,
            Err(McpError::Spawn { .. })
        ));
    }
}
