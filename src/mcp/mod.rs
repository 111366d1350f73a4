//! Model Context Protocol client.
//!
//! MCP servers speak JSON-RPC 2.0 over stdio. This client performs one-shot
//! exchanges: each request spawns the configured server command (for example
//! `docker exec -i mcp-server node index.js`), writes the `initialize`
//! handshake followed by the request as newline-delimited JSON, and picks the
//! matching response from stdout.
//!
//! Responses are decoded into [`McpReply`], so callers match on
//! `Result`/`Error` instead of probing for optional keys.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::McpConfig;
use crate::process::{CommandError, CommandSpec};
use crate::testing::CommandRunner;

/// MCP protocol revision sent during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the MCP client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum McpError {
    /// The server process could not be run.
    #[error("MCP transport failed: {0}")]
    Transport(#[from] CommandError),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Output could not be decoded.
    #[error("Invalid MCP response: {message}")]
    InvalidResponse { message: String },

    /// No response carried the request id.
    #[error("MCP server sent no response for request {id}")]
    NoResponse { id: u64 },
}

impl McpError {
    /// Whether retrying the same request might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::NoResponse { .. } => true,
            Self::Rpc { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    jsonrpc: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// A decoded JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub enum McpReply {
    Result { id: Option<u64>, value: Value },
    Error { id: Option<u64>, error: RpcErrorObject },
}

impl McpReply {
    /// Decode one line of server output.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON, a wrong `jsonrpc` version, or a response that
    /// carries neither `result` nor `error`.
    pub fn parse(line: &str) -> Result<Self, McpError> {
        let raw: RawResponse =
            serde_json::from_str(line).map_err(|e| McpError::InvalidResponse {
                message: e.to_string(),
            })?;
        if raw.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::InvalidResponse {
                message: format!("unsupported jsonrpc version '{}'", raw.jsonrpc),
            });
        }
        match (raw.result, raw.error) {
            (_, Some(error)) => Ok(Self::Error { id: raw.id, error }),
            (Some(value), None) => Ok(Self::Result { id: raw.id, value }),
            (None, None) => Err(McpError::InvalidResponse {
                message: "response has neither result nor error".to_string(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    /// Convert into the result value, mapping error replies to [`McpError::Rpc`].
    pub fn into_result(self) -> Result<Value, McpError> {
        match self {
            Self::Result { value, .. } => Ok(value),
            Self::Error { error, .. } => Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

/// Tool advertised by a server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Resource advertised by a server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Content block in a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Concatenated text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Server identity returned from `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<NamedVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedVersion {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// One-shot stdio MCP client.
pub struct McpClient {
    runner: Arc<dyn CommandRunner>,
    server: CommandSpec,
    next_id: AtomicU64,
}

impl McpClient {
    /// Create a client that launches `server` for every exchange.
    pub fn new(runner: Arc<dyn CommandRunner>, server: CommandSpec) -> Self {
        Self {
            runner,
            server,
            next_id: AtomicU64::new(1),
        }
    }

    /// Client for the configured server command; `None` when none is set.
    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &McpConfig) -> Option<Self> {
        let (program, args) = config.server_command.split_first()?;
        let server = CommandSpec::new(program.as_str()).args(args.iter().map(String::as_str));
        Some(Self::new(runner, server))
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn initialize_params() -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "autodev",
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn encode(request: &McpRequest) -> Result<String, McpError> {
        serde_json::to_string(request).map_err(|e| McpError::InvalidResponse {
            message: e.to_string(),
        })
    }

    /// Run the server with the handshake and the request, returning the
    /// reply whose id matches.
    async fn exchange(&self, method: &str, params: Option<Value>) -> Result<McpReply, McpError> {
        let mut input = String::new();
        if method != "initialize" {
            let init = McpRequest::new(
                self.next_request_id(),
                "initialize",
                Some(Self::initialize_params()),
            );
            input.push_str(&Self::encode(&init)?);
            input.push('\n');
            input.push_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
            input.push('\n');
        }
        let request = McpRequest::new(self.next_request_id(), method, params);
        input.push_str(&Self::encode(&request)?);
        input.push('\n');

        debug!("MCP {} (id={}) via {}", request.method, request.id, self.server);
        let output = self
            .runner
            .run(&self.server.clone().with_stdin(input))
            .await?;

        // Servers may log to stdout; skip lines that are not JSON-RPC.
        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .filter_map(|line| McpReply::parse(line).ok())
            .find(|reply| reply.id() == Some(request.id))
            .ok_or(McpError::NoResponse { id: request.id })
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.exchange(method, params).await?.into_result()
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, McpError> {
        serde_json::from_value(value).map_err(|e| McpError::InvalidResponse {
            message: e.to_string(),
        })
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&self) -> Result<ServerInfo, McpError> {
        let value = self
            .call("initialize", Some(Self::initialize_params()))
            .await?;
        Self::decode(value)
    }

    /// `tools/list`
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        #[derive(Deserialize)]
        struct ToolList {
            #[serde(default)]
            tools: Vec<McpTool>,
        }
        let value = self.call("tools/list", None).await?;
        Ok(Self::decode::<ToolList>(value)?.tools)
    }

    /// `tools/call`
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let value = self
            .call(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Self::decode(value)
    }

    /// `resources/list`
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        #[derive(Deserialize)]
        struct ResourceList {
            #[serde(default)]
            resources: Vec<McpResource>,
        }
        let value = self.call("resources/list", None).await?;
        Ok(Self::decode::<ResourceList>(value)?.resources)
    }
}
