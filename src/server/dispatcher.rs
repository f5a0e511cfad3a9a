//! Request routing
//!
//! [`Dispatcher`] turns one inbound JSON-RPC line into at most one outbound
//! line. For `tools/call` it walks the full pipeline: resolve the tool,
//! validate arguments, obtain a credential covering the tool's scopes, and
//! run the handler on its own task under the per-call deadline. Only handler
//! execution is bounded by the concurrency limit; protocol methods and
//! requests waiting for a credential never queue behind it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::task::AbortOnDropHandle;
use tracing::Instrument;

use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    INVALID_REQUEST, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_INITIALIZED,
    METHOD_NOT_FOUND, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PARSE_ERROR,
};
use crate::auth::CredentialManager;
use crate::error::{kind_of, ErrorKind, GoogleMcpError, Result};
use crate::tools::ToolRegistry;

/// Protocol revisions this server can speak.
const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[LATEST_PROTOCOL_VERSION, "2025-03-26", "2024-11-05"];

/// Routes JSON-RPC messages to protocol handlers and tools.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    credentials: Arc<CredentialManager>,
    call_timeout: Duration,
    call_permits: Arc<Semaphore>,
    server_info: Implementation,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    ///
    /// Handler concurrency is unbounded until
    /// [`with_max_concurrent_calls`](Self::with_max_concurrent_calls) is used.
    pub fn new(
        registry: Arc<ToolRegistry>,
        credentials: Arc<CredentialManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            credentials,
            call_timeout,
            call_permits: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Limits how many tool handlers run at once.
    pub fn with_max_concurrent_calls(mut self, max_concurrent: usize) -> Self {
        let permits = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        self.call_permits = Arc::new(Semaphore::new(permits));
        self
    }

    /// The tool table.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handles one raw inbound line.
    ///
    /// Returns the serialized response, or `None` for notifications and
    /// blank lines. Never fails: every error becomes a JSON-RPC error
    /// response.
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Value>(raw) {
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable message");
                Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ))
            }
            Ok(value) => self.handle_value(value).await,
        }?;

        match serde_json::to_string(&response) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        let outcome = match request.method.as_str() {
            METHOD_INITIALIZE => self.initialize(request.params),
            METHOD_PING => Ok(serde_json::json!({})),
            METHOD_TOOLS_LIST => self.list_tools(),
            METHOD_TOOLS_CALL => self.call_tool(&id, request.params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            METHOD_INITIALIZED => tracing::info!("Client initialized"),
            other => tracing::debug!(method = %other, "Ignoring notification"),
        }
    }

    fn initialize(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::from_kind(ErrorKind::InvalidArguments, e.to_string()))?
            .unwrap_or_default();

        let protocol_version = params
            .protocol_version
            .filter(|requested| SUPPORTED_PROTOCOL_VERSIONS.contains(&requested.as_str()))
            .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = %client.version,
                protocol_version = %protocol_version,
                "Initialize"
            );
        }

        to_result(&InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
        })
    }

    fn list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        to_result(&ListToolsResult {
            tools: self.registry.definitions(),
        })
    }

    async fn call_tool(
        &self,
        id: &Value,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| "missing params".to_string())
            .and_then(|p| serde_json::from_value(p).map_err(|e| e.to_string()))
            .map_err(|e| {
                JsonRpcError::from_kind(
                    ErrorKind::InvalidArguments,
                    format!("Invalid tools/call params: {e}"),
                )
            })?;

        let span = tracing::info_span!("tool_call", id = %id, tool = %params.name);
        let started = Instant::now();
        let outcome = self
            .invoke(&params.name, params.arguments.unwrap_or_else(|| serde_json::json!({})))
            .instrument(span.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        span.in_scope(|| match outcome {
            Ok(value) => {
                tracing::info!(elapsed_ms, "Tool call succeeded");
                to_result(&CallToolResult::from_value(value))
            }
            Err(e) => {
                let kind = kind_of(&e);
                tracing::warn!(elapsed_ms, kind = %kind, error = %e, "Tool call failed");
                Err(JsonRpcError::from_kind(kind, format!("{e:#}")))
            }
        })
    }

    /// Runs a single tool through resolution, validation, authorization,
    /// and invocation.
    ///
    /// # Errors
    ///
    /// Any error in the taxonomy. A handler panic is reported as an
    /// `Internal` error; a handler that outlives the call timeout is aborted
    /// and reported as [`GoogleMcpError::Timeout`].
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let descriptor = self.registry.resolve(name)?;
        self.registry.check_arguments(name, &arguments)?;

        let credential = self
            .credentials
            .get_valid_credential(&descriptor.required_scopes)
            .await?;

        let _permit = Arc::clone(&self.call_permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("dispatcher is shutting down"))?;
        let handler = Arc::clone(&descriptor.handler);
        // Dropping the handle aborts the handler, on timeout or when this
        // request is itself cancelled.
        let task = AbortOnDropHandle::new(tokio::spawn(
            async move { handler.invoke(arguments, &credential).await }.in_current_span(),
        ));

        match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(anyhow::anyhow!("tool '{}' panicked", name))
            }
            Ok(Err(join_error)) => Err(anyhow::anyhow!(
                "tool '{}' was cancelled: {}",
                name,
                join_error
            )),
            Err(_) => Err(GoogleMcpError::Timeout {
                seconds: self.call_timeout.as_secs(),
            }
            .into()),
        }
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::from_kind(ErrorKind::Internal, e.to_string()))
}
