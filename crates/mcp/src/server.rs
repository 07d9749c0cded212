//! [`PermissionMcpServer`] — the rmcp [`ServerHandler`] implementation backing
//! the in-process permission-prompt endpoint (§4.5).
//!
//! Each running session gets its own instance, bound to its own ephemeral
//! port via [`serve_session`], so the handler never needs to disambiguate
//! which chat session a tool call belongs to — it already knows, by
//! construction. Tool execution is delegated to whatever implements
//! [`PermissionCore`]; nothing about the MCP wire format leaks past this
//! file.

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpService, StreamableHttpServerConfig};
use rmcp::ErrorData as McpError;
use sa_domain::model::ApprovalDecisionPayload;

/// Implemented by the Approval Rendezvous core (C5); the MCP layer never
/// sees anything but `{tool_name, input}` in and a decision payload out.
#[async_trait::async_trait]
pub trait PermissionCore: Send + Sync + 'static {
    async fn request_permission(
        &self,
        session_external_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> ApprovalDecisionPayload;
}

#[derive(Clone)]
pub struct PermissionMcpServer {
    session_external_id: Arc<str>,
    tool_name: Arc<str>,
    core: Arc<dyn PermissionCore>,
}

impl PermissionMcpServer {
    pub fn new(session_external_id: String, tool_name: String, core: Arc<dyn PermissionCore>) -> Self {
        Self {
            session_external_id: session_external_id.into(),
            tool_name: tool_name.into(),
            core,
        }
    }

    fn tool_schema(&self) -> McpTool {
        let input_schema: JsonObject = serde_json::json!({
            "type": "object",
            "properties": {
                "tool_name": { "type": "string" },
                "input": { "type": "object" },
            },
            "required": ["tool_name", "input"],
        })
        .as_object()
        .cloned()
        .expect("object literal");

        McpTool::new(
            std::borrow::Cow::Owned(self.tool_name.to_string()),
            std::borrow::Cow::Borrowed("Ask the user to approve or deny a tool call."),
            Arc::new(input_schema),
        )
    }
}

impl ServerHandler for PermissionMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: vec![self.tool_schema()],
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if request.name.as_ref() != self.tool_name.as_ref() {
            return Err(McpError::invalid_params(
                format!("unknown tool: {}", request.name),
                None,
            ));
        }

        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let tool_name = args
            .get("tool_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::invalid_params("missing tool_name", None))?
            .to_string();
        let input = args.get("input").cloned().unwrap_or(serde_json::Value::Null);

        let decision = self
            .core
            .request_permission(&self.session_external_id, &tool_name, input)
            .await;

        let body = serde_json::to_string(&decision).map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(body)]))
    }
}

/// Binds an ephemeral port, serves one [`PermissionMcpServer`] instance on
/// it, and returns the base URL the agent CLI should point its
/// `--mcp-config` document at, plus a handle that tears the listener down
/// when the session ends.
pub async fn serve_session(
    session_external_id: String,
    tool_name: String,
    core: Arc<dyn PermissionCore>,
) -> std::io::Result<(String, tokio::task::JoinHandle<()>)> {
    let handler = PermissionMcpServer::new(session_external_id.clone(), tool_name, core);
    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    let router = axum::Router::new().nest_service("/mcp", service);

    let join = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::warn!(%err, session_external_id, "permission mcp server exited");
        }
    });

    Ok((format!("http://127.0.0.1:{}", addr.port()), join))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow;

    #[async_trait::async_trait]
    impl PermissionCore for AlwaysAllow {
        async fn request_permission(
            &self,
            _session_external_id: &str,
            _tool_name: &str,
            _input: serde_json::Value,
        ) -> ApprovalDecisionPayload {
            ApprovalDecisionPayload::allow("approved for test")
        }
    }

    #[test]
    fn get_info_enables_tools_capability() {
        let server = PermissionMcpServer::new(
            "sess-1".into(),
            "permission_prompt".into(),
            Arc::new(AlwaysAllow),
        );
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn tool_schema_names_configured_tool() {
        let server = PermissionMcpServer::new(
            "sess-1".into(),
            "permission_prompt".into(),
            Arc::new(AlwaysAllow),
        );
        assert_eq!(server.tool_schema().name.as_ref(), "permission_prompt");
    }

    // call_tool's full behavior (including the unknown-tool-name rejection)
    // needs a live RequestContext and is covered by integration tests against
    // a running server, not here.
}
