use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use rn_core::ErrorKind;
use rn_store::{Store, StoreError};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct RnServer {
    store: Arc<Mutex<Store>>,
    tool_router: ToolRouter<Self>,
}

impl RnServer {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            tool_router: Self::tool_router(),
        }
    }
}

/// Caller mistakes become `invalid_params`; store failures `internal_error`.
fn to_mcp_error(e: StoreError) -> McpError {
    let data = Some(serde_json::json!({ "reason": e.kind().as_str() }));
    match e.kind() {
        ErrorKind::Transient => {
            tracing::error!("tool call failed: {e}");
            McpError::internal_error(e.to_string(), data)
        }
        _ => McpError::invalid_params(e.to_string(), data),
    }
}

fn json_result(value: &impl serde::Serialize) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct AssignUserRequest {
    /// Id of the user joining a network
    user_id: String,
    /// Referral code of the sponsoring user
    referral_code: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CommercialRequest {
    /// Id of the commercial whose network to create
    commercial_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PositionRequest {
    network_id: String,
    /// Plan descriptor "X:Y": X first-generation seats, each generation Y times the previous
    plan_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TreeRequest {
    /// User whose subtree to return
    user_id: String,
}

#[tool_router]
impl RnServer {
    #[tool(
        description = "Place a user in the network of the sponsor owning the referral code. Returns the network id, generation and position assigned, and whether the sponsor's network was full and a new one was spawned."
    )]
    async fn assign_user(
        &self,
        Parameters(req): Parameters<AssignUserRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.lock().await;
        let placement = store
            .assign_user(&req.user_id, &req.referral_code)
            .map_err(to_mcp_error)?;
        json_result(&placement)
    }

    #[tool(
        description = "Create a network for a commercial and seat the commercial's user as its root member."
    )]
    async fn create_commercial_network(
        &self,
        Parameters(req): Parameters<CommercialRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.lock().await;
        let network = store
            .create_commercial_network(&req.commercial_id)
            .map_err(to_mcp_error)?;
        json_result(&network)
    }

    #[tool(
        description = "Find the next free generation and position in a network, filling generations in order under the given plan."
    )]
    async fn calculate_position(
        &self,
        Parameters(req): Parameters<PositionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.lock().await;
        let slot = store
            .calculate_position(&req.network_id, &req.plan_type)
            .map_err(to_mcp_error)?;
        json_result(&slot)
    }

    #[tool(
        description = "Return the referral tree below a user as nested JSON. Returns {} when the user is not in any network."
    )]
    async fn network_tree(
        &self,
        Parameters(req): Parameters<TreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.lock().await;
        match store.network_tree(&req.user_id).map_err(to_mcp_error)? {
            Some(tree) => {
                let text = tree
                    .to_json()
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            None => json_result(&serde_json::json!({})),
        }
    }

    #[tool(description = "List every network with its plan, member count and capacity.")]
    async fn list_networks(&self) -> Result<CallToolResult, McpError> {
        let store = self.store.lock().await;
        let networks = store.list_networks().map_err(to_mcp_error)?;
        json_result(&networks)
    }
}

#[tool_handler]
impl ServerHandler for RnServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Referral network placement. Users join a capacity-bounded network under the \
                 sponsor owning a referral code; a commercial's network must exist first \
                 (create_commercial_network). Use network_tree to inspect the hierarchy and \
                 calculate_position to see where the next member would land."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
