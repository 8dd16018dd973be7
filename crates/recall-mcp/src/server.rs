//! MCP server implementation.
//!
//! This module contains the main server setup using rmcp.

use crate::context::Context;
use crate::error::Error;
use crate::models::{
    AddMemoryParams, CreateTaskParams, DeleteMemoryParams, DeleteTaskParams, GetMemoryParams,
    GetTaskContextParams, ListMemoriesParams, ListTasksParams, SearchMemoriesParams,
    TestToolParams, UpdateTaskParams,
};
use crate::tools::Tools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{
    handler::server::ServerHandler, tool, tool_handler, tool_router, ErrorData as McpError,
};
use std::sync::Arc;

/// Convert a recall gateway error to an appropriate MCP error.
///
/// Caller errors (bad input, unknown ids, illegal transitions) map to
/// `invalid_params`; everything else is `internal_error`.
fn to_mcp_error(e: &Error) -> McpError {
    if e.is_caller_error() {
        McpError::invalid_params(e.to_string(), None)
    } else {
        McpError::internal_error(e.to_string(), None)
    }
}

/// The recall MCP gateway server.
///
/// Provides MCP protocol handling over stdio transport.
#[derive(Clone)]
pub struct RecallMcpServer {
    /// Tool implementations.
    tools: Arc<Tools>,
    /// Tool router for MCP dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RecallMcpServer {
    /// Store a new memory.
    #[tool(
        description = "Store a new memory (freeform markdown note) with optional tags, category, project, priority and title. Returns the id, file location, derived complexity and content type."
    )]
    async fn add_memory(
        &self,
        Parameters(params): Parameters<AddMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.add_memory(params).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Fetch one memory.
    #[tool(
        description = "Get a memory by id, including its body, metadata and task connections. Bumps the access counter."
    )]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.get_memory(&params.id).await {
            Ok(memory) => Ok(CallToolResult::success(vec![Content::json(memory)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// List memories.
    #[tool(
        description = "List memories, most recent first, optionally restricted to a project and limited."
    )]
    async fn list_memories(
        &self,
        Parameters(params): Parameters<ListMemoriesParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.list_memories(params).await {
            Ok(memories) => Ok(CallToolResult::success(vec![Content::json(memories)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Search memories.
    #[tool(
        description = "Search memories by case-insensitive substring over body and title, exact tag match and category. Returns a ranked list."
    )]
    async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchMemoriesParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.search_memories(params).await {
            Ok(memories) => Ok(CallToolResult::success(vec![Content::json(memories)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Delete a memory.
    #[tool(
        description = "Delete a memory by id. Removes its connections from every linked task. Idempotent: deleting a missing id reports deleted=false."
    )]
    async fn delete_memory(
        &self,
        Parameters(params): Parameters<DeleteMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.delete_memory(&params.id).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Create a task.
    #[tool(
        description = "Create a task with optional description, project, category, priority, parent task, tags and manual memory attachments. Auto-links related memories unless auto_link=false."
    )]
    async fn create_task(
        &self,
        Parameters(params): Parameters<CreateTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.create_task(params).await {
            Ok(task) => Ok(CallToolResult::success(vec![Content::json(task)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Update a task.
    #[tool(
        description = "Update a task's fields. Status transitions are validated. Use empty string for category or parent_task to clear them. Changes to title/description/tags/project re-run the auto-linker."
    )]
    async fn update_task(
        &self,
        Parameters(params): Parameters<UpdateTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.update_task(params).await {
            Ok(task) => Ok(CallToolResult::success(vec![Content::json(task)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// List tasks.
    #[tool(
        description = "List tasks, most recently created first, with optional project and status filters and a limit."
    )]
    async fn list_tasks(
        &self,
        Parameters(params): Parameters<ListTasksParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.list_tasks(params).await {
            Ok(tasks) => Ok(CallToolResult::success(vec![Content::json(tasks)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Get a task with its linked context.
    #[tool(
        description = "Get a task plus its linked memories. depth=deep also includes subtasks with their memories and the parent chain."
    )]
    async fn get_task_context(
        &self,
        Parameters(params): Parameters<GetTaskContextParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .tools
            .get_task_context(&params.id, params.depth.as_deref())
            .await
        {
            Ok(context) => Ok(CallToolResult::success(vec![Content::json(context)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Delete a task.
    #[tool(
        description = "Delete a task by id. Cascades: the parent loses the subtask entry, subtasks are detached, and linked memories lose their mirrored connections. Idempotent."
    )]
    async fn delete_task(
        &self,
        Parameters(params): Parameters<DeleteTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.delete_task(&params.id).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Echo, for liveness.
    #[tool(description = "Echo a message back with the server version. Liveness probe.")]
    async fn test_tool(
        &self,
        Parameters(params): Parameters<TestToolParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.tools.test_tool(params).await {
            Ok(response) => Ok(CallToolResult::success(vec![Content::json(response)?])),
            Err(e) => Err(to_mcp_error(&e)),
        }
    }
}

impl RecallMcpServer {
    /// Create the server over an initialized context.
    #[must_use]
    pub fn new(context: &Context) -> Self {
        Self {
            tools: Arc::new(Tools::new(context.service())),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_handler]
impl ServerHandler for RecallMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "recall-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Recall MCP gateway: persistent memories and tasks with automatic bidirectional linking."
                    .into(),
            ),
        }
    }
}
