//! Recall MCP gateway binary.
//!
//! This binary runs the MCP server using stdio transport.

use recall_mcp::{Context, RecallMcpServer};
use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr (stdout is used for MCP protocol)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting recall-mcp gateway");

    // Resolve roots from the environment / saved settings / cwd and
    // assemble the core.
    let base = std::env::current_dir()?;
    let context = Context::initialize(&base).await?;
    let service = context.service();

    let server = RecallMcpServer::new(&context);

    // Serve over stdio transport
    let running = server.serve((stdin(), stdout())).await?;

    tracing::info!("Recall MCP gateway ready");

    // Wait for the service to complete (e.g., client disconnect)
    running.waiting().await?;

    // Drain coalesced writes before exiting.
    service.flush().await?;

    tracing::info!("Recall MCP gateway stopped");
    Ok(())
}
