use clap::Parser as _;
use hookrelay_mcp_server::logging::init_tracing;
use hookrelay_mcp_server::{Settings, create_server};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::parse();
    init_tracing(&settings);

    let server = match create_server(&settings).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting MCP server...");
    if let Err(e) = server.run().await {
        tracing::error!("Failed to start server: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
