//! # School Chat
//!
//! Entry point: tracing, configuration, then the HTTP/WebSocket server.

use anyhow::Result;
use tracing::info;

use school_chat::config::Settings;
use school_chat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    school_chat::telemetry::init_tracing();

    info!("Starting school chat server...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        storage = ?settings.storage.backend,
        identity_mode = ?settings.identity.mode,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
