use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use invaductar::capability::ProcessCapability;
use invaductar::config::ServerConfig;
use invaductar::server;
use invaductar::session::ChatSession;
use invaductar::store::ConversationStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let workspace_root = env::current_dir().context("failed to resolve working directory")?;
    let config = ServerConfig::load(&workspace_root)?;

    let store = ConversationStore::new(config.store_path.clone());
    let chat = ProcessCapability::new("chat", config.capabilities.chat.clone());
    let image = ProcessCapability::new("image", config.capabilities.image.clone());
    let session = Arc::new(ChatSession::new(
        store,
        Box::new(chat),
        Box::new(image),
        config.uploads_dir.clone(),
    ));

    let app = server::router(session);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
