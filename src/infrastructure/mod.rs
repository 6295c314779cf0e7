pub mod memory_repo;
pub mod sqlite_repo;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::{AppConfig, StorageMode};
use crate::domain::repository::TodoRepository;
use memory_repo::InMemoryTodoRepository;
use sqlite_repo::SqliteTodoRepository;

/// Picks the store for this process. In `auto` mode an unreachable database
/// degrades to the non-durable in-memory store instead of failing startup.
pub async fn open_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn TodoRepository>> {
    match config.storage {
        StorageMode::Memory => Ok(Arc::new(InMemoryTodoRepository::new())),
        StorageMode::Sqlite => Ok(Arc::new(open_sqlite(&config.database_url, config.connect_timeout).await?)),
        StorageMode::Auto => match open_sqlite(&config.database_url, config.connect_timeout).await {
            Ok(repo) => Ok(Arc::new(repo)),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "database unavailable, using in-memory storage");
                Ok(Arc::new(InMemoryTodoRepository::new()))
            }
        },
    }
}

async fn open_sqlite(database_url: &str, timeout: Duration) -> anyhow::Result<SqliteTodoRepository> {
    let repo = tokio::time::timeout(timeout, SqliteTodoRepository::connect(database_url))
        .await
        .with_context(|| format!("timed out connecting to {database_url}"))?
        .with_context(|| format!("failed to open {database_url}"))?;
    repo.init().await?;
    tracing::info!(%database_url, "connected to database");
    Ok(repo)
}
