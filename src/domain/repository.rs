use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::todo::{NewTodo, OwnerId, PageRequest, Todo, TodoFilter, TodoId, TodoListing, TodoPatch, TodoStats};

/// Which backend a repository persists to; reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    InMemory,
}

impl StorageKind {
    pub fn label(self) -> &'static str {
        match self {
            StorageKind::Sqlite => "SQLite",
            StorageKind::InMemory => "In-Memory",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// Owner-scoped todo storage. A record that does not exist and a record owned
/// by someone else are reported the same way (`None` / `false`).
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;
    async fn create(&self, owner: &OwnerId, input: NewTodo) -> anyhow::Result<Todo>;
    async fn get(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<Option<Todo>>;
    async fn list(&self, owner: &OwnerId, filter: &TodoFilter, page: PageRequest) -> anyhow::Result<TodoListing>;
    async fn update(&self, owner: &OwnerId, id: TodoId, patch: TodoPatch) -> anyhow::Result<Option<Todo>>;
    async fn delete(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<bool>;
    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<Option<Todo>>;
    async fn stats(&self, owner: &OwnerId, now: DateTime<Utc>) -> anyhow::Result<TodoStats>;
    fn kind(&self) -> StorageKind;
}

#[async_trait]
impl<T: TodoRepository + ?Sized> TodoRepository for Arc<T> {
    async fn init(&self) -> anyhow::Result<()> { (**self).init().await }
    async fn create(&self, owner: &OwnerId, input: NewTodo) -> anyhow::Result<Todo> { (**self).create(owner, input).await }
    async fn get(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<Option<Todo>> { (**self).get(owner, id).await }
    async fn list(&self, owner: &OwnerId, filter: &TodoFilter, page: PageRequest) -> anyhow::Result<TodoListing> { (**self).list(owner, filter, page).await }
    async fn update(&self, owner: &OwnerId, id: TodoId, patch: TodoPatch) -> anyhow::Result<Option<Todo>> { (**self).update(owner, id, patch).await }
    async fn delete(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<bool> { (**self).delete(owner, id).await }
    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> anyhow::Result<Option<Todo>> { (**self).toggle(owner, id).await }
    async fn stats(&self, owner: &OwnerId, now: DateTime<Utc>) -> anyhow::Result<TodoStats> { (**self).stats(owner, now).await }
    fn kind(&self) -> StorageKind { (**self).kind() }
}
