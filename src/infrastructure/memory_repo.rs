use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    repository::{StorageKind, TodoRepository},
    todo::{NewTodo, OwnerId, PageRequest, Todo, TodoFilter, TodoId, TodoListing, TodoPatch, TodoStats},
};

/// Non-durable store used when the database is unavailable. Records are kept
/// in insertion order; every read-modify-write holds the write lock.
#[derive(Clone, Default)]
pub struct InMemoryTodoRepository {
    items: Arc<RwLock<Vec<Todo>>>,
}

impl InMemoryTodoRepository {
    pub fn new() -> Self { Self::default() }
}

fn position(items: &[Todo], owner: &OwnerId, id: TodoId) -> Option<usize> {
    items.iter().position(|t| t.id == id && &t.user_id == owner)
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn init(&self) -> Result<()> { Ok(()) }

    async fn create(&self, owner: &OwnerId, input: NewTodo) -> Result<Todo> {
        let todo = Todo::new(owner.clone(), input);
        self.items.write().await.push(todo.clone());
        Ok(todo)
    }

    async fn get(&self, owner: &OwnerId, id: TodoId) -> Result<Option<Todo>> {
        let items = self.items.read().await;
        Ok(position(&items, owner, id).map(|i| items[i].clone()))
    }

    async fn list(&self, owner: &OwnerId, filter: &TodoFilter, page: PageRequest) -> Result<TodoListing> {
        let items = self.items.read().await;
        // Newest insertion first, so equal timestamps keep that order after the stable sort.
        let mut matching: Vec<&Todo> = items.iter().rev().filter(|t| &t.user_id == owner && filter.matches(t)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items = matching.into_iter().skip(skip).take(page.limit as usize).cloned().collect();
        Ok(TodoListing { items, total })
    }

    async fn update(&self, owner: &OwnerId, id: TodoId, patch: TodoPatch) -> Result<Option<Todo>> {
        let mut items = self.items.write().await;
        let Some(i) = position(&items, owner, id) else { return Ok(None) };
        items[i].apply(patch);
        Ok(Some(items[i].clone()))
    }

    async fn delete(&self, owner: &OwnerId, id: TodoId) -> Result<bool> {
        let mut items = self.items.write().await;
        let Some(i) = position(&items, owner, id) else { return Ok(false) };
        items.remove(i);
        Ok(true)
    }

    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> Result<Option<Todo>> {
        let mut items = self.items.write().await;
        let Some(i) = position(&items, owner, id) else { return Ok(None) };
        items[i].toggle();
        Ok(Some(items[i].clone()))
    }

    async fn stats(&self, owner: &OwnerId, now: DateTime<Utc>) -> Result<TodoStats> {
        let items = self.items.read().await;
        let mut stats = TodoStats::default();
        for todo in items.iter().filter(|t| &t.user_id == owner) {
            stats.total += 1;
            if todo.completed { stats.completed += 1; } else { stats.pending += 1; }
            if todo.is_overdue(now) { stats.overdue += 1; }
        }
        Ok(stats)
    }

    fn kind(&self) -> StorageKind { StorageKind::InMemory }
}
