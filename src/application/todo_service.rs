use crate::domain::repository::{StorageKind, TodoRepository};
use crate::domain::todo::{
    self, Description, NewTodo, OwnerId, PageRequest, Priority, Title, Todo, TodoFilter, TodoId, TodoPatch, TodoStats,
    ValidationError,
};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum TodoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Todo not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = TodoError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

/// Body of a partial update. `Some(None)` means the key was sent as `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoInput {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Raw list query string; parsed by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub completed: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoPage {
    pub todos: Vec<Todo>,
    pub pagination: Pagination,
}

#[async_trait]
pub trait TodoService: Send + Sync + 'static {
    async fn list(&self, owner: &OwnerId, params: ListParams) -> Result<TodoPage>;
    async fn get(&self, owner: &OwnerId, id: TodoId) -> Result<Todo>;
    async fn create(&self, owner: &OwnerId, input: CreateTodoInput) -> Result<Todo>;
    async fn update(&self, owner: &OwnerId, id: TodoId, input: UpdateTodoInput) -> Result<Todo>;
    async fn delete(&self, owner: &OwnerId, id: TodoId) -> Result<()>;
    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> Result<Todo>;
    async fn stats(&self, owner: &OwnerId) -> Result<TodoStats>;
    fn storage(&self) -> StorageKind;
}

#[derive(Clone)]
pub struct TodoServiceImpl<R: TodoRepository> {
    repo: R,
    max_limit: u32,
}

impl<R: TodoRepository> TodoServiceImpl<R> {
    pub fn new(repo: R) -> Self { Self { repo, max_limit: DEFAULT_MAX_LIMIT } }

    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    fn parse_list_params(&self, params: ListParams) -> Result<(TodoFilter, PageRequest), ValidationError> {
        let page = positive("page", params.page.as_deref())?.unwrap_or(PageRequest::DEFAULT_PAGE);
        let limit = positive("limit", params.limit.as_deref())?
            .unwrap_or(PageRequest::DEFAULT_LIMIT)
            .min(self.max_limit);
        let completed = match params.completed.as_deref() {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => return Err(ValidationError::InvalidQuery { name: "completed", value: other.to_string() }),
        };
        let priority = match params.priority.as_deref() {
            None | Some("") | Some("all") => None,
            Some(other) => Some(other.parse::<Priority>()?),
        };
        let search = params.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok((TodoFilter { completed, priority, search }, PageRequest { page, limit }))
    }
}

fn positive(name: &'static str, raw: Option<&str>) -> Result<Option<u32>, ValidationError> {
    let Some(raw) = raw else { return Ok(None) };
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(ValidationError::InvalidQuery { name, value: raw.to_string() }),
    }
}

fn new_todo(input: CreateTodoInput) -> Result<NewTodo, ValidationError> {
    let title = match input.title.as_deref().map(str::trim) {
        None | Some("") => return Err(ValidationError::TitleRequired),
        Some(raw) => Title::parse(raw)?,
    };
    let description = match input.description.as_deref() {
        Some(raw) => Description::parse(raw)?,
        None => None,
    };
    let priority = match input.priority.as_deref() {
        None | Some("") => Priority::default(),
        Some(raw) => raw.parse()?,
    };
    let due_date = match input.due_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(todo::parse_due_date(raw)?),
    };
    Ok(NewTodo { title, description, priority, due_date })
}

fn todo_patch(input: UpdateTodoInput) -> Result<TodoPatch, ValidationError> {
    let title = match input.title {
        None => None,
        Some(None) => return Err(ValidationError::TitleEmpty),
        Some(Some(raw)) => Some(Title::parse(&raw)?),
    };
    let description = match input.description {
        None => None,
        Some(None) => Some(None),
        Some(Some(raw)) => Some(Description::parse(&raw)?),
    };
    let priority = input.priority.as_deref().map(str::parse::<Priority>).transpose()?;
    let due_date = match input.due_date.as_ref().map(|d| d.as_deref().map(str::trim)) {
        None => None,
        Some(None | Some("")) => Some(None),
        Some(Some(raw)) => Some(Some(todo::parse_due_date(raw)?)),
    };
    Ok(TodoPatch { title, description, completed: input.completed, priority, due_date })
}

#[async_trait]
impl<R: TodoRepository> TodoService for TodoServiceImpl<R> {
    async fn list(&self, owner: &OwnerId, params: ListParams) -> Result<TodoPage> {
        let (filter, page) = self.parse_list_params(params)?;
        let listing = self.repo.list(owner, &filter, page).await?;
        tracing::debug!(%owner, page = page.page, limit = page.limit, total = listing.total, "listed todos");
        let pagination = Pagination { page: page.page, limit: page.limit, total: listing.total, pages: page.pages(listing.total) };
        Ok(TodoPage { todos: listing.items, pagination })
    }

    async fn get(&self, owner: &OwnerId, id: TodoId) -> Result<Todo> {
        self.repo.get(owner, id).await?.ok_or(TodoError::NotFound)
    }

    async fn create(&self, owner: &OwnerId, input: CreateTodoInput) -> Result<Todo> {
        let todo = self.repo.create(owner, new_todo(input)?).await?;
        tracing::info!(%owner, id = %todo.id, "todo created");
        Ok(todo)
    }

    async fn update(&self, owner: &OwnerId, id: TodoId, input: UpdateTodoInput) -> Result<Todo> {
        let patch = todo_patch(input)?;
        self.repo.update(owner, id, patch).await?.ok_or(TodoError::NotFound)
    }

    async fn delete(&self, owner: &OwnerId, id: TodoId) -> Result<()> {
        if !self.repo.delete(owner, id).await? { return Err(TodoError::NotFound); }
        tracing::info!(%owner, %id, "todo deleted");
        Ok(())
    }

    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> Result<Todo> {
        self.repo.toggle(owner, id).await?.ok_or(TodoError::NotFound)
    }

    async fn stats(&self, owner: &OwnerId) -> Result<TodoStats> {
        Ok(self.repo.stats(owner, todo::now()).await?)
    }

    fn storage(&self) -> StorageKind { self.repo.kind() }
}
