use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, Pool, QueryBuilder, Sqlite, SqliteConnection,
};
use uuid::Uuid;

use crate::domain::{
    repository::{StorageKind, TodoRepository},
    todo::{fold_case, NewTodo, OwnerId, PageRequest, Priority, Todo, TodoFilter, TodoId, TodoListing, TodoPatch, TodoStats},
};

const COLUMNS: &str = "id, user_id, title, description, completed, priority, due_date, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteTodoRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteTodoRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        // Each connection to `sqlite::memory:` is its own database, so keep exactly one alive.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None::<Duration>).max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool.connect_with(options).await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    async fn find(conn: &mut SqliteConnection, owner: &OwnerId, id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query_as::<_, TodoRow>(&format!("SELECT {COLUMNS} FROM todos WHERE id = ?1 AND user_id = ?2"))
            .bind(id.to_string())
            .bind(owner.as_str())
            .fetch_optional(conn)
            .await?;
        row.map(Todo::try_from).transpose()
    }

    async fn save(conn: &mut SqliteConnection, todo: &Todo) -> Result<()> {
        sqlx::query(
            "UPDATE todos SET title = ?3, description = ?4, completed = ?5, priority = ?6, due_date = ?7, updated_at = ?8,
                              title_folded = ?9, description_folded = ?10
             WHERE id = ?1 AND user_id = ?2",
        )
        .bind(todo.id.to_string())
        .bind(todo.user_id.as_str())
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(todo.priority.as_str())
        .bind(todo.due_date.map(encode_ts))
        .bind(encode_ts(todo.updated_at))
        .bind(fold_case(&todo.title))
        .bind(todo.description.as_deref().map(fold_case))
        .execute(conn)
        .await?;
        Ok(())
    }

    // Tables created before the folded search columns existed get them added and filled in.
    async fn add_search_columns(&self) -> Result<()> {
        let present: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('todos') WHERE name = 'title_folded'")
                .fetch_one(&*self.pool)
                .await?;
        if present > 0 { return Ok(()); }

        let mut tx = self.pool.begin().await?;
        sqlx::query("ALTER TABLE todos ADD COLUMN title_folded TEXT NOT NULL DEFAULT ''").execute(&mut *tx).await?;
        sqlx::query("ALTER TABLE todos ADD COLUMN description_folded TEXT").execute(&mut *tx).await?;
        let rows: Vec<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, title, description FROM todos").fetch_all(&mut *tx).await?;
        for (id, title, description) in rows {
            sqlx::query("UPDATE todos SET title_folded = ?2, description_folded = ?3 WHERE id = ?1")
                .bind(id)
                .bind(fold_case(&title))
                .bind(description.as_deref().map(fold_case))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!("added folded search columns to todos");
        Ok(())
    }
}

#[async_trait]
impl TodoRepository for SqliteTodoRepository {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS todos (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                title_folded TEXT NOT NULL DEFAULT '',
                description_folded TEXT
            )",
        )
        .execute(&*self.pool)
        .await?;
        self.add_search_columns().await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_todos_user_created ON todos (user_id, created_at DESC)")
            .execute(&*self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_todos_user_completed ON todos (user_id, completed)")
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, owner: &OwnerId, input: NewTodo) -> Result<Todo> {
        let todo = Todo::new(owner.clone(), input);
        sqlx::query(&format!(
            "INSERT INTO todos ({COLUMNS}, title_folded, description_folded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))
            .bind(todo.id.to_string())
            .bind(todo.user_id.as_str())
            .bind(&todo.title)
            .bind(&todo.description)
            .bind(todo.completed)
            .bind(todo.priority.as_str())
            .bind(todo.due_date.map(encode_ts))
            .bind(encode_ts(todo.created_at))
            .bind(encode_ts(todo.updated_at))
            .bind(fold_case(&todo.title))
            .bind(todo.description.as_deref().map(fold_case))
            .execute(&*self.pool)
            .await?;
        Ok(todo)
    }

    async fn get(&self, owner: &OwnerId, id: TodoId) -> Result<Option<Todo>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, owner, id).await
    }

    async fn list(&self, owner: &OwnerId, filter: &TodoFilter, page: PageRequest) -> Result<TodoListing> {
        let total: i64 = filtered("SELECT COUNT(*) FROM todos", owner, filter)
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await?;

        let mut query = filtered(&format!("SELECT {COLUMNS} FROM todos"), owner, filter);
        query
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        let rows = query.build_query_as::<TodoRow>().fetch_all(&*self.pool).await?;
        let items = rows.into_iter().map(Todo::try_from).collect::<Result<Vec<_>>>()?;
        Ok(TodoListing { items, total: u64::try_from(total)? })
    }

    async fn update(&self, owner: &OwnerId, id: TodoId, patch: TodoPatch) -> Result<Option<Todo>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut todo) = Self::find(&mut tx, owner, id).await? else { return Ok(None) };
        todo.apply(patch);
        Self::save(&mut tx, &todo).await?;
        tx.commit().await?;
        Ok(Some(todo))
    }

    async fn delete(&self, owner: &OwnerId, id: TodoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?1 AND user_id = ?2")
            .bind(id.to_string())
            .bind(owner.as_str())
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle(&self, owner: &OwnerId, id: TodoId) -> Result<Option<Todo>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut todo) = Self::find(&mut tx, owner, id).await? else { return Ok(None) };
        todo.toggle();
        Self::save(&mut tx, &todo).await?;
        tx.commit().await?;
        Ok(Some(todo))
    }

    async fn stats(&self, owner: &OwnerId, now: DateTime<Utc>) -> Result<TodoStats> {
        let (total, completed, overdue): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN completed THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN NOT completed AND due_date IS NOT NULL AND due_date < ?2 THEN 1 ELSE 0 END), 0)
             FROM todos WHERE user_id = ?1",
        )
        .bind(owner.as_str())
        .bind(encode_ts(now))
        .fetch_one(&*self.pool)
        .await?;
        let total = u64::try_from(total)?;
        let completed = u64::try_from(completed)?;
        Ok(TodoStats { total, completed, pending: total - completed, overdue: u64::try_from(overdue)? })
    }

    fn kind(&self) -> StorageKind { StorageKind::Sqlite }
}

fn filtered(select: &str, owner: &OwnerId, filter: &TodoFilter) -> QueryBuilder<'static, Sqlite> {
    let mut query = QueryBuilder::new(select);
    query.push(" WHERE user_id = ").push_bind(owner.as_str().to_string());
    if let Some(completed) = filter.completed {
        query.push(" AND completed = ").push_bind(completed);
    }
    if let Some(priority) = filter.priority {
        query.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(search) = &filter.search {
        // Both sides are folded in Rust; LIKE only ever compares lowercase text.
        let pattern = format!("%{}%", escape_like(&fold_case(search)));
        query
            .push(" AND (title_folded LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR IFNULL(description_folded, '') LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    query
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') { out.push('\\'); }
        out.push(c);
    }
    out
}

// Fixed-width UTC text keeps lexical order equal to chronological order.
fn encode_ts(ts: DateTime<Utc>) -> String { ts.to_rfc3339_opts(SecondsFormat::Micros, true) }

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw).with_context(|| format!("bad timestamp {raw:?}"))?.with_timezone(&Utc))
}

#[derive(FromRow)]
struct TodoRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    completed: bool,
    priority: String,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TodoRow> for Todo {
    type Error = anyhow::Error;

    fn try_from(row: TodoRow) -> Result<Self> {
        Ok(Todo {
            id: TodoId(Uuid::parse_str(&row.id)?),
            title: row.title,
            description: row.description,
            completed: row.completed,
            priority: Priority::from_str(&row.priority)?,
            due_date: row.due_date.as_deref().map(decode_ts).transpose()?,
            user_id: OwnerId(row.user_id),
            created_at: decode_ts(&row.created_at)?,
            updated_at: decode_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as TimeDelta;

    use super::*;
    use crate::domain::todo::{self, Description, Title};

    async fn repo() -> SqliteTodoRepository {
        let repo = SqliteTodoRepository::connect("sqlite::memory:").await.unwrap();
        repo.init().await.unwrap();
        repo
    }

    fn new_todo(title: &str) -> NewTodo { NewTodo::titled(Title::parse(title).unwrap()) }

    #[tokio::test]
    async fn create_then_get_round_trips_every_field() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        let created = repo
            .create(&owner, NewTodo {
                title: Title::parse("Buy milk").unwrap(),
                description: Description::parse("two litres").unwrap(),
                priority: Priority::High,
                due_date: Some(todo::parse_due_date("2030-05-01T12:00:00Z").unwrap()),
            })
            .await
            .unwrap();
        let fetched = repo.get(&owner, created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.created_at, fetched.updated_at);
        assert!(repo.get(&OwnerId::new("u2"), created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_toggle_are_owner_scoped() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        let created = repo.create(&owner, new_todo("a")).await.unwrap();
        let stranger = OwnerId::new("u2");
        assert!(repo.toggle(&stranger, created.id).await.unwrap().is_none());
        assert!(!repo.delete(&stranger, created.id).await.unwrap());

        let patch = TodoPatch { priority: Some(Priority::Low), description: Some(Description::parse("d").unwrap()), ..Default::default() };
        let updated = repo.update(&owner, created.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.description.as_deref(), Some("d"));
        assert_eq!(updated.title, "a");
        assert!(updated.updated_at > created.updated_at);

        let toggled = repo.toggle(&owner, created.id).await.unwrap().unwrap();
        assert!(toggled.completed);
        assert_eq!(repo.get(&owner, created.id).await.unwrap().unwrap(), toggled);
    }

    #[tokio::test]
    async fn search_treats_like_wildcards_literally() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        repo.create(&owner, new_todo("100% done")).await.unwrap();
        repo.create(&owner, new_todo("1000 things")).await.unwrap();
        let mut described = new_todo("plain");
        described.description = Description::parse("Mentions PERCENT").unwrap();
        repo.create(&owner, described).await.unwrap();

        let by = |s: &str| TodoFilter { search: Some(s.into()), ..Default::default() };
        let hits = repo.list(&owner, &by("100%"), PageRequest::default()).await.unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.items[0].title, "100% done");
        assert_eq!(repo.list(&owner, &by("percent"), PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        let created = repo.create(&owner, new_todo("ÄRGER mit Behörde")).await.unwrap();
        let mut described = new_todo("plain");
        described.description = Description::parse("ÉTÉ à Paris").unwrap();
        repo.create(&owner, described).await.unwrap();

        let by = |s: &str| TodoFilter { search: Some(s.into()), ..Default::default() };
        assert_eq!(repo.list(&owner, &by("ärger"), PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(repo.list(&owner, &by("BEHÖRDE"), PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(repo.list(&owner, &by("été"), PageRequest::default()).await.unwrap().total, 1);

        let patch = TodoPatch { title: Some(Title::parse("Ölwechsel").unwrap()), ..Default::default() };
        repo.update(&owner, created.id, patch).await.unwrap().unwrap();
        assert_eq!(repo.list(&owner, &by("ärger"), PageRequest::default()).await.unwrap().total, 0);
        assert_eq!(repo.list(&owner, &by("ÖLW"), PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn init_adds_search_columns_to_older_tables() {
        let repo = SqliteTodoRepository::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE todos (
                id TEXT PRIMARY KEY, user_id TEXT NOT NULL, title TEXT NOT NULL, description TEXT,
                completed INTEGER NOT NULL DEFAULT 0, priority TEXT NOT NULL DEFAULT 'medium', due_date TEXT,
                created_at TEXT NOT NULL, updated_at TEXT NOT NULL
            )",
        )
        .execute(&*repo.pool)
        .await
        .unwrap();
        let stamp = encode_ts(todo::now());
        sqlx::query("INSERT INTO todos (id, user_id, title, description, created_at, updated_at) VALUES (?1, 'u1', 'ÜBUNG', NULL, ?2, ?2)")
            .bind(TodoId::generate().to_string())
            .bind(&stamp)
            .execute(&*repo.pool)
            .await
            .unwrap();

        repo.init().await.unwrap();
        repo.init().await.unwrap();
        let by = TodoFilter { search: Some("übung".into()), ..Default::default() };
        assert_eq!(repo.list(&OwnerId::new("u1"), &by, PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn list_orders_newest_first_with_total() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        for i in 0..3 {
            repo.create(&owner, new_todo(&format!("t{i}"))).await.unwrap();
        }
        repo.create(&OwnerId::new("u2"), new_todo("foreign")).await.unwrap();
        let listing = repo.list(&owner, &TodoFilter::default(), PageRequest { page: 1, limit: 2 }).await.unwrap();
        assert_eq!(listing.total, 3);
        assert_eq!(listing.items.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(), ["t2", "t1"]);
    }

    #[tokio::test]
    async fn stats_match_definition() {
        let repo = repo().await;
        let owner = OwnerId::new("u1");
        let now = todo::now();
        let mut late = new_todo("late");
        late.due_date = Some(now - TimeDelta::days(2));
        repo.create(&owner, late).await.unwrap();
        let done = repo.create(&owner, new_todo("done")).await.unwrap();
        repo.toggle(&owner, done.id).await.unwrap();
        let stats = repo.stats(&owner, now).await.unwrap();
        assert_eq!(stats, TodoStats { total: 2, completed: 1, pending: 1, overdue: 1 });
    }
}
