use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TodoId(pub Uuid);

impl TodoId {
    pub fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for TodoId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

/// Identity of the user owning a todo, as carried by the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title is required")]
    TitleRequired,
    #[error("Title cannot be empty")]
    TitleEmpty,
    #[error("Title cannot exceed 200 characters")]
    TitleTooLong,
    #[error("Description cannot exceed 1000 characters")]
    DescriptionTooLong,
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),
    #[error("Invalid due date: {0}")]
    InvalidDueDate(String),
    #[error("Invalid query parameter {name}: {value}")]
    InvalidQuery { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::InvalidPriority(other.to_string())),
        }
    }
}

/// A trimmed, non-empty title within the length limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title(String);

impl Title {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() { return Err(ValidationError::TitleEmpty); }
        if trimmed.chars().count() > TITLE_MAX_CHARS { return Err(ValidationError::TitleTooLong); }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

/// A trimmed description within the length limit. Blank input means "no description".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description(String);

impl Description {
    pub fn parse(raw: &str) -> Result<Option<Self>, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() { return Ok(None); }
        if trimmed.chars().count() > DESCRIPTION_MAX_CHARS { return Err(ValidationError::DescriptionTooLong); }
        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) and plain dates.
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(6));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().trunc_subsecs(6));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ValidationError::InvalidDueDate(raw.to_string()))
}

/// Current time at the precision both stores persist.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// Next `updated_at` for a record last touched at `previous`; always strictly later.
pub fn next_update_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous { now } else { previous + Duration::microseconds(1) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub user_id: OwnerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(owner: OwnerId, input: NewTodo) -> Self {
        let now = now();
        Self {
            id: TodoId::generate(),
            title: input.title.into_inner(),
            description: input.description.map(Description::into_inner),
            completed: false,
            priority: input.priority,
            due_date: input.due_date,
            user_id: owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the fields present in `patch` and refreshes `updated_at`.
    pub fn apply(&mut self, patch: TodoPatch) {
        if let Some(title) = patch.title { self.title = title.into_inner(); }
        if let Some(description) = patch.description { self.description = description.map(Description::into_inner); }
        if let Some(completed) = patch.completed { self.completed = completed; }
        if let Some(priority) = patch.priority { self.priority = priority; }
        if let Some(due_date) = patch.due_date { self.due_date = due_date; }
        self.updated_at = next_update_stamp(self.updated_at);
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
        self.updated_at = next_update_stamp(self.updated_at);
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: Title,
    pub description: Option<Description>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTodo {
    pub fn titled(title: Title) -> Self {
        Self { title, description: None, priority: Priority::default(), due_date: None }
    }
}

/// Partial update. The outer `Option` is "field present"; for nullable
/// fields the inner `None` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<Title>,
    pub description: Option<Option<Description>>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
}

impl TodoFilter {
    pub fn matches(&self, todo: &Todo) -> bool {
        if self.completed.is_some_and(|c| c != todo.completed) { return false; }
        if self.priority.is_some_and(|p| p != todo.priority) { return false; }
        match &self.search {
            None => true,
            Some(needle) => {
                let needle = fold_case(needle);
                fold_case(&todo.title).contains(&needle)
                    || todo.description.as_deref().is_some_and(|d| fold_case(d).contains(&needle))
            }
        }
    }
}

/// Case folding used by search in every store.
pub fn fold_case(text: &str) -> String { text.to_lowercase() }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.limit) }

    pub fn pages(&self, total: u64) -> u64 { total.div_ceil(u64::from(self.limit.max(1))) }
}

impl Default for PageRequest {
    fn default() -> Self { Self { page: Self::DEFAULT_PAGE, limit: Self::DEFAULT_LIMIT } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListing {
    pub items: Vec<Todo>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoStats {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub overdue: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(Title::parse("  Buy milk \n").unwrap().as_str(), "Buy milk");
        assert_eq!(Title::parse("   "), Err(ValidationError::TitleEmpty));
        assert!(Title::parse(&"x".repeat(TITLE_MAX_CHARS)).is_ok());
        assert_eq!(Title::parse(&"x".repeat(TITLE_MAX_CHARS + 1)), Err(ValidationError::TitleTooLong));
    }

    #[test]
    fn blank_description_is_absent() {
        assert_eq!(Description::parse("  ").unwrap(), None);
        assert_eq!(Description::parse(" notes ").unwrap().unwrap().as_str(), "notes");
        assert_eq!(Description::parse(&"d".repeat(DESCRIPTION_MAX_CHARS + 1)), Err(ValidationError::DescriptionTooLong));
    }

    #[test]
    fn priority_rejects_unknown_values() {
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
        assert_eq!("urgent".parse::<Priority>(), Err(ValidationError::InvalidPriority("urgent".into())));
        assert_eq!("HIGH".parse::<Priority>(), Err(ValidationError::InvalidPriority("HIGH".into())));
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn due_date_formats() {
        let date = parse_due_date("2030-01-02").unwrap();
        assert_eq!(date.to_rfc3339(), "2030-01-02T00:00:00+00:00");
        let ts = parse_due_date("2030-01-02T10:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2030-01-02T08:30:00+00:00");
        let naive = parse_due_date("2030-01-02T10:30:00").unwrap();
        assert_eq!(naive.to_rfc3339(), "2030-01-02T10:30:00+00:00");
        assert!(matches!(parse_due_date("next tuesday"), Err(ValidationError::InvalidDueDate(_))));
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut todo = Todo::new(OwnerId::new("u1"), NewTodo {
            title: Title::parse("a").unwrap(),
            description: Description::parse("keep").unwrap(),
            priority: Priority::High,
            due_date: Some(parse_due_date("2030-01-01").unwrap()),
        });
        let before = todo.clone();
        todo.apply(TodoPatch { completed: Some(true), due_date: Some(None), ..Default::default() });
        assert!(todo.completed);
        assert_eq!(todo.due_date, None);
        assert_eq!(todo.title, before.title);
        assert_eq!(todo.description, before.description);
        assert_eq!(todo.priority, before.priority);
        assert!(todo.updated_at > before.updated_at);
        assert_eq!(todo.created_at, before.created_at);
    }

    #[test]
    fn update_stamp_is_strictly_increasing() {
        let future = now() + Duration::seconds(60);
        assert!(next_update_stamp(future) > future);
    }

    #[test]
    fn filter_search_is_case_insensitive_over_title_or_description() {
        let mut todo = Todo::new(OwnerId::new("u1"), NewTodo::titled(Title::parse("Groceries").unwrap()));
        todo.description = Some("Buy MILK and eggs".into());
        let search = |s: &str| TodoFilter { search: Some(s.into()), ..Default::default() };
        assert!(search("milk").matches(&todo));
        assert!(search("GROC").matches(&todo));
        assert!(!search("bread").matches(&todo));
        assert!(!TodoFilter { completed: Some(true), ..Default::default() }.matches(&todo));
        assert!(TodoFilter { priority: Some(Priority::Medium), ..Default::default() }.matches(&todo));
    }

    #[test]
    fn page_math() {
        let page = PageRequest { page: 3, limit: 10 };
        assert_eq!(page.offset(), 20);
        assert_eq!(page.pages(0), 0);
        assert_eq!(page.pages(10), 1);
        assert_eq!(page.pages(11), 2);
    }

    #[test]
    fn overdue_requires_pending_and_past_due_date() {
        let now = now();
        let mut todo = Todo::new(OwnerId::new("u1"), NewTodo::titled(Title::parse("t").unwrap()));
        assert!(!todo.is_overdue(now));
        todo.due_date = Some(now - Duration::days(1));
        assert!(todo.is_overdue(now));
        todo.completed = true;
        assert!(!todo.is_overdue(now));
    }
}
