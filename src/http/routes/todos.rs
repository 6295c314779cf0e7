use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};

use crate::application::todo_service::{CreateTodoInput, ListParams, TodoPage, TodoService, UpdateTodoInput};
use crate::auth::JwtKeys;
use crate::domain::todo::{Todo, TodoId, TodoStats};
use crate::http::auth::AuthUser;
use crate::http::routing::route_not_found;
use crate::http::types::{ApiError, MessageBody};

#[derive(Clone)]
pub struct AppState<S: TodoService> {
    pub service: S,
    pub keys: Arc<JwtKeys>,
}

impl<S: TodoService> AppState<S> {
    pub fn new(service: S, keys: JwtKeys) -> Self { Self { service, keys: Arc::new(keys) } }
}

impl<S: TodoService> FromRef<AppState<S>> for Arc<JwtKeys> {
    fn from_ref(state: &AppState<S>) -> Self { state.keys.clone() }
}

/// Routes relative to `/api/todos`; every one of them requires a bearer token.
pub fn router<S: TodoService + Clone>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(list_todos::<S>).post(create_todo::<S>).fallback(route_not_found))
        .route("/stats/summary", get(todo_stats::<S>).fallback(route_not_found))
        .route("/:id", get(get_todo::<S>).put(update_todo::<S>).delete(delete_todo::<S>).fallback(route_not_found))
        .route("/:id/toggle", patch(toggle_todo::<S>).fallback(route_not_found))
        .with_state(state)
}

type ApiResult<T> = Result<T, ApiError>;

async fn list_todos<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<TodoPage>> {
    let Query(params) = query?;
    Ok(Json(state.service.list(&owner, params).await?))
}

async fn get_todo<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Todo>> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.get(&owner, id).await?))
}

async fn create_todo<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    payload: Result<Json<CreateTodoInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let Json(input) = payload?;
    let todo = state.service.create(&owner, input).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodoInput>, JsonRejection>,
) -> ApiResult<Json<Todo>> {
    let id = parse_id(&id)?;
    let Json(input) = payload?;
    Ok(Json(state.service.update(&owner, id, input).await?))
}

async fn delete_todo<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageBody>> {
    let id = parse_id(&id)?;
    state.service.delete(&owner, id).await?;
    Ok(Json(MessageBody::new("Todo deleted successfully")))
}

async fn toggle_todo<S: TodoService>(
    AuthUser(owner): AuthUser,
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Todo>> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.toggle(&owner, id).await?))
}

async fn todo_stats<S: TodoService>(AuthUser(owner): AuthUser, State(state): State<AppState<S>>) -> ApiResult<Json<TodoStats>> {
    Ok(Json(state.service.stats(&owner).await?))
}

// A malformed id cannot name any record, so it is reported like any other miss.
fn parse_id(raw: &str) -> ApiResult<TodoId> { raw.parse().map_err(|_| ApiError::not_found("Todo not found")) }
