use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::repository::StorageKind;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
    pub database: &'static str,
    pub timestamp: String,
}

pub async fn health(State(storage): State<StorageKind>) -> Json<Health> {
    Json(Health {
        status: "OK",
        message: "Todo API is running",
        database: storage.label(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
