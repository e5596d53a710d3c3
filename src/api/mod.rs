//! HTTP submit/poll surface.
//!
//! `POST /fizzbuzz?input=N` answers 202 with a status location to poll.
//! The status resource redirects to the result once processing is done.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::model::Status;
use crate::status::StatusReader;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub reader: Arc<StatusReader>,
    /// Suggested wait before the first poll.
    pub retry_after: Duration,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    pub input: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub identifier: String,
    pub location: String,
}

pub fn status_location(identifier: &str) -> String {
    format!("/fizzbuzz/status/{identifier}")
}

pub fn result_location(identifier: &str) -> String {
    format!("/fizzbuzz/result/{identifier}")
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/fizzbuzz", post(handle_submit))
        .route("/fizzbuzz/status/{id}", get(handle_status))
        .route("/fizzbuzz/result/{id}", get(handle_result))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn handle_submit(
    State(state): State<ApiState>,
    Query(query): Query<SubmitQuery>,
) -> Response {
    info!(input = query.input, "received input");
    match state.dispatcher.dispatch(query.input).await {
        Ok(id) => {
            let identifier = id.to_string();
            let location = status_location(&identifier);
            (
                StatusCode::ACCEPTED,
                [
                    (header::LOCATION, location.clone()),
                    (
                        header::RETRY_AFTER,
                        state.retry_after.as_millis().to_string(),
                    ),
                ],
                Json(SubmitResponse {
                    identifier,
                    location,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(input = query.input, error = %e, "could not dispatch input");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not dispatch input".to_string(),
            )
                .into_response()
        }
    }
}

async fn handle_status(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let status = state.reader.status_of(&id).await;
    info!(identifier = %id, %status, "status requested");
    match status {
        Status::Dispatched => (StatusCode::OK, Json(status)).into_response(),
        Status::Processed => (
            StatusCode::FOUND,
            [(header::LOCATION, result_location(&id))],
        )
            .into_response(),
        Status::Invalid => (StatusCode::NOT_FOUND, id).into_response(),
    }
}

async fn handle_result(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    info!(identifier = %id, "result requested");
    match state.reader.result_of(&id).await {
        Some(result) => (StatusCode::OK, result).into_response(),
        None => (StatusCode::NOT_FOUND, id).into_response(),
    }
}
