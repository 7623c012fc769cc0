//! HTTP API over [`JobService`].
//!
//! | Method | Path               | Success                      |
//! |--------|--------------------|------------------------------|
//! | POST   | `/job`             | `{"jobID": "..."}`           |
//! | GET    | `/job/{id}`        | state, exit code, times      |
//! | POST   | `/job/{id}/stop`   | empty 200                    |
//! | GET    | `/job/{id}/logs`   | `text/plain` captured output |
//!
//! The caller identity is read from a trusted header (see
//! [`ServerConfig::owner_header`](crate::config::ServerConfig)).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::jobs::{JobState, JobStatus};
use crate::service::JobService;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<JobService>,
    owner_header: HeaderName,
}

impl ApiState {
    pub fn new(service: Arc<JobService>, owner_header: &str) -> Result<Self> {
        let owner_header = HeaderName::try_from(owner_header).map_err(|e| {
            Error::invalid_argument("ApiState::new", format!("invalid owner header: {}", e))
        })?;
        Ok(Self {
            service,
            owner_header,
        })
    }

    pub fn owner_header(&self) -> &HeaderName {
        &self.owner_header
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobResponse {
    #[serde(rename = "jobID")]
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetJobResponse {
    pub state: JobState,
    pub exit_code: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<JobStatus> for GetJobResponse {
    fn from(status: JobStatus) -> Self {
        Self {
            state: status.state,
            exit_code: status.exit_code,
            start_time: status.start_time,
            end_time: status.end_time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Transport status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument | ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/job", post(start_job_handler))
        .route("/job/{id}", get(get_job_handler))
        .route("/job/{id}/stop", post(stop_job_handler))
        .route("/job/{id}/logs", get(get_job_logs_handler))
        .with_state(state)
}

/// Caller identity from the trusted owner header.
fn owner_from<'a>(
    state: &ApiState,
    headers: &'a HeaderMap,
) -> std::result::Result<&'a str, ApiError> {
    headers
        .get(&state.owner_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|owner| !owner.is_empty())
        .ok_or_else(|| {
            ApiError(Error::unauthorized(
                "api::authenticate",
                "no client identity presented",
            ))
        })
}

async fn start_job_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<StartJobRequest>,
) -> std::result::Result<Json<StartJobResponse>, ApiError> {
    let owner = owner_from(&state, &headers)?;
    let job_id = state
        .service
        .start_command_line(owner, &payload.command)
        .await?;

    Ok(Json(StartJobResponse {
        job_id: job_id.to_string(),
    }))
}

async fn get_job_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<Json<GetJobResponse>, ApiError> {
    let owner = owner_from(&state, &headers)?;
    let status = state.service.get(owner, &id).await?;
    Ok(Json(status.into()))
}

async fn stop_job_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let owner = owner_from(&state, &headers)?;
    state.service.stop(owner, &id).await?;
    Ok(StatusCode::OK)
}

async fn get_job_logs_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let owner = owner_from(&state, &headers)?;
    let logs = state.service.get_logs(owner, &id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(ErrorKind::InvalidArgument),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::InvalidState),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn get_job_response_uses_wire_names() {
        let json = serde_json::to_value(GetJobResponse::from(JobStatus::default())).unwrap();
        assert_eq!(json["state"], "NotStarted");
        assert_eq!(json["exitCode"], -1);
        assert!(json["startTime"].is_null());
        assert!(json["endTime"].is_null());
    }

    #[test]
    fn start_job_response_uses_wire_names() {
        let json = serde_json::to_value(StartJobResponse {
            job_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json["jobID"], "abc");
    }
}
