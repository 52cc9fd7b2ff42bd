use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::error::FarmError;
use crate::services::job_manager::{DispatchRequest, JobManager, JobSubmission};
use crate::services::urls::{self, ArtifactPath};
use crate::PROTOCOL_VERSION;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
}

/// The master's HTTP face. Fixed routes cover the JSON operations; the
/// artifact addresses of the wire contract (`/file_..`, `/log_..` and
/// friends) carry the job id inside one path segment, so they go through a
/// fallback that parses them with `urls::parse`.
pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/version", get(version))
        .route("/job", post(submit))
        .route("/dispatch", post(dispatch))
        .fallback(artifact)
        .with_state(manager)
}

/// Bind the router to an already bound listener and serve until the task
/// is dropped.
pub async fn serve(listener: TcpListener, manager: Arc<JobManager>) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "master serving");
    axum::serve(listener, router(manager)).await
}

// handshake endpoint: exact protocol version bytes, nothing else
async fn version() -> &'static str {
    PROTOCOL_VERSION
}

// the job table sits behind a blocking mutex and artifacts hit the
// filesystem; run both off the async executor
async fn run_blocking<T, F>(work: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => value,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

async fn submit(
    State(manager): State<Arc<JobManager>>,
    Json(submission): Json<JobSubmission>,
) -> Json<SubmitResponse> {
    let id = run_blocking(move || manager.submit(submission)).await;
    Json(SubmitResponse { id })
}

async fn dispatch(
    State(manager): State<Arc<JobManager>>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    match run_blocking(move || manager.dispatch(request.worker)).await {
        Some(lease) => Json(lease).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn artifact(
    State(manager): State<Arc<JobManager>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let Some(artifact) = urls::parse(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let upload = matches!(method, Method::POST | Method::PUT);
    run_blocking(move || serve_artifact(&manager, artifact, &method, upload, &body)).await
}

fn serve_artifact(
    manager: &JobManager,
    artifact: ArtifactPath,
    method: &Method,
    upload: bool,
    body: &Bytes,
) -> Response {
    match artifact {
        ArtifactPath::File { job_id, index } if *method == Method::GET => {
            respond(manager.read_file(&job_id, index))
        }
        ArtifactPath::File { job_id, index } if upload => {
            respond_json(manager.receive_file(&job_id, index, body))
        }
        ArtifactPath::Log { job_id, frame } if *method == Method::GET => {
            respond(manager.read_log(&job_id, frame))
        }
        ArtifactPath::Log { job_id, frame } if upload => {
            respond_empty(manager.append_log(&job_id, frame, body))
        }
        ArtifactPath::Render { job_id, frame } if *method == Method::GET => {
            respond(manager.read_render(&job_id, frame))
        }
        // delivering the rendered frame is what completes it
        ArtifactPath::Render { job_id, frame } if upload => {
            respond_json(manager.frame_done(&job_id, frame, body))
        }
        ArtifactPath::FrameError { job_id, frame } if upload => {
            respond_empty(manager.frame_error(&job_id, frame, body))
        }
        ArtifactPath::Result { job_id } if *method == Method::GET => {
            match manager.result_archive(&job_id) {
                Ok(archive) => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "application/zip")],
                    archive,
                )
                    .into_response(),
                Err(err) => error_response(err),
            }
        }
        ArtifactPath::Status { job_id } if *method == Method::GET => {
            respond_json(manager.status(&job_id))
        }
        // method/semantics for cancel are ours: any method purges
        ArtifactPath::Cancel { job_id } => respond_empty(manager.cancel(&job_id)),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn respond(result: crate::models::error::Result<Vec<u8>>) -> Response {
    match result {
        Ok(data) => data.into_response(),
        Err(err) => error_response(err),
    }
}

fn respond_json<T: Serialize>(result: crate::models::error::Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err),
    }
}

fn respond_empty(result: crate::models::error::Result<()>) -> Response {
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: FarmError) -> Response {
    let status = match &err {
        FarmError::JobNotFound(_)
        | FarmError::FrameNotFound { .. }
        | FarmError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        FarmError::HashMismatch { .. } | FarmError::InvalidFrameTransition { .. } => {
            StatusCode::CONFLICT
        }
        FarmError::ResultNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}
