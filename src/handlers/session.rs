// src/handlers/session.rs

//! Live exam sessions. Student only. Each handler forwards one command to the
//! session's task and returns the rendered state.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    session::{ClientReport, Learner, SessionCommand, SessionRegistry, SessionState},
    state::AppState,
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigateRequest {
    GoTo { index: usize },
    Next,
    Previous,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: i64,
    pub option: usize,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub question_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Acknowledges that unanswered questions will be scored as wrong.
    #[serde(default)]
    pub confirmed: bool,
}

/// Starts an attempt, or resumes the caller's live one.
///
/// Refused when the exam window is closed, the exam has no questions, or the
/// caller has already submitted.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let exam = state
        .repos
        .exams
        .fetch_definition(exam_id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if state.repos.catalog.has_submitted(exam_id, student_id).await? {
        return Err(AppError::Conflict(
            "You have already attempted this exam".to_string(),
        ));
    }

    let learner = Learner {
        id: student_id,
        name: claims.name.clone(),
    };
    let session = state.sessions.open(exam, learner).await?;
    Ok(Json(session))
}

async fn run(
    sessions: &SessionRegistry,
    claims: &Claims,
    id: Uuid,
    command: SessionCommand,
) -> Result<Json<SessionState>, AppError> {
    let state = sessions.dispatch(id, claims.user_id()?, command).await?;
    Ok(Json(state))
}

pub async fn get_session(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    run(&sessions, &claims, id, SessionCommand::View).await
}

/// Abandons the attempt without submitting.
pub async fn close_session(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    run(&sessions, &claims, id, SessionCommand::Close).await
}

pub async fn navigate(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = match payload {
        NavigateRequest::GoTo { index } => SessionCommand::GoTo(index),
        NavigateRequest::Next => SessionCommand::Next,
        NavigateRequest::Previous => SessionCommand::Previous,
    };
    run(&sessions, &claims, id, command).await
}

pub async fn answer(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = SessionCommand::Answer {
        question_id: payload.question_id,
        option: payload.option,
    };
    run(&sessions, &claims, id, command).await
}

pub async fn toggle_flag(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FlagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = SessionCommand::ToggleFlag {
        question_id: payload.question_id,
    };
    run(&sessions, &claims, id, command).await
}

/// Receives the browser's page visibility and fullscreen changes.
pub async fn report_visibility(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClientReport>,
) -> Result<impl IntoResponse, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(
            "Report at least one of hidden or fullscreen".to_string(),
        ));
    }
    let state = sessions.report(id, claims.user_id()?, payload).await?;
    Ok(Json(state))
}

pub async fn submit(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Option<Json<SubmitRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let command = SessionCommand::Submit {
        confirmed: payload.confirmed,
    };
    run(&sessions, &claims, id, command).await
}

/// Redelivers a submission that could not be stored earlier.
pub async fn retry_delivery(
    State(sessions): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    run(&sessions, &claims, id, SessionCommand::RetryDelivery).await
}
