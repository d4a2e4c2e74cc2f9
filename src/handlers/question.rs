// src/handlers/question.rs

//! Question bank authoring. Teacher only, restricted to assigned subjects.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use validator::Validate;

use super::subject::assigned_subject;
use crate::{
    error::AppError,
    models::question::{
        CreateQuestionRequest, GenerateQuestionsRequest, NewQuestion, Question, UpdateQuestionRequest,
    },
    repository::Repositories,
    state::AppState,
    utils::{
        html::{clean_all, clean_html},
        jwt::Claims,
    },
};

pub async fn list_questions(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
    Path(subject_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    assigned_subject(&repos, subject_id, claims.user_id()?).await?;
    Ok(Json(repos.questions.list_by_subject(subject_id).await?))
}

pub async fn create_question(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
    Path(subject_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let teacher_id = claims.user_id()?;
    assigned_subject(&repos, subject_id, teacher_id).await?;

    let question = store_question(&repos, subject_id, teacher_id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Sanitizes a validated request and stores it.
async fn store_question(
    repos: &Repositories,
    subject_id: i64,
    teacher_id: i64,
    payload: CreateQuestionRequest,
) -> Result<Question, AppError> {
    let mut options = payload.options;
    clean_all(&mut options);

    let question = repos
        .questions
        .create(NewQuestion {
            subject_id,
            text: clean_html(&payload.text),
            options,
            correct_answer: payload.correct_answer,
            difficulty: payload.difficulty,
            created_by: teacher_id,
        })
        .await?;

    tracing::info!(question_id = question.id, subject_id, "Question created");
    Ok(question)
}

#[derive(Debug, Serialize)]
pub struct GeneratedQuestions {
    pub created: Vec<Question>,

    /// Drafts dropped because they failed validation.
    pub skipped: usize,
}

/// Drafts questions on a topic with the configured model and stores the usable ones.
pub async fn generate_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(subject_id): Path<i64>,
    Json(payload): Json<GenerateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(AppError::BadRequest("Please enter a valid topic".to_string()));
    }
    let teacher_id = claims.user_id()?;
    assigned_subject(&state.repos, subject_id, teacher_id).await?;

    let generator = state.generator.as_ref().ok_or(AppError::ServiceUnavailable(
        "Question generation is not configured".to_string(),
    ))?;
    let drafts = generator.generate(topic, payload.count).await?;

    let mut created = Vec::new();
    let mut skipped = 0;
    for draft in drafts.into_iter().take(payload.count as usize) {
        match draft.into_request().filter(|req| req.validate().is_ok()) {
            Some(request) => created.push(store_question(&state.repos, subject_id, teacher_id, request).await?),
            None => skipped += 1,
        }
    }

    if created.is_empty() {
        return Err(AppError::ServiceUnavailable(
            "The generator returned no usable questions. Please try again.".to_string(),
        ));
    }

    tracing::info!(subject_id, created = created.len(), skipped, "Generated questions stored");
    Ok((StatusCode::CREATED, Json(GeneratedQuestions { created, skipped })))
}

/// Fetches a question the caller may edit.
async fn owned_question(repos: &Repositories, id: i64, teacher_id: i64) -> Result<Question, AppError> {
    let question = repos
        .questions
        .find(id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;
    assigned_subject(repos, question.subject_id, teacher_id).await?;
    Ok(question)
}

pub async fn update_question(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let mut question = owned_question(&repos, id, claims.user_id()?).await?;

    if let Some(text) = payload.text {
        question.text = clean_html(&text);
    }
    if let Some(mut options) = payload.options {
        clean_all(&mut options);
        question.options = options;
    }
    if let Some(correct_answer) = payload.correct_answer {
        question.correct_answer = correct_answer;
    }
    if let Some(difficulty) = payload.difficulty {
        question.difficulty = difficulty;
    }

    if question.correct_answer >= question.options.len() {
        return Err(AppError::BadRequest(
            "correct_answer is out of range for the options".to_string(),
        ));
    }

    Ok(Json(repos.questions.update(&question).await?))
}

pub async fn delete_question(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_question(&repos, id, claims.user_id()?).await?;
    repos.questions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
