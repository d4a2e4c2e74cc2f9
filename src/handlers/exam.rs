// src/handlers/exam.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::subject::assigned_subject;
use crate::{
    error::AppError,
    models::exam::{CreateExamRequest, ExamCard, ExamCardStatus, NewExam},
    state::AppState,
    utils::jwt::Claims,
};

/// Deploys an exam over questions from one of the caller's subjects.
/// Teacher only.
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let teacher_id = claims.user_id()?;
    let repos = &state.repos;
    assigned_subject(repos, payload.subject_id, teacher_id).await?;

    let mut seen = HashSet::new();
    for selection in &payload.questions {
        if !seen.insert(selection.question_id) {
            return Err(AppError::BadRequest(format!(
                "Question {} selected twice",
                selection.question_id
            )));
        }
        let question = repos
            .questions
            .find(selection.question_id)
            .await?
            .ok_or(AppError::BadRequest(format!(
                "Question {} does not exist",
                selection.question_id
            )))?;
        if question.subject_id != payload.subject_id {
            return Err(AppError::BadRequest(format!(
                "Question {} belongs to another subject",
                question.id
            )));
        }
    }

    let exam = repos
        .catalog
        .create(NewExam {
            subject_id: payload.subject_id,
            teacher_id,
            title: payload.title,
            description: payload.description,
            questions: payload.questions,
            start_time: payload.start_time,
            end_time: payload.end_time,
            duration_minutes: payload.duration_minutes,
            pass_percentage: payload.pass_percentage,
        })
        .await?;

    tracing::info!(
        exam_id = exam.id,
        subject_id = exam.subject_id,
        questions = exam.questions.len(),
        "Exam deployed"
    );
    Ok((StatusCode::CREATED, Json(exam.summary())))
}

/// Exams deployed by the caller, newest first.
/// Teacher only.
pub async fn list_my_exams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.repos.catalog.list_for_teacher(claims.user_id()?).await?))
}

/// Submissions for one of the caller's exams.
/// Teacher only.
pub async fn exam_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = state
        .repos
        .exams
        .fetch_definition(id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if exam.teacher_id != claims.user_id()? {
        return Err(AppError::Forbidden("Not your exam".to_string()));
    }

    Ok(Json(state.repos.catalog.results_for_exam(id).await?))
}

/// Exam cards for the calling student, classified against the current time.
/// Student only.
pub async fn list_student_exams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let now = state.clock.now();

    let attended: HashSet<i64> = state
        .repos
        .catalog
        .results_for_student(student_id)
        .await?
        .into_iter()
        .map(|r| r.exam_id)
        .collect();

    let cards: Vec<ExamCard> = state
        .repos
        .catalog
        .list_active()
        .await?
        .into_iter()
        .map(|exam| ExamCard {
            status: ExamCardStatus::classify(&exam, attended.contains(&exam.id), now),
            exam,
        })
        .collect();

    Ok(Json(cards))
}

/// The calling student's submissions, newest first.
/// Student only.
pub async fn my_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state.repos.catalog.results_for_student(claims.user_id()?).await?,
    ))
}
