// src/handlers/subject.rs

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        subject::{CreateSubjectRequest, Subject, TeacherAssignmentRequest},
        user::Role,
    },
    repository::Repositories,
    utils::jwt::Claims,
};

/// Lists every subject with its assigned teachers.
/// Admin only.
pub async fn list_subjects(State(repos): State<Repositories>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(repos.subjects.list().await?))
}

/// Creates a subject. Codes are unique.
/// Admin only.
pub async fn create_subject(
    State(repos): State<Repositories>,
    Json(mut payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload.code = payload.code.trim().to_uppercase();

    let subject = repos.subjects.create(payload).await?;
    tracing::info!(subject_id = subject.id, code = %subject.code, "Subject created");
    Ok((StatusCode::CREATED, Json(subject)))
}

/// Assigns a teacher to a subject.
/// Admin only.
pub async fn assign_teacher(
    State(repos): State<Repositories>,
    Json(payload): Json<TeacherAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let teacher = repos
        .users
        .find_by_id(payload.teacher_id)
        .await?
        .filter(|u| u.role == Role::Teacher)
        .ok_or(AppError::NotFound("Teacher not found".to_string()))?;

    let subject = repos.subjects.assign_teacher(payload.subject_id, &teacher).await?;
    tracing::info!(
        subject_id = subject.id,
        teacher_id = teacher.id,
        "Teacher assigned to subject"
    );
    Ok(Json(subject))
}

/// Removes a teacher from a subject.
/// Admin only.
pub async fn unassign_teacher(
    State(repos): State<Repositories>,
    Json(payload): Json<TeacherAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject = repos
        .subjects
        .remove_teacher(payload.subject_id, payload.teacher_id)
        .await?;
    Ok(Json(subject))
}

/// Subjects the calling teacher is assigned to.
pub async fn list_my_subjects(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(repos.subjects.list_for_teacher(claims.user_id()?).await?))
}

/// Loads a subject and checks that `teacher_id` teaches it.
pub(crate) async fn assigned_subject(
    repos: &Repositories,
    subject_id: i64,
    teacher_id: i64,
) -> Result<Subject, AppError> {
    let subject = repos
        .subjects
        .find(subject_id)
        .await?
        .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    if !subject.has_teacher(teacher_id) {
        return Err(AppError::Forbidden(
            "You are not assigned to this subject".to_string(),
        ));
    }
    Ok(subject)
}
