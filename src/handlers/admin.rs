// src/handlers/admin.rs

//! Teacher and student account management. Admin only.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{AccountFilter, CreateAccountRequest, NewUser, Role, UpdateAccountRequest, User},
    repository::Repositories,
    utils::hash::hash_password,
};

async fn create_account(
    repos: &Repositories,
    role: Role,
    payload: CreateAccountRequest,
) -> Result<User, AppError> {
    payload.validate()?;

    let password = payload.password.as_deref().map(hash_password).transpose()?;

    let user = repos
        .users
        .create(NewUser {
            username: payload.username,
            name: payload.name,
            password,
            role,
            email: payload.email,
            department: payload.department,
            class: payload.class,
            semester: payload.semester,
            roll_number: payload.roll_number,
        })
        .await?;

    tracing::info!(user_id = user.id, role = %role, "Account created");
    Ok(user)
}

async fn update_account(
    repos: &Repositories,
    role: Role,
    id: i64,
    payload: UpdateAccountRequest,
) -> Result<User, AppError> {
    payload.validate()?;

    let mut user = repos
        .users
        .find_by_id(id)
        .await?
        .filter(|u| u.role == role)
        .ok_or(AppError::NotFound(format!("{} not found", role)))?;

    if let Some(username) = payload.username {
        user.username = username;
    }
    if let Some(name) = payload.name {
        user.name = name;
    }
    if let Some(email) = payload.email {
        user.email = email;
    }
    if let Some(department) = payload.department {
        user.department = department;
    }
    if let Some(class) = payload.class {
        user.class = class;
    }
    if payload.semester.is_some() {
        user.semester = payload.semester;
    }
    if let Some(roll_number) = payload.roll_number {
        user.roll_number = roll_number;
    }

    repos.users.update(&user).await
}

pub async fn list_teachers(State(repos): State<Repositories>) -> Result<impl IntoResponse, AppError> {
    let teachers = repos.users.list(Role::Teacher, &AccountFilter::default()).await?;
    Ok(Json(teachers))
}

pub async fn create_teacher(
    State(repos): State<Repositories>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = create_account(&repos, Role::Teacher, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_teacher(
    State(repos): State<Repositories>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(update_account(&repos, Role::Teacher, id, payload).await?))
}

/// Deleting a teacher also drops their subject assignments.
pub async fn delete_teacher(
    State(repos): State<Repositories>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    repos.users.delete(id, Role::Teacher).await?;
    tracing::info!(user_id = id, "Teacher deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Lists students, optionally narrowed by `?class=` and `?semester=`.
pub async fn list_students(
    State(repos): State<Repositories>,
    Query(filter): Query<AccountFilter>,
) -> Result<impl IntoResponse, AppError> {
    let students = repos.users.list(Role::Student, &filter).await?;
    Ok(Json(students))
}

pub async fn create_student(
    State(repos): State<Repositories>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = create_account(&repos, Role::Student, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_student(
    State(repos): State<Repositories>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(update_account(&repos, Role::Student, id, payload).await?))
}

pub async fn delete_student(
    State(repos): State<Repositories>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    repos.users.delete(id, Role::Student).await?;
    tracing::info!(user_id = id, "Student deleted");
    Ok(StatusCode::NO_CONTENT)
}
