// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{LoginRequest, SetPasswordRequest, VerifyUsernameRequest},
    repository::Repositories,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// First step of the login form.
///
/// Reports whether the account exists for the requested role and whether its
/// owner still has to choose a password.
pub async fn verify_username(
    State(repos): State<Repositories>,
    Json(payload): Json<VerifyUsernameRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = repos
        .users
        .find_by_username(&payload.username, payload.role)
        .await?
        .ok_or(AppError::NotFound(format!(
            "No {} account named '{}'",
            payload.role, payload.username
        )))?;

    Ok(Json(json!({
        "username": user.username,
        "name": user.name,
        "role": user.role,
        "requires_password_setup": user.requires_password_setup(),
    })))
}

/// First-time password setup. Refused once a password exists.
pub async fn set_password(
    State(repos): State<Repositories>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = repos
        .users
        .find_by_username(&payload.username, payload.role)
        .await?
        .ok_or(AppError::NotFound("Account not found".to_string()))?;

    if !user.requires_password_setup() {
        return Err(AppError::Conflict("Password is already set".to_string()));
    }

    let hashed = hash_password(&payload.new_password)?;
    repos.users.set_password(user.id, &hashed).await?;
    tracing::info!(user_id = user.id, role = %user.role, "Password set up");

    Ok(Json(json!({ "message": "Password set successfully" })))
}

/// Authenticates a user for a role and returns a JWT token.
pub async fn login(
    State(repos): State<Repositories>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = repos
        .users
        .find_by_username(&payload.username, payload.role)
        .await?
        .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    let Some(password_hash) = user.password.as_deref() else {
        return Err(AppError::BadRequest(
            "Password not set up yet; set a password first".to_string(),
        ));
    };

    if !verify_password(&payload.password, password_hash)? {
        tracing::warn!(username = %user.username, "Failed login attempt");
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_jwt(
        user.id,
        &user.name,
        user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user,
    })))
}

/// Returns the account behind the bearer token.
pub async fn me(
    State(repos): State<Repositories>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = repos
        .users
        .find_by_id(claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
