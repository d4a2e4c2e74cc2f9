// src/models/user.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Account role. Every route group is gated on exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Display name shown on subjects and submissions.
    pub name: String,

    /// Argon2 password hash. `None` until the account owner sets a password.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: Option<String>,

    pub role: Role,

    pub email: String,
    pub department: String,

    /// Class section (students only).
    pub class: String,

    /// Semester (students only).
    pub semester: Option<i32>,

    pub roll_number: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl User {
    pub fn requires_password_setup(&self) -> bool {
        self.password.is_none()
    }
}

/// Insert payload handed to the repository layer.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub password: Option<String>,
    pub role: Role,
    pub email: String,
    pub department: String,
    pub class: String,
    pub semester: Option<i32>,
    pub roll_number: String,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 200))]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub department: Option<String>,
    #[validate(length(max = 20))]
    pub class: Option<String>,
    #[validate(range(min = 1, max = 12))]
    pub semester: Option<i32>,
    #[validate(length(max = 50))]
    pub roll_number: Option<String>,
}

/// DTO for an admin creating a teacher or student account.
/// The role comes from the route, not from the body.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Optional initial password. Without it the owner sets one on first login.
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub department: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub class: String,
    #[validate(range(min = 1, max = 12))]
    pub semester: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub roll_number: String,
}

/// Query filter for listing students.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilter {
    pub class: Option<String>,
    pub semester: Option<i32>,
}

impl AccountFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.class.as_ref().is_none_or(|c| &user.class == c)
            && self.semester.is_none_or(|s| user.semester == Some(s))
    }
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    pub role: Role,
}

/// DTO for the first step of the login form.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyUsernameRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    pub role: Role,
}

/// DTO for first-time password setup.
#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    pub role: Role,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub new_password: String,
}
