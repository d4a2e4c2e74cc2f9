// src/models/subject.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A teacher attached to a subject, denormalized for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedTeacher {
    pub teacher_id: i64,
    pub name: String,
    pub username: String,
}

/// Represents the 'subjects' table joined with its teacher assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,

    /// Unique course code (e.g. "CS301").
    pub code: String,
    pub name: String,
    pub department: String,
    pub semester: i32,
    pub is_lab: bool,
    pub teachers: Vec<AssignedTeacher>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Subject {
    pub fn has_teacher(&self, teacher_id: i64) -> bool {
        self.teachers.iter().any(|t| t.teacher_id == teacher_id)
    }
}

/// DTO for creating a new subject.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub department: String,
    #[validate(range(min = 1, max = 12))]
    pub semester: i32,
    #[serde(default)]
    pub is_lab: bool,
}

/// DTO for assigning or removing a teacher.
#[derive(Debug, Deserialize)]
pub struct TeacherAssignmentRequest {
    pub subject_id: i64,
    pub teacher_id: i64,
}
