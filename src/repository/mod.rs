// src/repository/mod.rs

//! Storage seams. Handlers and sessions only see these traits; `postgres` backs
//! production and `memory` backs development without a database and the tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        exam::{ExamDefinition, ExamSummary, NewExam},
        question::{NewQuestion, Question},
        subject::{CreateSubjectRequest, Subject},
        submission::SubmissionResult,
        user::{AccountFilter, NewUser, Role, User},
    },
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str, role: Role) -> Result<Option<User>, AppError>;

    /// Fails with `Conflict` when the username is taken.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Persists every profile field of `user`. Fails with `Conflict` on a username clash.
    async fn update(&self, user: &User) -> Result<User, AppError>;

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError>;

    async fn delete(&self, id: i64, role: Role) -> Result<(), AppError>;

    async fn list(&self, role: Role, filter: &AccountFilter) -> Result<Vec<User>, AppError>;
}

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Fails with `BadRequest` when the code is taken.
    async fn create(&self, subject: CreateSubjectRequest) -> Result<Subject, AppError>;

    async fn find(&self, id: i64) -> Result<Option<Subject>, AppError>;

    async fn list(&self) -> Result<Vec<Subject>, AppError>;

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<Subject>, AppError>;

    /// Fails with `BadRequest` when the teacher is already assigned.
    async fn assign_teacher(&self, subject_id: i64, teacher: &User) -> Result<Subject, AppError>;

    async fn remove_teacher(&self, subject_id: i64, teacher_id: i64) -> Result<Subject, AppError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn create(&self, question: NewQuestion) -> Result<Question, AppError>;

    async fn find(&self, id: i64) -> Result<Option<Question>, AppError>;

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<Question>, AppError>;

    async fn update(&self, question: &Question) -> Result<Question, AppError>;

    /// Fails with `Conflict` while a deployed exam uses the question.
    async fn delete(&self, id: i64) -> Result<(), AppError>;
}

/// What a running exam session needs from storage.
#[async_trait]
pub trait ExamRepository: Send + Sync {
    async fn fetch_definition(&self, exam_id: i64) -> Result<Option<ExamDefinition>, AppError>;

    /// Stores a scored attempt. Fails with `Conflict` if the student already has one.
    async fn submit(&self, result: &SubmissionResult) -> Result<(), AppError>;
}

/// Exam deployment and result bookkeeping.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    async fn create(&self, exam: NewExam) -> Result<ExamDefinition, AppError>;

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<ExamSummary>, AppError>;

    async fn list_active(&self) -> Result<Vec<ExamSummary>, AppError>;

    async fn has_submitted(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError>;

    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<SubmissionResult>, AppError>;

    async fn results_for_student(&self, student_id: i64) -> Result<Vec<SubmissionResult>, AppError>;
}

/// All repositories, shared through `AppState`.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub subjects: Arc<dyn SubjectRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub exams: Arc<dyn ExamRepository>,
    pub catalog: Arc<dyn ExamCatalog>,
}

impl Repositories {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_store(Arc::new(postgres::PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(memory::MemoryStore::default()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + SubjectRepository
            + QuestionRepository
            + ExamRepository
            + ExamCatalog
            + 'static,
    {
        Self {
            users: store.clone(),
            subjects: store.clone(),
            questions: store.clone(),
            exams: store.clone(),
            catalog: store,
        }
    }
}
