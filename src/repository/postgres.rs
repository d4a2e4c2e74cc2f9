// src/repository/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use super::{ExamCatalog, ExamRepository, QuestionRepository, SubjectRepository, UserRepository};
use crate::{
    error::AppError,
    models::{
        exam::{ExamDefinition, ExamSummary, NewExam},
        question::{Difficulty, NewQuestion, Question},
        subject::{AssignedTeacher, CreateSubjectRequest, Subject},
        submission::{AnswerRecord, SubmissionResult, Verdict},
        user::{AccountFilter, NewUser, Role, User},
    },
};

/// Repository implementation over the Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Logs the failure and maps it to a 500.
fn internal(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!("{}: {:?}", context, e);
        AppError::InternalServerError(e.to_string())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn corrupt(what: &str, value: &str) -> AppError {
    tracing::error!("Unexpected {} value in database: {}", what, value);
    AppError::InternalServerError(format!("unexpected {} '{}'", what, value))
}

const USER_COLUMNS: &str = "id, username, name, password, role, email, department, class, semester, roll_number, created_at";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    name: String,
    password: Option<String>,
    role: String,
    email: String,
    department: String,
    class: String,
    semester: Option<i32>,
    roll_number: String,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(|_| corrupt("role", &row.role))?;
        Ok(User {
            id: row.id,
            username: row.username,
            name: row.name,
            password: row.password,
            role,
            email: row.email,
            department: row.department,
            class: row.class,
            semester: row.semester,
            roll_number: row.roll_number,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("Failed to fetch user"))?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_username(&self, username: &str, role: Role) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1 AND role = $2",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("Failed to fetch user"))?
        .map(User::try_from)
        .transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, name, password, role, email, department, class, semester, roll_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(&user.email)
        .bind(&user.department)
        .bind(&user.class)
        .bind(user.semester)
        .bind(&user.roll_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?
        .try_into()
    }

    async fn update(&self, user: &User) -> Result<User, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET username = $1, name = $2, email = $3, department = $4,
                class = $5, semester = $6, roll_number = $7
            WHERE id = $8
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.department)
        .bind(&user.class)
        .bind(user.semester)
        .bind(&user.roll_number)
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                tracing::error!("Failed to update user: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?
        .ok_or(AppError::NotFound("User not found".to_string()))?
        .try_into()
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal("Failed to set password"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: i64, role: Role) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role = $2")
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(internal("Failed to delete user"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{} not found", role)));
        }
        Ok(())
    }

    async fn list(&self, role: Role, filter: &AccountFilter) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {} FROM users
            WHERE role = $1
              AND ($2::TEXT IS NULL OR class = $2)
              AND ($3::INT IS NULL OR semester = $3)
            ORDER BY id DESC
            "#,
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .bind(&filter.class)
        .bind(filter.semester)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list users"))?
        .into_iter()
        .map(User::try_from)
        .collect()
    }
}

#[derive(FromRow)]
struct SubjectRow {
    id: i64,
    code: String,
    name: String,
    department: String,
    semester: i32,
    is_lab: bool,
    created_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct AssignmentRow {
    subject_id: i64,
    teacher_id: i64,
    name: String,
    username: String,
}

impl PgStore {
    /// Attaches teacher assignments to subject rows with one extra query.
    async fn hydrate_subjects(&self, rows: Vec<SubjectRow>) -> Result<Vec<Subject>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let assignments = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT st.subject_id, u.id AS teacher_id, u.name, u.username
            FROM subject_teachers st
            JOIN users u ON u.id = st.teacher_id
            WHERE st.subject_id = ANY($1)
            ORDER BY st.assigned_at
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to load subject teachers"))?;

        let mut teachers: HashMap<i64, Vec<AssignedTeacher>> = HashMap::new();
        for a in assignments {
            teachers.entry(a.subject_id).or_default().push(AssignedTeacher {
                teacher_id: a.teacher_id,
                name: a.name,
                username: a.username,
            });
        }

        Ok(rows
            .into_iter()
            .map(|r| Subject {
                teachers: teachers.remove(&r.id).unwrap_or_default(),
                id: r.id,
                code: r.code,
                name: r.name,
                department: r.department,
                semester: r.semester,
                is_lab: r.is_lab,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn subject_or_not_found(&self, id: i64) -> Result<Subject, AppError> {
        SubjectRepository::find(self, id)
            .await?
            .ok_or(AppError::NotFound("Subject not found".to_string()))
    }
}

#[async_trait]
impl SubjectRepository for PgStore {
    async fn create(&self, subject: CreateSubjectRequest) -> Result<Subject, AppError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            r#"
            INSERT INTO subjects (code, name, department, semester, is_lab)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, code, name, department, semester, is_lab, created_at
            "#,
        )
        .bind(&subject.code)
        .bind(&subject.name)
        .bind(&subject.department)
        .bind(subject.semester)
        .bind(subject.is_lab)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Subject with this code already exists".to_string())
            } else {
                tracing::error!("Failed to create subject: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;

        self.hydrate_subjects(vec![row])
            .await?
            .pop()
            .ok_or(AppError::InternalServerError("subject vanished after insert".to_string()))
    }

    async fn find(&self, id: i64) -> Result<Option<Subject>, AppError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, code, name, department, semester, is_lab, created_at FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("Failed to fetch subject"))?;

        match row {
            Some(row) => Ok(self.hydrate_subjects(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Subject>, AppError> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, code, name, department, semester, is_lab, created_at FROM subjects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list subjects"))?;

        self.hydrate_subjects(rows).await
    }

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<Subject>, AppError> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            r#"
            SELECT s.id, s.code, s.name, s.department, s.semester, s.is_lab, s.created_at
            FROM subjects s
            JOIN subject_teachers st ON st.subject_id = s.id
            WHERE st.teacher_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list teacher subjects"))?;

        self.hydrate_subjects(rows).await
    }

    async fn assign_teacher(&self, subject_id: i64, teacher: &User) -> Result<Subject, AppError> {
        sqlx::query("INSERT INTO subject_teachers (subject_id, teacher_id) VALUES ($1, $2)")
            .bind(subject_id)
            .bind(teacher.id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::BadRequest("Teacher is already assigned to this subject".to_string())
                } else if is_foreign_key_violation(&e) {
                    AppError::NotFound("Subject not found".to_string())
                } else {
                    tracing::error!("Failed to assign teacher: {:?}", e);
                    AppError::InternalServerError(e.to_string())
                }
            })?;

        self.subject_or_not_found(subject_id).await
    }

    async fn remove_teacher(&self, subject_id: i64, teacher_id: i64) -> Result<Subject, AppError> {
        sqlx::query("DELETE FROM subject_teachers WHERE subject_id = $1 AND teacher_id = $2")
            .bind(subject_id)
            .bind(teacher_id)
            .execute(&self.pool)
            .await
            .map_err(internal("Failed to remove teacher"))?;

        self.subject_or_not_found(subject_id).await
    }
}

const QUESTION_COLUMNS: &str =
    "id, subject_id, text, options, correct_answer, difficulty, created_by, created_at";

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    subject_id: i64,
    text: String,
    options: Json<Vec<String>>,
    correct_answer: i32,
    difficulty: String,
    created_by: i64,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let difficulty =
            Difficulty::parse(&row.difficulty).ok_or_else(|| corrupt("difficulty", &row.difficulty))?;
        let correct_answer = usize::try_from(row.correct_answer)
            .map_err(|_| corrupt("correct_answer", &row.correct_answer.to_string()))?;
        Ok(Question {
            id: row.id,
            subject_id: row.subject_id,
            text: row.text,
            options: row.options.0,
            correct_answer,
            difficulty,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn create(&self, question: NewQuestion) -> Result<Question, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions (subject_id, text, options, correct_answer, difficulty, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(question.subject_id)
        .bind(&question.text)
        .bind(Json(&question.options))
        .bind(question.correct_answer as i32)
        .bind(question.difficulty.as_str())
        .bind(question.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(internal("Failed to create question"))?
        .try_into()
    }

    async fn find(&self, id: i64) -> Result<Option<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("Failed to fetch question"))?
        .map(Question::try_from)
        .transpose()
    }

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE subject_id = $1 ORDER BY id",
            QUESTION_COLUMNS
        ))
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list questions"))?
        .into_iter()
        .map(Question::try_from)
        .collect()
    }

    async fn update(&self, question: &Question) -> Result<Question, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            UPDATE questions
            SET text = $1, options = $2, correct_answer = $3, difficulty = $4
            WHERE id = $5
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(&question.text)
        .bind(Json(&question.options))
        .bind(question.correct_answer as i32)
        .bind(question.difficulty.as_str())
        .bind(question.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("Failed to update question"))?
        .ok_or(AppError::NotFound("Question not found".to_string()))?
        .try_into()
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict("Question is used by a deployed exam".to_string())
                } else {
                    tracing::error!("Failed to delete question: {:?}", e);
                    AppError::InternalServerError(e.to_string())
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
        Ok(())
    }
}

const EXAM_COLUMNS: &str = r#"
    e.id, e.subject_id, e.teacher_id, e.title, e.description, e.start_time, e.end_time,
    e.duration_minutes, e.pass_percentage, e.total_marks, e.is_active, e.created_at,
    (SELECT COUNT(*) FROM exam_questions eq WHERE eq.exam_id = e.id) AS question_count
"#;

#[derive(FromRow)]
struct ExamRow {
    id: i64,
    subject_id: i64,
    teacher_id: i64,
    title: String,
    description: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_minutes: i32,
    pass_percentage: i32,
    total_marks: i32,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    question_count: i64,
}

impl ExamRow {
    fn summary(&self) -> ExamSummary {
        ExamSummary {
            id: self.id,
            subject_id: self.subject_id,
            teacher_id: self.teacher_id,
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes,
            pass_percentage: self.pass_percentage,
            total_marks: self.total_marks,
            question_count: self.question_count.max(0) as usize,
        }
    }
}

#[derive(FromRow)]
struct ExamQuestionRow {
    #[sqlx(flatten)]
    question: QuestionRow,
    marks: i32,
}

impl PgStore {
    async fn exam_by_id(&self, exam_id: i64) -> Result<Option<ExamDefinition>, AppError> {
        let Some(row) = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM exams e WHERE e.id = $1",
            EXAM_COLUMNS
        ))
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("Failed to fetch exam"))?
        else {
            return Ok(None);
        };

        let question_rows = sqlx::query_as::<_, ExamQuestionRow>(
            r#"
            SELECT q.id, q.subject_id, q.text, q.options, q.correct_answer, q.difficulty,
                   q.created_by, q.created_at, eq.marks
            FROM exam_questions eq
            JOIN questions q ON q.id = eq.question_id
            WHERE eq.exam_id = $1
            ORDER BY eq.position
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to fetch exam questions"))?;

        let mut questions = Vec::with_capacity(question_rows.len());
        let mut marks = Vec::with_capacity(question_rows.len());
        for r in question_rows {
            marks.push(r.marks);
            questions.push(Question::try_from(r.question)?);
        }

        Ok(Some(ExamDefinition {
            id: row.id,
            subject_id: row.subject_id,
            teacher_id: row.teacher_id,
            title: row.title,
            description: row.description,
            questions,
            marks,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_minutes: row.duration_minutes,
            pass_percentage: row.pass_percentage,
            total_marks: row.total_marks,
            is_active: row.is_active,
            created_at: row.created_at,
        }))
    }
}

#[derive(FromRow)]
struct SubmissionRow {
    exam_id: i64,
    student_id: i64,
    student_name: String,
    answers: Json<Vec<AnswerRecord>>,
    total_questions: i32,
    correct_answers: i32,
    wrong_answers: i32,
    score: i32,
    percentage: f64,
    status: String,
    submitted_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for SubmissionResult {
    type Error = AppError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let status = Verdict::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?;
        Ok(SubmissionResult {
            exam_id: row.exam_id,
            student_id: row.student_id,
            student_name: row.student_name,
            answers: row.answers.0,
            total_questions: row.total_questions.max(0) as usize,
            correct_answers: row.correct_answers.max(0) as usize,
            wrong_answers: row.wrong_answers.max(0) as usize,
            score: row.score.max(0) as usize,
            percentage: row.percentage,
            status,
            submitted_at: row.submitted_at,
        })
    }
}

const SUBMISSION_COLUMNS: &str = "exam_id, student_id, student_name, answers, total_questions, correct_answers, wrong_answers, score, percentage, status, submitted_at";

#[async_trait]
impl ExamRepository for PgStore {
    async fn fetch_definition(&self, exam_id: i64) -> Result<Option<ExamDefinition>, AppError> {
        self.exam_by_id(exam_id).await
    }

    async fn submit(&self, result: &SubmissionResult) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO submissions ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            SUBMISSION_COLUMNS
        ))
        .bind(result.exam_id)
        .bind(result.student_id)
        .bind(&result.student_name)
        .bind(Json(&result.answers))
        .bind(result.total_questions as i32)
        .bind(result.correct_answers as i32)
        .bind(result.wrong_answers as i32)
        .bind(result.score as i32)
        .bind(result.percentage)
        .bind(result.status.as_str())
        .bind(result.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Exam already submitted by this student".to_string())
            } else {
                tracing::error!("Failed to store submission: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;

        Ok(())
    }
}

#[async_trait]
impl ExamCatalog for PgStore {
    async fn create(&self, exam: NewExam) -> Result<ExamDefinition, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(internal("Failed to begin transaction"))?;

        let exam_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO exams (subject_id, teacher_id, title, description, start_time, end_time,
                               duration_minutes, pass_percentage, total_marks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(exam.subject_id)
        .bind(exam.teacher_id)
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.start_time)
        .bind(exam.end_time)
        .bind(exam.duration_minutes)
        .bind(exam.pass_percentage)
        .bind(exam.total_marks())
        .fetch_one(&mut *tx)
        .await
        .map_err(internal("Failed to create exam"))?;

        for (position, selection) in exam.questions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO exam_questions (exam_id, question_id, position, marks) VALUES ($1, $2, $3, $4)",
            )
            .bind(exam_id)
            .bind(selection.question_id)
            .bind(position as i32)
            .bind(selection.marks)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::BadRequest(format!("Question {} does not exist", selection.question_id))
                } else if is_unique_violation(&e) {
                    AppError::BadRequest(format!("Question {} selected twice", selection.question_id))
                } else {
                    tracing::error!("Failed to attach exam question: {:?}", e);
                    AppError::InternalServerError(e.to_string())
                }
            })?;
        }

        tx.commit().await.map_err(internal("Failed to commit exam"))?;

        self.exam_by_id(exam_id)
            .await?
            .ok_or(AppError::InternalServerError("exam vanished after insert".to_string()))
    }

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<ExamSummary>, AppError> {
        let rows = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM exams e WHERE e.teacher_id = $1 ORDER BY e.created_at DESC",
            EXAM_COLUMNS
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list teacher exams"))?;

        Ok(rows.iter().map(ExamRow::summary).collect())
    }

    async fn list_active(&self) -> Result<Vec<ExamSummary>, AppError> {
        let rows = sqlx::query_as::<_, ExamRow>(&format!(
            "SELECT {} FROM exams e WHERE e.is_active ORDER BY e.start_time",
            EXAM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list exams"))?;

        Ok(rows.iter().map(ExamRow::summary).collect())
    }

    async fn has_submitted(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM submissions WHERE exam_id = $1 AND student_id = $2)",
        )
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(internal("Failed to check submission"))
    }

    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<SubmissionResult>, AppError> {
        sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {} FROM submissions WHERE exam_id = $1 ORDER BY submitted_at",
            SUBMISSION_COLUMNS
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list exam results"))?
        .into_iter()
        .map(SubmissionResult::try_from)
        .collect()
    }

    async fn results_for_student(&self, student_id: i64) -> Result<Vec<SubmissionResult>, AppError> {
        sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {} FROM submissions WHERE student_id = $1 ORDER BY submitted_at DESC",
            SUBMISSION_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("Failed to list student results"))?
        .into_iter()
        .map(SubmissionResult::try_from)
        .collect()
    }
}
