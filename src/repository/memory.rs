// src/repository/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ExamCatalog, ExamRepository, QuestionRepository, SubjectRepository, UserRepository};
use crate::{
    error::AppError,
    models::{
        exam::{ExamDefinition, ExamSummary, NewExam},
        question::{NewQuestion, Question},
        subject::{AssignedTeacher, CreateSubjectRequest, Subject},
        submission::SubmissionResult,
        user::{AccountFilter, NewUser, Role, User},
    },
};

#[derive(Debug, Clone)]
struct SubjectRecord {
    id: i64,
    code: String,
    name: String,
    department: String,
    semester: i32,
    is_lab: bool,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ExamRecord {
    /// Definition without its questions; they are resolved on read.
    definition: ExamDefinition,
    question_ids: Vec<i64>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    subjects: BTreeMap<i64, SubjectRecord>,
    /// (subject_id, teacher_id) in assignment order.
    assignments: Vec<(i64, i64)>,
    questions: BTreeMap<i64, Question>,
    exams: BTreeMap<i64, ExamRecord>,
    submissions: Vec<SubmissionResult>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn subject(&self, record: &SubjectRecord) -> Subject {
        let teachers = self
            .assignments
            .iter()
            .filter(|(subject_id, _)| *subject_id == record.id)
            .filter_map(|(_, teacher_id)| self.users.get(teacher_id))
            .map(|t| AssignedTeacher {
                teacher_id: t.id,
                name: t.name.clone(),
                username: t.username.clone(),
            })
            .collect();

        Subject {
            id: record.id,
            code: record.code.clone(),
            name: record.name.clone(),
            department: record.department.clone(),
            semester: record.semester,
            is_lab: record.is_lab,
            teachers,
            created_at: Some(record.created_at),
        }
    }

    fn subject_by_id(&self, id: i64) -> Result<Subject, AppError> {
        self.subjects
            .get(&id)
            .map(|r| self.subject(r))
            .ok_or(AppError::NotFound("Subject not found".to_string()))
    }

    fn exam(&self, record: &ExamRecord) -> ExamDefinition {
        let mut definition = record.definition.clone();
        definition.questions = record
            .question_ids
            .iter()
            .filter_map(|id| self.questions.get(id).cloned())
            .collect();
        definition
    }
}

/// Process-local store. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str, role: Role) -> Result<Option<User>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username && u.role == role)
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables.username_taken(&user.username, None) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }

        let id = tables.allocate_id();
        let created = User {
            id,
            username: user.username,
            name: user.name,
            password: user.password,
            role: user.role,
            email: user.email,
            department: user.department,
            class: user.class,
            semester: user.semester,
            roll_number: user.roll_number,
            created_at: Some(Utc::now()),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, user: &User) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if tables.username_taken(&user.username, Some(user.id)) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        // password and role are not profile fields
        let password = stored.password.take();
        let role = stored.role;
        *stored = User {
            password,
            role,
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        user.password = Some(password_hash.to_string());
        Ok(())
    }

    async fn delete(&self, id: i64, role: Role) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        match tables.users.get(&id) {
            Some(user) if user.role == role => {}
            _ => return Err(AppError::NotFound(format!("{} not found", role))),
        }
        tables.users.remove(&id);
        tables.assignments.retain(|(_, teacher_id)| *teacher_id != id);
        Ok(())
    }

    async fn list(&self, role: Role, filter: &AccountFilter) -> Result<Vec<User>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .rev()
            .filter(|u| u.role == role && filter.matches(u))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubjectRepository for MemoryStore {
    async fn create(&self, subject: CreateSubjectRequest) -> Result<Subject, AppError> {
        let mut tables = self.tables.write().await;
        if tables.subjects.values().any(|s| s.code == subject.code) {
            return Err(AppError::BadRequest(
                "Subject with this code already exists".to_string(),
            ));
        }

        let id = tables.allocate_id();
        let record = SubjectRecord {
            id,
            code: subject.code,
            name: subject.name,
            department: subject.department,
            semester: subject.semester,
            is_lab: subject.is_lab,
            created_at: Utc::now(),
        };
        let created = tables.subject(&record);
        tables.subjects.insert(id, record);
        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<Subject>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.subjects.get(&id).map(|r| tables.subject(r)))
    }

    async fn list(&self) -> Result<Vec<Subject>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.subjects.values().map(|r| tables.subject(r)).collect())
    }

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<Subject>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subjects
            .values()
            .filter(|r| tables.assignments.contains(&(r.id, teacher_id)))
            .map(|r| tables.subject(r))
            .collect())
    }

    async fn assign_teacher(&self, subject_id: i64, teacher: &User) -> Result<Subject, AppError> {
        let mut tables = self.tables.write().await;
        tables.subject_by_id(subject_id)?;
        if tables.assignments.contains(&(subject_id, teacher.id)) {
            return Err(AppError::BadRequest(
                "Teacher is already assigned to this subject".to_string(),
            ));
        }
        tables.assignments.push((subject_id, teacher.id));
        tables.subject_by_id(subject_id)
    }

    async fn remove_teacher(&self, subject_id: i64, teacher_id: i64) -> Result<Subject, AppError> {
        let mut tables = self.tables.write().await;
        tables.subject_by_id(subject_id)?;
        tables
            .assignments
            .retain(|pair| *pair != (subject_id, teacher_id));
        tables.subject_by_id(subject_id)
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn create(&self, question: NewQuestion) -> Result<Question, AppError> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        let created = Question {
            id,
            subject_id: question.subject_id,
            text: question.text,
            options: question.options,
            correct_answer: question.correct_answer,
            difficulty: question.difficulty,
            created_by: question.created_by,
            created_at: Some(Utc::now()),
        };
        tables.questions.insert(id, created.clone());
        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .questions
            .values()
            .filter(|q| q.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn update(&self, question: &Question) -> Result<Question, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .questions
            .get_mut(&question.id)
            .ok_or(AppError::NotFound("Question not found".to_string()))?;
        stored.text = question.text.clone();
        stored.options = question.options.clone();
        stored.correct_answer = question.correct_answer;
        stored.difficulty = question.difficulty;
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.exams.values().any(|e| e.question_ids.contains(&id)) {
            return Err(AppError::Conflict(
                "Question is used by a deployed exam".to_string(),
            ));
        }
        tables
            .questions
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound("Question not found".to_string()))
    }
}

#[async_trait]
impl ExamRepository for MemoryStore {
    async fn fetch_definition(&self, exam_id: i64) -> Result<Option<ExamDefinition>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.exams.get(&exam_id).map(|r| tables.exam(r)))
    }

    async fn submit(&self, result: &SubmissionResult) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .submissions
            .iter()
            .any(|s| s.exam_id == result.exam_id && s.student_id == result.student_id)
        {
            return Err(AppError::Conflict(
                "Exam already submitted by this student".to_string(),
            ));
        }
        tables.submissions.push(result.clone());
        Ok(())
    }
}

#[async_trait]
impl ExamCatalog for MemoryStore {
    async fn create(&self, exam: NewExam) -> Result<ExamDefinition, AppError> {
        let mut tables = self.tables.write().await;
        for selection in &exam.questions {
            if !tables.questions.contains_key(&selection.question_id) {
                return Err(AppError::BadRequest(format!(
                    "Question {} does not exist",
                    selection.question_id
                )));
            }
        }

        let id = tables.allocate_id();
        let total_marks = exam.total_marks();
        let record = ExamRecord {
            definition: ExamDefinition {
                id,
                subject_id: exam.subject_id,
                teacher_id: exam.teacher_id,
                title: exam.title,
                description: exam.description,
                questions: Vec::new(),
                marks: exam.questions.iter().map(|q| q.marks).collect(),
                start_time: exam.start_time,
                end_time: exam.end_time,
                duration_minutes: exam.duration_minutes,
                pass_percentage: exam.pass_percentage,
                total_marks,
                is_active: true,
                created_at: Some(Utc::now()),
            },
            question_ids: exam.questions.iter().map(|q| q.question_id).collect(),
        };
        let created = tables.exam(&record);
        tables.exams.insert(id, record);
        Ok(created)
    }

    async fn list_for_teacher(&self, teacher_id: i64) -> Result<Vec<ExamSummary>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .exams
            .values()
            .rev()
            .filter(|r| r.definition.teacher_id == teacher_id)
            .map(|r| tables.exam(r).summary())
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<ExamSummary>, AppError> {
        let tables = self.tables.read().await;
        let mut exams: Vec<ExamSummary> = tables
            .exams
            .values()
            .filter(|r| r.definition.is_active)
            .map(|r| tables.exam(r).summary())
            .collect();
        exams.sort_by_key(|e| e.start_time);
        Ok(exams)
    }

    async fn has_submitted(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .iter()
            .any(|s| s.exam_id == exam_id && s.student_id == student_id))
    }

    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<SubmissionResult>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .iter()
            .filter(|s| s.exam_id == exam_id)
            .cloned()
            .collect())
    }

    async fn results_for_student(&self, student_id: i64) -> Result<Vec<SubmissionResult>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .iter()
            .rev()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }
}
