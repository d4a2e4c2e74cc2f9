// src/models/exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::question::Question;

/// A deployed exam with its question set, in authoring order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,

    /// Marks per question, parallel to `questions`.
    pub marks: Vec<i32>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,

    /// Minimum percentage (0-100) required to pass.
    pub pass_percentage: i32,
    pub total_marks: i32,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl ExamDefinition {
    /// Whether an attempt may be started at `now`: `[start_time, end_time)`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && now < self.end_time
    }

    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn summary(&self) -> ExamSummary {
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
            question_count: self.questions.len(),
        }
    }
}

/// Exam listing entry without the question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummary {
    pub id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub pass_percentage: i32,
    pub total_marks: i32,
    pub question_count: usize,
}

/// Where an exam stands from one student's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamCardStatus {
    Upcoming,
    Active,
    Attended,
    Closed,
}

impl ExamCardStatus {
    pub fn classify(summary: &ExamSummary, attended: bool, now: DateTime<Utc>) -> Self {
        if attended {
            ExamCardStatus::Attended
        } else if now < summary.start_time {
            ExamCardStatus::Upcoming
        } else if now < summary.end_time {
            ExamCardStatus::Active
        } else {
            ExamCardStatus::Closed
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExamCard {
    #[serde(flatten)]
    pub exam: ExamSummary,
    pub status: ExamCardStatus,
}

/// One selected question and the marks it carries.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExamQuestionSelection {
    pub question_id: i64,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_marks")]
    pub marks: i32,
}

fn default_marks() -> i32 {
    1
}

/// DTO for deploying an exam.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_window))]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    pub subject_id: i64,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    #[validate(range(min = 0, max = 100))]
    pub pass_percentage: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(length(min = 1, message = "Please select at least one question"), nested)]
    pub questions: Vec<ExamQuestionSelection>,
}

fn validate_window(req: &CreateExamRequest) -> Result<(), validator::ValidationError> {
    if req.end_time <= req.start_time {
        return Err(validator::ValidationError::new("end_time_must_follow_start_time"));
    }
    Ok(())
}

/// Insert payload handed to the repository layer.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub subject_id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: String,
    pub questions: Vec<ExamQuestionSelection>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub pass_percentage: i32,
}

impl NewExam {
    pub fn total_marks(&self) -> i32 {
        self.questions.iter().map(|q| q.marks).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(start: DateTime<Utc>, end: DateTime<Utc>) -> ExamSummary {
        ExamSummary {
            id: 1,
            subject_id: 1,
            teacher_id: 1,
            title: "Midterm".to_string(),
            description: String::new(),
            start_time: start,
            end_time: end,
            duration_minutes: 60,
            pass_percentage: 40,
            total_marks: 10,
            question_count: 10,
        }
    }

    #[test]
    fn test_card_status_follows_window() {
        let now = Utc::now();
        let s = summary(now - Duration::minutes(5), now + Duration::minutes(5));
        assert_eq!(ExamCardStatus::classify(&s, false, now), ExamCardStatus::Active);
        assert_eq!(ExamCardStatus::classify(&s, true, now), ExamCardStatus::Attended);
        assert_eq!(
            ExamCardStatus::classify(&s, false, now - Duration::minutes(10)),
            ExamCardStatus::Upcoming
        );
        // end_time itself is outside the window
        assert_eq!(
            ExamCardStatus::classify(&s, false, s.end_time),
            ExamCardStatus::Closed
        );
    }

    #[test]
    fn test_create_request_rejects_inverted_window() {
        let now = Utc::now();
        let req = CreateExamRequest {
            title: "Quiz".to_string(),
            description: String::new(),
            subject_id: 1,
            duration_minutes: 30,
            pass_percentage: 50,
            start_time: now,
            end_time: now,
            questions: vec![ExamQuestionSelection { question_id: 1, marks: 1 }],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_checks_each_selection() {
        let now = Utc::now();
        let mut req = CreateExamRequest {
            title: "Midterm".to_string(),
            description: String::new(),
            subject_id: 1,
            duration_minutes: 30,
            pass_percentage: 50,
            start_time: now,
            end_time: now + Duration::hours(1),
            questions: vec![
                ExamQuestionSelection { question_id: 1, marks: 2 },
                ExamQuestionSelection { question_id: 2, marks: 0 },
            ],
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("questions"));

        req.questions[1].marks = 1;
        assert!(req.validate().is_ok());

        req.questions.clear();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("questions"));
    }
}
