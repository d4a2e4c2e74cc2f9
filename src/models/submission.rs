// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pass/fail verdict against the exam's pass percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(Verdict::Pass),
            "fail" => Some(Verdict::Fail),
            _ => None,
        }
    }
}

/// One answered question in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub selected_option: usize,
    pub is_correct: bool,
}

/// Scored outcome of one exam attempt. Stored in the 'submissions' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub exam_id: i64,
    pub student_id: i64,
    pub student_name: String,

    /// Answered questions only, in presentation order.
    pub answers: Vec<AnswerRecord>,

    pub total_questions: usize,
    pub correct_answers: usize,

    /// Everything not correct, unanswered questions included.
    pub wrong_answers: usize,
    pub score: usize,
    pub percentage: f64,
    pub status: Verdict,
    pub submitted_at: DateTime<Utc>,
}
