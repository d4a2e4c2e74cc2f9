// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{MAX_GENERATED_QUESTIONS, OPTIONS_PER_QUESTION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub subject_id: i64,

    /// The text content of the question.
    pub text: String,

    /// The answer options, in display order. Always `OPTIONS_PER_QUESTION` long.
    pub options: Vec<String>,

    /// Index into `options` of the correct answer.
    pub correct_answer: usize,

    pub difficulty: Difficulty,

    /// Teacher who authored the question.
    pub created_by: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending question to client (excludes the correct answer).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            difficulty: q.difficulty,
        }
    }
}

/// Insert payload handed to the repository layer.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub subject_id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub difficulty: Difficulty,
    pub created_by: i64,
}

/// DTO for authoring a question by hand.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_correct_answer))]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// DTO for editing a question. The full option set is replaced when present.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<usize>,
    pub difficulty: Option<Difficulty>,
}

/// DTO for asking the model service for questions on a topic.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateQuestionsRequest {
    #[validate(length(min = 1, max = 500, message = "Please enter a valid topic"))]
    pub topic: String,
    #[validate(range(min = 1, max = MAX_GENERATED_QUESTIONS))]
    #[serde(default = "default_generated_count")]
    pub count: u32,
}

fn default_generated_count() -> u32 {
    5
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTIONS_PER_QUESTION {
        return Err(validator::ValidationError::new("options_must_have_four_entries"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn validate_correct_answer(req: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    if req.correct_answer >= req.options.len() {
        return Err(validator::ValidationError::new("correct_answer_out_of_range"));
    }
    Ok(())
}
