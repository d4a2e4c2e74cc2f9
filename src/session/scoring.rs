// src/session/scoring.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::Learner;
use crate::models::{
    exam::ExamDefinition,
    submission::{AnswerRecord, SubmissionResult, Verdict},
};

/// Scores an attempt.
///
/// Only answered questions appear in `answers`, but the percentage is taken over
/// every question of the exam, so leaving a question blank costs the same as
/// answering it wrong. `order` lists indexes into `exam.questions` and fixes the
/// order of the answer records.
pub fn score_attempt(
    exam: &ExamDefinition,
    order: &[usize],
    selections: &HashMap<i64, usize>,
    learner: &Learner,
    submitted_at: DateTime<Utc>,
) -> SubmissionResult {
    let answers: Vec<AnswerRecord> = order
        .iter()
        .filter_map(|&idx| exam.questions.get(idx))
        .filter_map(|q| {
            selections.get(&q.id).map(|&selected| AnswerRecord {
                question_id: q.id,
                selected_option: selected,
                is_correct: selected == q.correct_answer,
            })
        })
        .collect();

    let total_questions = exam.questions.len();
    let correct_answers = answers.iter().filter(|a| a.is_correct).count();
    let percentage = if total_questions == 0 {
        0.0
    } else {
        correct_answers as f64 / total_questions as f64 * 100.0
    };
    let status = if percentage >= f64::from(exam.pass_percentage) {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    SubmissionResult {
        exam_id: exam.id,
        student_id: learner.id,
        student_name: learner.name.clone(),
        answers,
        total_questions,
        correct_answers,
        wrong_answers: total_questions - correct_answers,
        score: correct_answers,
        percentage,
        status,
        submitted_at,
    }
}
