// src/session/mod.rs

//! Timed, proctored exam attempts.
//!
//! An [`ExamSession`] owns one learner's attempt at one exam. It is driven by
//! discrete events (learner commands, the deadline timer, visibility changes of
//! the presentation surface) that are applied one at a time, and it produces at
//! most one delivered [`SubmissionResult`](crate::models::submission::SubmissionResult).

pub mod clock;
pub mod engine;
pub mod registry;
pub mod scoring;
pub mod subscription;
pub mod surface;

use serde::Serialize;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ExamSession, QuestionStatus, SessionPhase, SessionView, SubmitMode};
pub use registry::{ClientReport, SessionCommand, SessionRegistry, SessionState};
pub use subscription::Subscription;
pub use surface::{ClientSurface, ClientSurfaceHandle, PresentationSurface, SurfaceError, VisibilitySink};

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("exam has no questions")]
    EmptyExam,

    #[error("exam is not open for attempts right now")]
    OutsideWindow,

    #[error("exam has already been submitted")]
    AlreadySubmitted,

    #[error("session has been closed")]
    Closed,

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(i64),

    #[error("option {option} is out of range for question {question_id}")]
    InvalidOption { question_id: i64, option: usize },

    #[error("{unanswered} question(s) are unanswered; confirm to submit anyway")]
    ConfirmationRequired { unanswered: usize },

    #[error("failed to submit exam: {0}")]
    Delivery(String),

    #[error("no submission is waiting for redelivery")]
    NothingToRetry,

    #[error("session not found")]
    NotFound,

    #[error("session is no longer running")]
    Unavailable,
}

/// Inputs that arrive from outside the learner's command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    DeadlineElapsed,
    VisibilityChanged { hidden: bool },
    FullscreenChanged { granted: bool },
}

/// User-visible notifications raised by a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    FullscreenDenied,
    TabSwitchWarning { count: u32, limit: u32 },
    IntegrityViolation { count: u32 },
    TimeUp,
    Submitted { auto: bool },
    SubmissionFailed { reason: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::FullscreenDenied => {
                "Fullscreen is off; tab switching is still monitored.".to_string()
            }
            Notice::TabSwitchWarning { .. } => {
                "Warning: One more tab switch will submit your exam!".to_string()
            }
            Notice::IntegrityViolation { .. } => {
                "Exam submitted due to multiple tab switches!".to_string()
            }
            Notice::TimeUp => {
                "Exam time ended. Your answers have been submitted.".to_string()
            }
            Notice::Submitted { .. } => "Exam submitted successfully".to_string(),
            Notice::SubmissionFailed { reason } => format!("Failed to submit exam: {}", reason),
        }
    }
}

/// Receives notifications from a session. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Who is taking the exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learner {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_tab_switches: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_tab_switches: crate::config::DEFAULT_MAX_TAB_SWITCHES,
        }
    }
}
