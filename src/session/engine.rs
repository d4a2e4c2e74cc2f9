// src/session/engine.rs

use std::{collections::HashMap, sync::Arc};

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::mpsc;

use super::{
    Learner, Notice, SessionError, SessionEvent, SessionObserver, SessionSettings,
    clock::Clock,
    scoring::score_attempt,
    subscription::Subscription,
    surface::{PresentationSurface, VisibilitySink},
};
use crate::{
    models::{exam::ExamDefinition, question::PublicQuestion, submission::SubmissionResult},
    repository::ExamRepository,
};

/// Navigator status of a question.
///
/// `Flagged` replaces whatever status the question had, and unflagging always
/// goes back to `Unanswered`, even when an answer is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Unanswered,
    Answered,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Active,
    Submitted,
    Closed,
}

/// What triggered a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Learner-initiated. Unanswered questions require `confirmed`.
    Manual { confirmed: bool },
    Deadline,
    Integrity,
}

impl SubmitMode {
    pub fn is_auto(&self) -> bool {
        !matches!(self, SubmitMode::Manual { .. })
    }
}

/// Everything a session talks to.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub surface: Box<dyn PresentationSurface>,
    pub repository: Arc<dyn ExamRepository>,
    pub observer: Box<dyn SessionObserver>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigatorEntry {
    pub index: usize,
    pub question_id: i64,
    pub status: QuestionStatus,
    pub selected: Option<usize>,
}

/// Read-only rendering of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub exam_id: i64,
    pub title: String,
    pub phase: SessionPhase,
    pub current_index: usize,
    pub total_questions: usize,
    pub current_question: Option<PublicQuestion>,
    pub navigator: Vec<NavigatorEntry>,
    pub answered: usize,
    pub unanswered: usize,
    pub tab_switches: u32,
    pub max_tab_switches: u32,
    pub remaining_seconds: i64,
    pub fullscreen: bool,
    pub result: Option<SubmissionResult>,
    pub delivery_pending: bool,
}

/// One learner's attempt at one exam.
pub struct ExamSession {
    exam: ExamDefinition,
    learner: Learner,
    settings: SessionSettings,

    /// Indexes into `exam.questions`, shuffled once at start.
    order: Vec<usize>,
    cursor: usize,
    selections: HashMap<i64, usize>,
    statuses: HashMap<i64, QuestionStatus>,
    tab_switches: u32,

    phase: SessionPhase,
    result: Option<SubmissionResult>,
    undelivered: bool,

    exclusive: bool,
    deadline: Option<Subscription>,
    visibility: Option<Subscription>,
    events: mpsc::UnboundedReceiver<SessionEvent>,

    clock: Arc<dyn Clock>,
    surface: Box<dyn PresentationSurface>,
    repository: Arc<dyn ExamRepository>,
    observer: Box<dyn SessionObserver>,
}

impl ExamSession {
    /// Opens a session. The caller has already checked that the exam window is open.
    ///
    /// When the exam end has already passed, the attempt is submitted right away
    /// instead of arming a timer. A failed delivery in that case still returns the
    /// finished session with the result queued for redelivery.
    pub async fn start(
        exam: ExamDefinition,
        learner: Learner,
        settings: SessionSettings,
        collaborators: Collaborators,
    ) -> Result<Self, SessionError> {
        if exam.questions.is_empty() {
            return Err(SessionError::EmptyExam);
        }

        let Collaborators {
            clock,
            mut surface,
            repository,
            observer,
        } = collaborators;

        let mut order: Vec<usize> = (0..exam.questions.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        let statuses = exam
            .questions
            .iter()
            .map(|q| (q.id, QuestionStatus::Unanswered))
            .collect();

        let exclusive = surface.request_exclusive();
        if !exclusive {
            tracing::warn!(
                exam_id = exam.id,
                student_id = learner.id,
                "Fullscreen denied, continuing without it"
            );
            observer.notify(&Notice::FullscreenDenied);
        }

        let (tx, events) = mpsc::unbounded_channel();
        let visibility = surface.watch_visibility(VisibilitySink::new(tx.clone()));

        let remaining = exam.end_time - clock.now();
        let deadline = match remaining.to_std() {
            Ok(delay) if !delay.is_zero() => Some(clock.after(
                delay,
                Box::new(move || {
                    let _ = tx.send(SessionEvent::DeadlineElapsed);
                }),
            )),
            _ => None,
        };

        tracing::info!(
            exam_id = exam.id,
            student_id = learner.id,
            questions = exam.questions.len(),
            remaining_seconds = remaining.num_seconds(),
            "Exam session started"
        );

        let mut session = Self {
            exam,
            learner,
            settings,
            order,
            cursor: 0,
            selections: HashMap::new(),
            statuses,
            tab_switches: 0,
            phase: SessionPhase::Active,
            result: None,
            undelivered: false,
            exclusive,
            deadline,
            visibility: Some(visibility),
            events,
            clock,
            surface,
            repository,
            observer,
        };

        if session.deadline.is_none() {
            tracing::info!(exam_id = session.exam.id, "Exam already over, submitting immediately");
            if let Err(e) = session.submit(SubmitMode::Deadline).await {
                tracing::warn!(exam_id = session.exam.id, "Immediate submission failed: {}", e);
            }
        }

        Ok(session)
    }

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Questions in the order this learner sees them.
    pub fn presentation_order(&self) -> Vec<i64> {
        self.order.iter().map(|&i| self.exam.questions[i].id).collect()
    }

    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn answer_of(&self, question_id: i64) -> Option<usize> {
        self.selections.get(&question_id).copied()
    }

    pub fn status_of(&self, question_id: i64) -> Option<QuestionStatus> {
        self.statuses.get(&question_id).copied()
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switches
    }

    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    pub fn delivery_pending(&self) -> bool {
        self.undelivered
    }

    pub fn unanswered_count(&self) -> usize {
        self.exam.questions.len() - self.selections.len()
    }

    // -- navigation -------------------------------------------------------

    pub fn go_to(&mut self, index: usize) -> usize {
        self.cursor = index.min(self.order.len() - 1);
        self.cursor
    }

    pub fn next(&mut self) -> usize {
        self.go_to(self.cursor.saturating_add(1))
    }

    pub fn previous(&mut self) -> usize {
        self.go_to(self.cursor.saturating_sub(1))
    }

    // -- answering --------------------------------------------------------

    pub fn answer(&mut self, question_id: i64, option: usize) -> Result<(), SessionError> {
        self.ensure_active()?;
        let question = self
            .exam
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if option >= question.options.len() {
            return Err(SessionError::InvalidOption {
                question_id,
                option,
            });
        }

        self.selections.insert(question_id, option);
        self.statuses.insert(question_id, QuestionStatus::Answered);
        Ok(())
    }

    /// Flags or unflags a question and returns its new status.
    pub fn toggle_flag(&mut self, question_id: i64) -> Result<QuestionStatus, SessionError> {
        self.ensure_active()?;
        let status = self
            .statuses
            .get_mut(&question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;

        *status = match *status {
            QuestionStatus::Flagged => QuestionStatus::Unanswered,
            _ => QuestionStatus::Flagged,
        };
        Ok(*status)
    }

    // -- events -----------------------------------------------------------

    /// Waits for the next timer or visibility event.
    /// Resolves to `None` once the timer and the listener are both gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Applies every event that is already queued.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        if self.phase != SessionPhase::Active {
            tracing::debug!(exam_id = self.exam.id, ?event, "Ignoring event on finished session");
            return;
        }

        match event {
            SessionEvent::DeadlineElapsed => {
                self.deadline = None;
                tracing::info!(exam_id = self.exam.id, student_id = self.learner.id, "Exam time is up");
                if let Err(e) = self.submit(SubmitMode::Deadline).await {
                    tracing::warn!(exam_id = self.exam.id, "Deadline submission failed: {}", e);
                }
            }
            SessionEvent::VisibilityChanged { hidden: true } if self.visibility.is_some() => {
                self.record_tab_switch().await;
            }
            SessionEvent::VisibilityChanged { .. } => {}
            SessionEvent::FullscreenChanged { granted } if self.visibility.is_some() => {
                self.record_fullscreen(granted);
            }
            SessionEvent::FullscreenChanged { .. } => {}
        }
    }

    /// A refused or abandoned fullscreen leaves nothing to release; monitoring continues.
    fn record_fullscreen(&mut self, granted: bool) {
        if granted == self.exclusive {
            return;
        }
        self.exclusive = granted;
        if granted {
            tracing::info!(exam_id = self.exam.id, student_id = self.learner.id, "Fullscreen granted");
        } else {
            tracing::warn!(
                exam_id = self.exam.id,
                student_id = self.learner.id,
                "Fullscreen lost, continuing without it"
            );
            self.observer.notify(&Notice::FullscreenDenied);
        }
    }

    async fn record_tab_switch(&mut self) {
        self.tab_switches += 1;
        let count = self.tab_switches;
        let limit = self.settings.max_tab_switches;
        tracing::info!(
            exam_id = self.exam.id,
            student_id = self.learner.id,
            count,
            limit,
            "Tab switch detected"
        );

        if count == limit {
            self.observer.notify(&Notice::TabSwitchWarning { count, limit });
        } else if count > limit {
            if let Err(e) = self.submit(SubmitMode::Integrity).await {
                tracing::warn!(exam_id = self.exam.id, "Integrity submission not delivered: {}", e);
            }
        }
    }

    // -- submission -------------------------------------------------------

    /// Scores the attempt and hands it to the repository.
    ///
    /// On delivery failure a manual submission leaves the session active so the
    /// caller can retry. Automatic submissions end the session locally and keep
    /// the frozen result for [`retry_delivery`](Self::retry_delivery).
    pub async fn submit(&mut self, mode: SubmitMode) -> Result<SubmissionResult, SessionError> {
        self.ensure_active()?;

        let unanswered = self.unanswered_count();
        if mode == (SubmitMode::Manual { confirmed: false }) && unanswered > 0 {
            return Err(SessionError::ConfirmationRequired { unanswered });
        }

        let result = score_attempt(
            &self.exam,
            &self.order,
            &self.selections,
            &self.learner,
            self.clock.now(),
        );

        match self.repository.submit(&result).await {
            Ok(()) => {
                tracing::info!(
                    exam_id = self.exam.id,
                    student_id = self.learner.id,
                    ?mode,
                    percentage = result.percentage,
                    verdict = result.status.as_str(),
                    "Exam submitted"
                );
                self.finish(result.clone(), false);
                match mode {
                    SubmitMode::Deadline => self.observer.notify(&Notice::TimeUp),
                    SubmitMode::Integrity => self.observer.notify(&Notice::IntegrityViolation {
                        count: self.tab_switches,
                    }),
                    SubmitMode::Manual { .. } => {}
                }
                self.observer.notify(&Notice::Submitted {
                    auto: mode.is_auto(),
                });
                Ok(result)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    exam_id = self.exam.id,
                    student_id = self.learner.id,
                    ?mode,
                    "Failed to deliver submission: {}",
                    reason
                );
                self.observer.notify(&Notice::SubmissionFailed {
                    reason: reason.clone(),
                });
                match mode {
                    SubmitMode::Deadline => {
                        self.finish(result, true);
                        self.observer.notify(&Notice::TimeUp);
                    }
                    SubmitMode::Integrity => {
                        self.finish(result, true);
                        self.observer.notify(&Notice::IntegrityViolation {
                            count: self.tab_switches,
                        });
                    }
                    SubmitMode::Manual { .. } => {}
                }
                Err(SessionError::Delivery(reason))
            }
        }
    }

    /// Redelivers a result that was kept after a failed automatic submission.
    pub async fn retry_delivery(&mut self) -> Result<SubmissionResult, SessionError> {
        if self.phase == SessionPhase::Active {
            return self.submit(SubmitMode::Manual { confirmed: true }).await;
        }
        let result = match (&self.result, self.undelivered) {
            (Some(result), true) => result.clone(),
            _ => return Err(SessionError::NothingToRetry),
        };

        self.repository.submit(&result).await.map_err(|e| {
            let reason = e.to_string();
            self.observer.notify(&Notice::SubmissionFailed {
                reason: reason.clone(),
            });
            SessionError::Delivery(reason)
        })?;

        tracing::info!(exam_id = self.exam.id, student_id = self.learner.id, "Queued submission delivered");
        self.undelivered = false;
        self.observer.notify(&Notice::Submitted { auto: true });
        Ok(result)
    }

    /// Ends the session without submitting. Nothing armed by the session fires afterwards.
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Closed;
            tracing::info!(exam_id = self.exam.id, student_id = self.learner.id, "Exam session closed");
        }
        self.teardown();
    }

    pub fn snapshot(&self) -> SessionView {
        let navigator = self
            .order
            .iter()
            .enumerate()
            .map(|(index, &i)| {
                let id = self.exam.questions[i].id;
                NavigatorEntry {
                    index,
                    question_id: id,
                    status: self.statuses.get(&id).copied().unwrap_or(QuestionStatus::Unanswered),
                    selected: self.answer_of(id),
                }
            })
            .collect();

        let remaining = (self.exam.end_time - self.clock.now()).num_seconds().max(0);
        let current_question = self
            .order
            .get(self.cursor)
            .map(|&i| PublicQuestion::from(&self.exam.questions[i]));

        SessionView {
            exam_id: self.exam.id,
            title: self.exam.title.clone(),
            phase: self.phase,
            current_index: self.cursor,
            total_questions: self.order.len(),
            current_question,
            navigator,
            answered: self.selections.len(),
            unanswered: self.unanswered_count(),
            tab_switches: self.tab_switches,
            max_tab_switches: self.settings.max_tab_switches,
            remaining_seconds: if self.phase == SessionPhase::Active { remaining } else { 0 },
            fullscreen: self.exclusive,
            result: self.result.clone(),
            delivery_pending: self.undelivered,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Active => Ok(()),
            SessionPhase::Submitted => Err(SessionError::AlreadySubmitted),
            SessionPhase::Closed => Err(SessionError::Closed),
        }
    }

    fn finish(&mut self, result: SubmissionResult, undelivered: bool) {
        self.phase = SessionPhase::Submitted;
        self.result = Some(result);
        self.undelivered = undelivered;
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.cancel();
        }
        if let Some(visibility) = self.visibility.take() {
            visibility.cancel();
        }
        if self.exclusive {
            self.exclusive = false;
            if let Err(e) = self.surface.release() {
                tracing::warn!(exam_id = self.exam.id, "Failed to release presentation surface: {}", e);
            }
        }
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
