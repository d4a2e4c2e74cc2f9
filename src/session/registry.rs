// src/session/registry.rs

//! Live sessions behind the HTTP layer.
//!
//! Every session runs on its own task and owns its [`ExamSession`] outright.
//! Requests reach it as [`SessionCommand`]s over a channel and get a rendered
//! view back, so commands and timer/visibility events for one session are
//! always applied one at a time.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

use super::{
    Learner, Notice, SessionError, SessionObserver, SessionSettings,
    clock::Clock,
    engine::{Collaborators, ExamSession, SessionPhase, SessionView, SubmitMode},
    surface::{ClientSurface, ClientSurfaceHandle},
};
use crate::{
    config::{DELIVERY_RETRY_LIMIT, SESSION_LINGER_SECONDS},
    models::exam::ExamDefinition,
    repository::ExamRepository,
};

const INBOX_CAPACITY: usize = 32;

/// A learner action routed to a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    View,
    GoTo(usize),
    Next,
    Previous,
    Answer { question_id: i64, option: usize },
    ToggleFlag { question_id: i64 },
    Submit { confirmed: bool },
    RetryDelivery,
    Close,
}

/// Browser state reported by the learner's client. Absent fields are unchanged.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ClientReport {
    pub hidden: Option<bool>,
    pub fullscreen: Option<bool>,
}

impl ClientReport {
    pub fn is_empty(&self) -> bool {
        self.hidden.is_none() && self.fullscreen.is_none()
    }
}

/// A notice as shown to the learner.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredNotice {
    #[serde(flatten)]
    pub notice: Notice,
    pub message: String,
}

/// What a session command answers with.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub view: SessionView,

    /// Notices raised since the previous successful reply.
    pub notices: Vec<DeliveredNotice>,
}

/// Collects notices until the next reply picks them up.
#[derive(Clone, Default)]
struct NoticeFeed {
    pending: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeFeed {
    fn drain(&self) -> Vec<DeliveredNotice> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .map(|notice| DeliveredNotice {
                message: notice.message(),
                notice,
            })
            .collect()
    }
}

impl SessionObserver for NoticeFeed {
    fn notify(&self, notice: &Notice) {
        tracing::debug!(?notice, "Session notice");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
    }
}

struct Envelope {
    command: SessionCommand,
    reply: oneshot::Sender<Result<SessionState, SessionError>>,
}

#[derive(Clone)]
struct SessionHandle {
    exam_id: i64,
    student_id: i64,
    inbox: mpsc::Sender<Envelope>,
    surface: ClientSurfaceHandle,
}

type SessionMap = Arc<RwLock<HashMap<Uuid, SessionHandle>>>;

/// Shared table of running sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: SessionMap,
    clock: Arc<dyn Clock>,
    repository: Arc<dyn ExamRepository>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>, repository: Arc<dyn ExamRepository>, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            repository,
            settings,
        }
    }

    /// Opens a session for `learner`, or returns the one they already have running
    /// for this exam.
    pub async fn open(&self, exam: ExamDefinition, learner: Learner) -> Result<SessionState, SessionError> {
        if let Some(id) = self.live_session_of(exam.id, learner.id).await {
            match self.dispatch(id, learner.id, SessionCommand::View).await {
                Err(SessionError::NotFound | SessionError::Unavailable) => {}
                resumed => {
                    tracing::info!(exam_id = exam.id, student_id = learner.id, %id, "Resuming exam session");
                    return resumed;
                }
            }
        }

        if !exam.is_open_at(self.clock.now()) {
            return Err(SessionError::OutsideWindow);
        }

        let exam_id = exam.id;
        let student_id = learner.id;
        let feed = NoticeFeed::default();
        let (surface, surface_handle) = ClientSurface::new();
        let session = ExamSession::start(
            exam,
            learner,
            self.settings,
            Collaborators {
                clock: self.clock.clone(),
                surface: Box::new(surface),
                repository: self.repository.clone(),
                observer: Box::new(feed.clone()),
            },
        )
        .await?;

        let id = Uuid::new_v4();
        let state = render(id, &session, &feed);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        self.sessions.write().await.insert(
            id,
            SessionHandle {
                exam_id,
                student_id,
                inbox: inbox_tx,
                surface: surface_handle,
            },
        );
        tokio::spawn(run_session(id, session, feed, inbox_rx, self.sessions.clone()));

        Ok(state)
    }

    /// Applies `command` to a session owned by `student_id`.
    pub async fn dispatch(
        &self,
        id: Uuid,
        student_id: i64,
        command: SessionCommand,
    ) -> Result<SessionState, SessionError> {
        let handle = self.handle(id, student_id).await?;

        let (reply, response) = oneshot::channel();
        handle
            .inbox
            .send(Envelope { command, reply })
            .await
            .map_err(|_| SessionError::NotFound)?;
        let state = response.await.map_err(|_| SessionError::Unavailable)?;

        if command == SessionCommand::Close {
            self.sessions.write().await.remove(&id);
        }
        state
    }

    /// Forwards what the learner's browser observed and returns the resulting view.
    pub async fn report(
        &self,
        id: Uuid,
        student_id: i64,
        report: ClientReport,
    ) -> Result<SessionState, SessionError> {
        let handle = self.handle(id, student_id).await?;
        let mut delivered = true;
        if let Some(granted) = report.fullscreen {
            delivered &= handle.surface.report_fullscreen(granted);
        }
        if let Some(hidden) = report.hidden {
            delivered &= handle.surface.report_visibility(hidden);
        }
        if !delivered {
            tracing::debug!(%id, "Client report for a session that stopped listening");
        }
        self.dispatch(id, student_id, SessionCommand::View).await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, id: Uuid, student_id: i64) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|h| h.student_id == student_id)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    async fn live_session_of(&self, exam_id: i64, student_id: i64) -> Option<Uuid> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|(_, h)| h.exam_id == exam_id && h.student_id == student_id && !h.inbox.is_closed())
            .map(|(id, _)| *id)
    }
}

fn render(id: Uuid, session: &ExamSession, feed: &NoticeFeed) -> SessionState {
    SessionState {
        session_id: id,
        view: session.snapshot(),
        notices: feed.drain(),
    }
}

async fn apply(session: &mut ExamSession, command: SessionCommand) -> Result<(), SessionError> {
    session.pump().await;
    match command {
        SessionCommand::View => {}
        SessionCommand::GoTo(index) => {
            session.go_to(index);
        }
        SessionCommand::Next => {
            session.next();
        }
        SessionCommand::Previous => {
            session.previous();
        }
        SessionCommand::Answer { question_id, option } => session.answer(question_id, option)?,
        SessionCommand::ToggleFlag { question_id } => {
            session.toggle_flag(question_id)?;
        }
        SessionCommand::Submit { confirmed } => {
            session.submit(SubmitMode::Manual { confirmed }).await?;
        }
        SessionCommand::RetryDelivery => {
            session.retry_delivery().await?;
        }
        SessionCommand::Close => session.close(),
    }
    Ok(())
}

/// Owns one session until it is closed or has sat finished for the linger period.
///
/// A finished session whose result is still queued retries delivery once per
/// linger period, up to [`DELIVERY_RETRY_LIMIT`] times, before it is dropped.
async fn run_session(
    id: Uuid,
    mut session: ExamSession,
    feed: NoticeFeed,
    mut inbox: mpsc::Receiver<Envelope>,
    sessions: SessionMap,
) {
    let linger = Duration::from_secs(SESSION_LINGER_SECONDS);
    let mut retries = 0;

    loop {
        let finished = session.phase() != SessionPhase::Active;

        tokio::select! {
            biased;

            Some(event) = session.next_event() => session.handle_event(event).await,

            envelope = inbox.recv() => {
                let Some(Envelope { command, reply }) = envelope else {
                    break;
                };
                let outcome = apply(&mut session, command)
                    .await
                    .map(|()| render(id, &session, &feed));
                let _ = reply.send(outcome);
                if command == SessionCommand::Close {
                    break;
                }
            }

            _ = tokio::time::sleep(linger), if finished => {
                if session.delivery_pending() && retries < DELIVERY_RETRY_LIMIT {
                    retries += 1;
                    match session.retry_delivery().await {
                        Ok(_) => tracing::info!(%id, "Queued submission delivered in background"),
                        Err(e) => {
                            tracing::warn!(%id, attempt = retries, "Background redelivery failed: {}", e);
                            continue;
                        }
                    }
                }
                if session.delivery_pending() {
                    tracing::error!(
                        %id,
                        exam_id = session.exam().id,
                        student_id = session.learner().id,
                        "Dropping session with an undelivered submission"
                    );
                }
                tracing::debug!(%id, "Dropping finished exam session");
                break;
            }
        }
    }

    inbox.close();
    drop(session);
    sessions.write().await.remove(&id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::submission::Verdict,
        repository::{ExamCatalog, memory::MemoryStore},
        session::{clock::ManualClock, scoring::tests::exam_with},
    };

    struct Fixture {
        clock: ManualClock,
        store: Arc<MemoryStore>,
        registry: SessionRegistry,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(chrono::Utc::now());
        let store = Arc::new(MemoryStore::default());
        let registry = SessionRegistry::new(
            Arc::new(clock.clone()),
            store.clone(),
            SessionSettings { max_tab_switches: 2 },
        );
        Fixture { clock, store, registry }
    }

    fn hidden(hidden: bool) -> ClientReport {
        ClientReport {
            hidden: Some(hidden),
            fullscreen: None,
        }
    }

    fn asha() -> Learner {
        Learner {
            id: 42,
            name: "Asha".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reopening_resumes_the_live_session() {
        let f = fixture();
        let first = f.registry.open(exam_with(3, 50), asha()).await.unwrap();
        let order: Vec<i64> = first.view.navigator.iter().map(|n| n.question_id).collect();
        f.registry
            .dispatch(
                first.session_id,
                42,
                SessionCommand::Answer { question_id: order[0], option: 2 },
            )
            .await
            .unwrap();

        let second = f.registry.open(exam_with(3, 50), asha()).await.unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.view.answered, 1);
        assert_eq!(f.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_open_outside_window_is_rejected() {
        let f = fixture();
        let mut exam = exam_with(3, 50);
        exam.start_time = f.clock.now() + chrono::Duration::hours(1);
        exam.end_time = exam.start_time + chrono::Duration::hours(1);

        let err = f.registry.open(exam, asha()).await.unwrap_err();
        assert_eq!(err, SessionError::OutsideWindow);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_sessions_are_private_to_their_owner() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();
        let err = f
            .registry
            .dispatch(state.session_id, 7, SessionCommand::View)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotFound);
    }

    #[tokio::test]
    async fn test_submit_through_registry_delivers_once() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();
        let id = state.session_id;

        let err = f
            .registry
            .dispatch(id, 42, SessionCommand::Submit { confirmed: false })
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::ConfirmationRequired { unanswered: 2 });

        let done = f
            .registry
            .dispatch(id, 42, SessionCommand::Submit { confirmed: true })
            .await
            .unwrap();
        assert_eq!(done.view.phase, SessionPhase::Submitted);
        assert_eq!(done.view.result.as_ref().map(|r| r.status), Some(Verdict::Fail));
        assert!(
            done.notices
                .iter()
                .any(|n| n.notice == Notice::Submitted { auto: false })
        );

        let again = f
            .registry
            .dispatch(id, 42, SessionCommand::Submit { confirmed: true })
            .await
            .unwrap_err();
        assert_eq!(again, SessionError::AlreadySubmitted);
        assert_eq!(f.store.results_for_exam(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hidden_reports_beyond_limit_force_submission() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();
        let id = state.session_id;

        let first = f.registry.report(id, 42, hidden(true)).await.unwrap();
        assert_eq!(first.view.tab_switches, 1);
        f.registry.report(id, 42, hidden(false)).await.unwrap();

        let second = f.registry.report(id, 42, hidden(true)).await.unwrap();
        assert!(second.notices.iter().any(|n| matches!(
            n.notice,
            Notice::TabSwitchWarning { count: 2, limit: 2 }
        )));

        let third = f.registry.report(id, 42, hidden(true)).await.unwrap();
        assert_eq!(third.view.phase, SessionPhase::Submitted);
        assert!(
            third
                .notices
                .iter()
                .any(|n| n.notice == Notice::Submitted { auto: true })
        );
        assert!(f.store.has_submitted(7, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_deadline_submits_without_a_request() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();

        f.clock.advance(chrono::Duration::hours(2));
        let view = f
            .registry
            .dispatch(state.session_id, 42, SessionCommand::View)
            .await
            .unwrap();
        assert_eq!(view.view.phase, SessionPhase::Submitted);
        assert!(view.notices.iter().any(|n| n.notice == Notice::TimeUp));
    }

    #[tokio::test]
    async fn test_close_forgets_the_session() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();

        let closed = f
            .registry
            .dispatch(state.session_id, 42, SessionCommand::Close)
            .await
            .unwrap();
        assert_eq!(closed.view.phase, SessionPhase::Closed);
        assert!(f.registry.is_empty().await);
        assert!(!f.store.has_submitted(7, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_fullscreen_refusal_is_reported_back() {
        let f = fixture();
        let state = f.registry.open(exam_with(2, 50), asha()).await.unwrap();
        assert!(state.view.fullscreen);

        let refused = f
            .registry
            .report(
                state.session_id,
                42,
                ClientReport {
                    hidden: None,
                    fullscreen: Some(false),
                },
            )
            .await
            .unwrap();
        assert!(!refused.view.fullscreen);
        assert_eq!(refused.view.phase, SessionPhase::Active);
        assert!(
            refused
                .notices
                .iter()
                .any(|n| n.notice == Notice::FullscreenDenied)
        );
    }
}
