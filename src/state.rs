// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    repository::Repositories,
    services::question_generator::QuestionGenerator,
    session::{Clock, SessionRegistry, SessionSettings},
};

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub config: Config,
    pub sessions: SessionRegistry,
    pub clock: Arc<dyn Clock>,

    /// Present when a model endpoint is configured.
    pub generator: Option<QuestionGenerator>,
}

impl AppState {
    pub fn new(repos: Repositories, config: Config, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionRegistry::new(
            clock.clone(),
            repos.exams.clone(),
            SessionSettings {
                max_tab_switches: config.max_tab_switches,
            },
        );
        let generator = QuestionGenerator::from_config(&config);
        Self {
            repos,
            config,
            sessions,
            clock,
            generator,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Repositories {
    fn from_ref(state: &AppState) -> Self {
        state.repos.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
