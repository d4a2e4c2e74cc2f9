// src/session/surface.rs

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{SessionEvent, subscription::Subscription};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("exclusive occupancy is not held")]
    NotHeld,
}

/// Feeds client reports (visibility and fullscreen) into one session's event queue.
#[derive(Debug, Clone)]
pub struct VisibilitySink {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl VisibilitySink {
    pub(crate) fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    /// Returns `false` once the receiving session is gone.
    pub fn report(&self, hidden: bool) -> bool {
        self.events
            .send(SessionEvent::VisibilityChanged { hidden })
            .is_ok()
    }

    pub fn report_fullscreen(&self, granted: bool) -> bool {
        self.events
            .send(SessionEvent::FullscreenChanged { granted })
            .is_ok()
    }
}

/// The screen a session occupies while it runs.
pub trait PresentationSurface: Send + Sync {
    /// Asks for exclusive (fullscreen) occupancy. Denial is not an error.
    fn request_exclusive(&mut self) -> bool;

    fn release(&mut self) -> Result<(), SurfaceError>;

    /// Starts forwarding visibility and fullscreen changes to `sink` until the
    /// handle is cancelled.
    fn watch_visibility(&mut self, sink: VisibilitySink) -> Subscription;
}

#[derive(Debug, Default)]
struct ClientSlot {
    exclusive: bool,
    sink: Option<VisibilitySink>,
    generation: u64,
}

/// Surface living in the learner's browser. Fullscreen is assumed granted when
/// the session starts. The browser reports fullscreen and visibility changes
/// over HTTP through a [`ClientSurfaceHandle`].
#[derive(Debug, Default)]
pub struct ClientSurface {
    slot: Arc<Mutex<ClientSlot>>,
}

/// Shared side of a [`ClientSurface`], held by whoever receives client reports.
#[derive(Debug, Clone)]
pub struct ClientSurfaceHandle {
    slot: Arc<Mutex<ClientSlot>>,
}

impl ClientSurface {
    pub fn new() -> (Self, ClientSurfaceHandle) {
        let slot = Arc::new(Mutex::new(ClientSlot::default()));
        (
            Self { slot: slot.clone() },
            ClientSurfaceHandle { slot },
        )
    }
}

impl PresentationSurface for ClientSurface {
    fn request_exclusive(&mut self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).exclusive = true;
        true
    }

    fn release(&mut self) -> Result<(), SurfaceError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !slot.exclusive {
            return Err(SurfaceError::NotHeld);
        }
        slot.exclusive = false;
        Ok(())
    }

    fn watch_visibility(&mut self, sink: VisibilitySink) -> Subscription {
        let generation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.generation += 1;
            slot.sink = Some(sink);
            slot.generation
        };
        let weak = Arc::downgrade(&self.slot);
        Subscription::new(move || {
            if let Some(slot) = weak.upgrade() {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.generation == generation {
                    slot.sink = None;
                }
            }
        })
    }
}

impl ClientSurfaceHandle {
    fn sink(&self) -> Option<VisibilitySink> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
            .clone()
    }

    /// Forwards a visibility report. Returns `false` when nobody is listening anymore.
    pub fn report_visibility(&self, hidden: bool) -> bool {
        self.sink().is_some_and(|sink| sink.report(hidden))
    }

    /// Records whether the browser currently holds fullscreen and forwards it.
    /// Returns `false` when nobody is listening anymore.
    pub fn report_fullscreen(&self, granted: bool) -> bool {
        let sink = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.sink.is_none() {
                return false;
            }
            slot.exclusive = granted;
            slot.sink.clone()
        };
        sink.is_some_and(|sink| sink.report_fullscreen(granted))
    }
}
