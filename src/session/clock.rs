// src/session/clock.rs

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};

use super::subscription::Subscription;

/// Time source and one-shot timer facility used by sessions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Runs `on_fire` once after `delay` unless the returned handle is cancelled first.
    fn after(&self, delay: Duration, on_fire: Box<dyn FnOnce() + Send>) -> Subscription;
}

/// Wall clock backed by the tokio timer. Must be used inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, on_fire: Box<dyn FnOnce() + Send>) -> Subscription {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Subscription::new(move || task.abort())
    }
}

struct PendingTimer {
    id: u64,
    due: DateTime<Utc>,
    on_fire: Box<dyn FnOnce() + Send>,
}

struct ManualState {
    now: DateTime<Utc>,
    next_id: u64,
    timers: Vec<PendingTimer>,
}

/// Clock that only moves when told to. Timers fire synchronously inside `advance`.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                next_id: 0,
                timers: Vec::new(),
            })),
        }
    }

    /// Moves time forward and fires every timer that became due, earliest first.
    pub fn advance(&self, by: chrono::Duration) {
        let due = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.now += by;
            let now = state.now;
            let (mut due, pending): (Vec<_>, Vec<_>) =
                state.timers.drain(..).partition(|t| t.due <= now);
            state.timers = pending;
            due.sort_by_key(|t| (t.due, t.id));
            due
        };
        for timer in due {
            (timer.on_fire)();
        }
    }

    /// Number of armed, not yet fired or cancelled timers.
    pub fn pending_timers(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timers
            .len()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn after(&self, delay: Duration, on_fire: Box<dyn FnOnce() + Send>) -> Subscription {
        let id = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let id = state.next_id;
            state.next_id += 1;
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            let due = state.now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.timers.push(PendingTimer { id, due, on_fire });
            id
        };

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .timers
                    .retain(|t| t.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_manual_timer_fires_when_due() {
        let clock = ManualClock::new(Utc::now());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _timer = clock.after(
            Duration::from_secs(60),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        clock.advance(chrono::Duration::seconds(59));
        assert!(!fired.load(Ordering::SeqCst));

        clock.advance(chrono::Duration::seconds(1));
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let clock = ManualClock::new(Utc::now());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = clock.after(
            Duration::from_secs(5),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        timer.cancel();
        assert_eq!(clock.pending_timers(), 0);

        clock.advance(chrono::Duration::minutes(10));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_system_clock_abort() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = SystemClock.after(
            Duration::from_millis(20),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
