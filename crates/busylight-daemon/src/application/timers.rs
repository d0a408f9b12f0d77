//! Cancellable timers that report back into the event loop.
//!
//! # How timers work here (for beginners)
//!
//! A timer is a small Tokio task that sleeps and then posts a
//! [`ServiceEvent::Timer`] onto the service's channel.  The owner keeps the
//! returned [`TimerHandle`]; dropping or cancelling the handle aborts the
//! task.
//!
//! Aborting is not quite enough on its own: the task may already have posted
//! its event before the abort, and that event is then sitting in the queue.
//! Every handle therefore carries a unique *token*, and the event carries
//! the same token.  When an event arrives the owner compares it with the
//! token of the handle it currently holds and ignores anything stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::application::service::ServiceEvent;

/// What a timer is for.  Routes the firing to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Session keepalive ticker (repeating).
    Keepalive,
    /// Silences a one-shot tone (single).
    ToneMute,
    /// Scheduler program refresh (repeating).
    Repeat,
    /// Scheduler auto-off (single).
    AutoOff,
    /// Directory removal grace period (single).
    Removal,
}

/// Payload of a timer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub device: String,
    pub kind: TimerKind,
    pub token: u64,
}

/// Monotonic source of timer tokens.  Starts at 1 so 0 never matches.
#[derive(Debug)]
struct TokenCounter {
    inner: AtomicU64,
}

impl TokenCounter {
    fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }
}

/// Owned handle to a running timer.  Aborts the timer when dropped.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// `true` if `fired` was produced by this handle.
    pub fn matches(&self, fired: &TimerFired) -> bool {
        self.token == fired.token
    }

    /// Stops the timer.  Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cloneable sender side of the event loop, used to post events and to
/// start timers.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    events: UnboundedSender<ServiceEvent>,
    tokens: Arc<TokenCounter>,
}

impl LoopHandle {
    pub fn new(events: UnboundedSender<ServiceEvent>) -> Self {
        Self {
            events,
            tokens: Arc::new(TokenCounter::new()),
        }
    }

    /// Posts an event.  Returns `false` once the loop has stopped.
    pub fn post(&self, event: ServiceEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Fires once after `delay`.
    pub fn once(&self, device: &str, kind: TimerKind, delay: Duration) -> TimerHandle {
        let token = self.tokens.next();
        let fired = TimerFired {
            device: device.to_string(),
            kind,
            token,
        };
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(ServiceEvent::Timer(fired));
        });
        TimerHandle { token, task }
    }

    /// Fires every `period`, first after one full period.
    ///
    /// A zero period is raised to one millisecond.
    pub fn every(&self, device: &str, kind: TimerKind, period: Duration) -> TimerHandle {
        let period = period.max(Duration::from_millis(1));
        let token = self.tokens.next();
        let fired = TimerFired {
            device: device.to_string(),
            kind,
            token,
        };
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(ServiceEvent::Timer(fired.clone())).is_err() {
                    break;
                }
            }
        });
        TimerHandle { token, task }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
