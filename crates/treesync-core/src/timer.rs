//! Tickets and the cancellable debounce timer
//!
//! Every fetch and every armed debounce carries a ticket. A result or a
//! firing whose ticket is no longer the outstanding one is ignored, so a
//! timer that escapes cancellation can never act on a stale premise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Identifies one issued fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchTicket(pub u64);

/// Identifies one armed debounce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerTicket(pub u64);

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch-{}", self.0)
    }
}

impl fmt::Display for TimerTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// One-slot debounce timer backed by a tokio task.
///
/// Arming replaces (and aborts) whatever was armed before. Dropping the timer
/// aborts the pending task.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    armed: Option<(TimerTicket, AbortHandle)>,
}

impl DebounceTimer {
    /// Create disarmed timer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, unless cancelled first
    pub fn arm<F>(&mut self, ticket: TimerTicket, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel_any();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        tracing::trace!(%ticket, ?delay, "debounce armed");
        self.armed = Some((ticket, task.abort_handle()));
    }

    /// Cancel if `ticket` is the armed one; returns whether it was
    pub fn cancel(&mut self, ticket: TimerTicket) -> bool {
        match &self.armed {
            Some((armed, _)) if *armed == ticket => {
                self.cancel_any();
                true
            }
            _ => false,
        }
    }

    /// Cancel whatever is armed
    pub fn cancel_any(&mut self) {
        if let Some((ticket, handle)) = self.armed.take() {
            handle.abort();
            tracing::trace!(%ticket, "debounce cancelled");
        }
    }

    /// Forget `ticket` after it fired
    pub fn fired(&mut self, ticket: TimerTicket) {
        if self.armed.as_ref().is_some_and(|(armed, _)| *armed == ticket) {
            self.armed = None;
        }
    }

    #[inline]
    #[must_use]
    pub fn armed(&self) -> Option<TimerTicket> {
        self.armed.as_ref().map(|(ticket, _)| *ticket)
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel_any();
    }
}
