//! Deadlines and cancellation for blocking network calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::Interrupted;

/// Shared flag that asks in-flight work to stop at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-supplied limits threaded through authentication, search and download.
///
/// The default has no deadline and a fresh (never cancelled) token, so every
/// request is bounded only by the client's per-request timeout.
#[derive(Debug, Clone, Default)]
pub struct CallControl {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl CallControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn with_time_limit(self, limit: Duration) -> Self {
        self.with_deadline(Instant::now() + limit)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Timeout for the next request: `per_request` clipped to what is left of the deadline.
    pub fn request_timeout(&self, per_request: Duration) -> Result<Duration, Interrupted> {
        self.check()?;
        match self.deadline {
            Some(d) => {
                let left = d.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(Interrupted::DeadlineExceeded)
                } else {
                    Ok(left.min(per_request))
                }
            }
            None => Ok(per_request),
        }
    }
}
