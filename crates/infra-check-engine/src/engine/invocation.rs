//! Per-invocation state machine
//!
//! `Pending → Dispatched → {Succeeded, Failed, TimedOut} → Classified`, with
//! `Failed`/`TimedOut` looping back to `Dispatched` on retry.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
    TimedOut,
    Classified,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Pending => "pending",
            InvocationState::Dispatched => "dispatched",
            InvocationState::Succeeded => "succeeded",
            InvocationState::Failed => "failed",
            InvocationState::TimedOut => "timed_out",
            InvocationState::Classified => "classified",
        }
    }

    pub fn can_transition(&self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Pending, Classified)
                | (Dispatched, Succeeded)
                | (Dispatched, Failed)
                | (Dispatched, TimedOut)
                | (Failed, Dispatched)
                | (TimedOut, Dispatched)
                | (Succeeded, Classified)
                | (Failed, Classified)
                | (TimedOut, Classified)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == InvocationState::Classified
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one (subject, check) invocation
#[derive(Debug)]
pub struct Invocation<'a> {
    check_id: &'a str,
    host: &'a str,
    state: InvocationState,
    attempts: u32,
}

impl<'a> Invocation<'a> {
    pub fn new(check_id: &'a str, host: &'a str) -> Self {
        Self {
            check_id,
            host,
            state: InvocationState::Pending,
            attempts: 0,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Channel invocations dispatched so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn advance(&mut self, next: InvocationState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        if next == InvocationState::Dispatched {
            self.attempts += 1;
        }
        tracing::debug!(
            check_id = self.check_id,
            host = self.host,
            from = %self.state,
            to = %next,
            attempt = self.attempts,
            "invocation transition"
        );
        self.state = next;
    }
}
