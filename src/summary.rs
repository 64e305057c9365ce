//! Structured result of running a story in summary mode.

use std::fmt;

use serde_json::Value;

use crate::context::Context;
use crate::error::StoryError;
use crate::failures::{Reason, RunProtocol};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Success(Value),
    Failure { step: String, reason: Option<Reason> },
}

/// Outcome of [`Mounted::run`](crate::Mounted::run).
///
/// Business failures are reported here instead of raised.
#[derive(Debug, Clone)]
pub struct Summary {
    protocol: RunProtocol,
    ctx: Context,
    state: State,
}

impl Summary {
    pub(crate) fn success(protocol: RunProtocol, ctx: Context, value: Value) -> Self {
        Self {
            protocol,
            ctx,
            state: State::Success(value),
        }
    }

    pub(crate) fn failure(
        protocol: RunProtocol,
        ctx: Context,
        step: String,
        reason: Option<Reason>,
    ) -> Self {
        Self {
            protocol,
            ctx,
            state: State::Failure { step, reason },
        }
    }

    /// Whether the story finished without failure.
    pub fn is_success(&self) -> bool {
        matches!(self.state, State::Success(_))
    }

    /// Whether a step reported a failure.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Story result; an error on failure summaries.
    pub fn value(&self) -> Result<&Value, StoryError> {
        match &self.state {
            State::Success(value) => Ok(value),
            State::Failure { step, .. } => Err(StoryError::Summary { step: step.clone() }),
        }
    }

    /// Whether the story failed on the step with this name.
    pub fn failed_on(&self, step: &str) -> bool {
        matches!(&self.state, State::Failure { step: failed, .. } if failed == step)
    }

    /// Whether the story failed with this reason.
    ///
    /// The reason has to belong to the story's failure protocol, even on success.
    pub fn failed_because(&self, reason: impl Into<Reason>) -> Result<bool, StoryError> {
        let reason = reason.into();
        self.protocol.check_argument(&reason)?;
        Ok(match &self.state {
            State::Success(_) => false,
            State::Failure { reason: actual, .. } => self.protocol.compare(&reason, actual.as_ref()),
        })
    }

    /// Reason the story failed with, if any.
    pub fn reason(&self) -> Option<&Reason> {
        match &self.state {
            State::Failure { reason, .. } => reason.as_ref(),
            State::Success(_) => None,
        }
    }

    /// Context at the moment the story stopped.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            State::Success(_) => f.write_str("Success()"),
            State::Failure { .. } => f.write_str("Failure()"),
        }
    }
}
