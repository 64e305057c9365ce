//! Steps and the outcome markers they return.
//!
//! A step is one unit of business logic. It reads the [`Context`] and answers
//! with exactly one [`Outcome`]. Errors raised by the body travel separately as
//! [`StepError`] and are never mistaken for business failures.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{StepError, StoryError};
use crate::failures::Reason;
use crate::mounted::Mounted;
use crate::story::{Storied, Story};

/// Result returned by every step body.
pub type StepResult = Result<Outcome, StepError>;

/// Execution mode of a story: plain functions or coroutines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Blocking function steps.
    Function,
    /// Async coroutine steps.
    Coroutine,
}

// ============================================================================
// Outcome
// ============================================================================

/// The five outcome markers a step may produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value")]
pub enum Outcome {
    /// Continue, adding zero or more names to the context.
    Success(IndexMap<String, Value>),
    /// Stop the whole story with an optional reason.
    Failure(Option<Reason>),
    /// Stop the whole story and return the value.
    Result(Value),
    /// Skip the rest of the immediately enclosing substory.
    Skip,
    /// Coroutine stories only: like `Skip`, but a value given at the top level
    /// becomes the story result.
    Next(Option<Value>),
}

impl Outcome {
    /// Success without new names.
    pub fn success() -> Self {
        Self::Success(IndexMap::new())
    }

    /// Success adding every given name.
    pub fn assign<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Success(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Add one more name to a success; other outcomes are returned unchanged.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Success(kwargs) = &mut self {
            kwargs.insert(name.into(), value.into());
        }
        self
    }

    /// Failure without reason.
    pub fn failure() -> Self {
        Self::Failure(None)
    }

    /// Failure with a reason from the story's protocol.
    pub fn fail(reason: impl Into<Reason>) -> Self {
        Self::Failure(Some(reason.into()))
    }

    /// Final result of the story.
    pub fn result(value: impl Into<Value>) -> Self {
        Self::Result(value.into())
    }

    /// Skip the rest of the enclosing substory.
    pub fn skip() -> Self {
        Self::Skip
    }

    /// Leave the enclosing substory early.
    pub fn next() -> Self {
        Self::Next(None)
    }

    /// Leave the enclosing substory early, carrying a value.
    pub fn next_with(value: impl Into<Value>) -> Self {
        Self::Next(Some(value.into()))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(kwargs) => {
                let rendered: Vec<String> = kwargs
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                write!(f, "Success({})", rendered.join(", "))
            }
            Self::Failure(None) => f.write_str("Failure()"),
            Self::Failure(Some(reason)) => write!(f, "Failure({reason})"),
            Self::Result(value) => write!(f, "Result({value})"),
            Self::Skip => f.write_str("Skip()"),
            Self::Next(None) => f.write_str("Next()"),
            Self::Next(Some(value)) => write!(f, "Next({value})"),
        }
    }
}

// ============================================================================
// Step
// ============================================================================

/// An async step body.
///
/// The `storied!` macro implements this for every method listed under
/// `coroutines`; implement it by hand for steps that own their state.
#[async_trait::async_trait]
pub trait Coroutine: Send + Sync + 'static {
    /// Run the step against the current context.
    async fn call(&self, ctx: &Context) -> StepResult;
}

type Function = dyn Fn(&Context) -> StepResult + Send + Sync;

#[derive(Clone)]
enum Body {
    Function(Arc<Function>),
    Coroutine(Arc<dyn Coroutine>),
}

/// A leaf step resolved on its owner.
#[derive(Clone)]
pub struct Step {
    name: String,
    owner: String,
    body: Body,
}

impl Step {
    /// Step name as collected by the story.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class name of the owner the step was resolved on.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// `Owner.name`, used in diagnostics.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Mode of the step body.
    pub fn mode(&self) -> Mode {
        match self.body {
            Body::Function(_) => Mode::Function,
            Body::Coroutine(_) => Mode::Coroutine,
        }
    }

    /// Run a function body on the current thread; coroutines yield `None`.
    pub(crate) fn call_blocking(&self, ctx: &Context) -> Option<StepResult> {
        match &self.body {
            Body::Function(f) => Some((**f)(ctx)),
            Body::Coroutine(_) => None,
        }
    }

    pub(crate) fn bind(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    /// Run the body, awaiting coroutines.
    pub(crate) async fn invoke(&self, ctx: &Context) -> StepResult {
        match &self.body {
            Body::Function(f) => (**f)(ctx),
            Body::Coroutine(c) => c.call(ctx).await,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("mode", &self.mode())
            .finish()
    }
}

// ============================================================================
// Member
// ============================================================================

/// What a collected step name resolves to on its owner.
pub enum Member {
    /// A leaf step.
    Step(Step),
    /// A story declared on an owner, compiled and inlined as a substory.
    Story {
        /// The story definition, or the error raised while building it.
        story: Result<Story, StoryError>,
        /// Object the story's own steps resolve against.
        owner: Arc<dyn Storied>,
    },
    /// An already mounted story, usually injected into the owner.
    Mounted(Mounted),
}

impl Member {
    /// A blocking function step.
    pub fn step<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context) -> StepResult + Send + Sync + 'static,
    {
        Self::Step(Step {
            name: name.into(),
            owner: String::new(),
            body: Body::Function(Arc::new(f)),
        })
    }

    /// An async coroutine step.
    pub fn coroutine(name: impl Into<String>, coroutine: impl Coroutine) -> Self {
        Self::Step(Step {
            name: name.into(),
            owner: String::new(),
            body: Body::Coroutine(Arc::new(coroutine)),
        })
    }

    /// A substory resolved against `owner`.
    pub fn story<T: Storied>(story: impl IntoStory, owner: Arc<T>) -> Self {
        Self::Story {
            story: story.into_story(),
            owner,
        }
    }

    /// An injected, already mounted story.
    pub fn mounted(mounted: Mounted) -> Self {
        Self::Mounted(mounted)
    }
}

/// Anything usable as a story definition in [`Member::story`].
pub trait IntoStory {
    /// Convert into the definition, or the error raised while building it.
    fn into_story(self) -> Result<Story, StoryError>;
}

impl IntoStory for Story {
    fn into_story(self) -> Result<Story, StoryError> {
        Ok(self)
    }
}

impl IntoStory for Result<Story, StoryError> {
    fn into_story(self) -> Result<Story, StoryError> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::success().to_string(), "Success()");
        assert_eq!(
            Outcome::assign([("baz", 4)]).set("quiz", "a").to_string(),
            "Success(baz=4, quiz=\"a\")"
        );
        assert_eq!(Outcome::failure().to_string(), "Failure()");
        assert_eq!(Outcome::fail("foo").to_string(), "Failure(\"foo\")");
        assert_eq!(Outcome::result(-1).to_string(), "Result(-1)");
        assert_eq!(Outcome::skip().to_string(), "Skip()");
        assert_eq!(Outcome::next_with(5).to_string(), "Next(5)");
    }

    #[test]
    fn outcome_serializes_tagged() {
        let value = serde_json::to_value(Outcome::assign([("a", 1)])).expect("serializable");
        assert_eq!(value, json!({"outcome": "Success", "value": {"a": 1}}));

        let value = serde_json::to_value(Outcome::skip()).expect("serializable");
        assert_eq!(value, json!({"outcome": "Skip"}));
    }

    #[test]
    fn set_ignores_non_success() {
        assert_eq!(Outcome::skip().set("a", 1), Outcome::Skip);
    }

    #[test]
    fn mode_display() {
        assert_eq!(Mode::Function.to_string(), "function");
        assert_eq!(Mode::Coroutine.to_string(), "coroutine");
    }

    #[test]
    fn step_mode_follows_body() {
        let Member::Step(step) = Member::step("one", |_| Ok(Outcome::success())) else {
            panic!("expected step");
        };
        assert_eq!(step.mode(), Mode::Function);
        assert_eq!(step.bind("Simple").qualified(), "Simple.one");
    }
}
