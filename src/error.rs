//! Error taxonomy for story definition, contracts, failure protocols and step bodies.
//!
//! Definition errors are raised while a story is built or compiled. Contract and
//! failure protocol errors are raised while a story runs. A business failure is an
//! error only in call mode; run mode reports it through a [`Summary`](crate::Summary).
//! Errors raised by step bodies are carried unchanged inside [`StepError`].

use std::fmt;

use crate::failures::Reason;
use crate::step::Mode;

/// Boxed error raised by a step body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shorten a Rust type name to its last path segments (`alloc::vec::Vec<i64>` -> `Vec<i64>`).
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut result = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            result.push_str(segment.rsplit("::").next().unwrap_or_default());
            segment.clear();
            result.push(ch);
        }
    }
    result.push_str(segment.rsplit("::").next().unwrap_or_default());
    result
}

// ============================================================================
// Definition Errors
// ============================================================================

/// A story was declared or composed incorrectly.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The story collected no steps.
    #[error("Story should have at least one step defined\n\nStory method: {story}")]
    EmptyStory {
        /// Qualified story name.
        story: String,
    },

    /// A fan-out group collected no steps.
    #[error("Parallel group should have at least one step defined\n\nStory method: {story}")]
    EmptyParallel {
        /// Qualified story name.
        story: String,
    },

    /// The same step name was collected twice.
    #[error("Step is collected more than once: {step}\n\nStory method: {story}")]
    DuplicateStep {
        /// Qualified story name.
        story: String,
        /// Repeated step name.
        step: String,
    },

    /// A story uses itself as a step, directly or through its substories.
    #[error("Story can not be used as its own step: {step}\n\nStory method: {story}")]
    RecursiveStory {
        /// Qualified story name.
        story: String,
        /// Step name that leads back to the story.
        step: String,
    },

    /// An argument list was declared empty.
    #[error("Story arguments can not be an empty list\n\nStory method: {story}")]
    EmptyArguments {
        /// Qualified story name.
        story: String,
    },

    /// An argument name is not a usable identifier.
    #[error("Story argument is not a valid name: {argument:?}\n\nStory method: {story}")]
    InvalidArgument {
        /// Qualified story name.
        story: String,
        /// Offending argument.
        argument: String,
    },

    /// The same argument name was declared twice.
    #[error("Story argument is declared more than once: {argument}\n\nStory method: {story}")]
    DuplicateArgument {
        /// Qualified story name.
        story: String,
        /// Repeated argument.
        argument: String,
    },

    /// A collected step name does not resolve on the owning object.
    #[error("Step is not defined on the story owner: {step}\n\nStory method: {story}")]
    UnknownStep {
        /// Qualified story name.
        story: String,
        /// Unresolved step name.
        step: String,
    },

    /// Function and coroutine steps were mixed in one story.
    #[error(
        "Coroutines and functions can not be used together in story definition.\n\n\
         This method should be a {expected}: {step}\n\nStory method: {story}"
    )]
    MixedSteps {
        /// Qualified story name.
        story: String,
        /// Qualified step name.
        step: String,
        /// Mode the step should have had.
        expected: Mode,
    },

    /// A function story and a coroutine story were composed.
    #[error(
        "Coroutine and function stories can not be injected into each other.\n\n\
         Story {kind} method: {story}\n\nSubstory {other_kind} method: {substory}"
    )]
    MixedComposition {
        /// Qualified story name.
        story: String,
        /// Mode of the story.
        kind: Mode,
        /// Qualified substory name.
        substory: String,
        /// Mode of the substory.
        other_kind: Mode,
    },

    /// A fan-out entry resolved to a substory instead of a leaf step.
    #[error("Parallel group can only contain steps, not substories: {step}\n\nStory method: {story}")]
    ParallelSubstory {
        /// Qualified story name.
        story: String,
        /// Offending step name.
        step: String,
    },

    /// A step returned an outcome its story mode does not allow.
    #[error("Invalid outcome returned from {step}.\n\nGot `{outcome}`. `Next` can only be used in coroutine stories.")]
    UnexpectedOutcome {
        /// Qualified step name.
        step: String,
        /// Rendered outcome.
        outcome: String,
    },

    /// A coroutine story was invoked through a blocking entry point.
    #[error("Coroutine story can not be called synchronously: {story}\n\nUse `call_async` or `run_async`.")]
    CoroutineStory {
        /// Qualified story name.
        story: String,
    },

    /// The fan-out worker pool could not be built.
    #[error("Worker pool could not be created: {0}")]
    WorkerPool(String),
}

// ============================================================================
// Contract Errors
// ============================================================================

/// Context contract violation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Story arguments missing from the attached schema.
    #[error(
        "These arguments should be declared in the context contract: {undefined}\n\n\
         Story method: {story}\n\nStory arguments: {arguments}"
    )]
    UndefinedArguments {
        /// Comma separated undeclared names.
        undefined: String,
        /// Qualified story name.
        story: String,
        /// Comma separated story arguments.
        arguments: String,
    },

    /// The caller supplied names the story does not accept.
    #[error("These arguments are unknown: {unknown}\n\nStory method: {story}\n\n{contract}")]
    UnknownArguments {
        /// Comma separated unknown names.
        unknown: String,
        /// Qualified story name.
        story: String,
        /// Rendered contract.
        contract: String,
    },

    /// A substory started without its arguments present in the context.
    #[error(
        "These variables are missing from the context: {missed}\n\n\
         Story method: {story}\n\nStory arguments: {arguments}\n\n{context}"
    )]
    MissingVariables {
        /// Comma separated missing names.
        missed: String,
        /// Qualified story name.
        story: String,
        /// Comma separated story arguments.
        arguments: String,
        /// Rendered context.
        context: String,
    },

    /// A step tried to set a name already present in the context.
    #[error(
        "This variable is already present in the context: {variable:?}\n\n\
         Function returned value: {step}\n\nUse a different name for context attribute.\n\n{context}"
    )]
    VariableOverride {
        /// Repeated name.
        variable: String,
        /// Qualified step name.
        step: String,
        /// Rendered context.
        context: String,
    },

    /// A step set a name the contract does not declare.
    #[error(
        "This variable was not defined in the context contract: {variable:?}\n\n\
         Function returned value: {step}\n\n\
         Use a different name for context attribute or add this name to the contract.\n\n{contract}"
    )]
    UnknownVariable {
        /// Undeclared name.
        variable: String,
        /// Qualified step name.
        step: String,
        /// Rendered contract.
        contract: String,
    },

    /// A step set values that fail validation.
    #[error(
        "These variables violate context contract: {variables}\n\n\
         Function returned value: {step}\n\nViolations:\n\n{violations}\n\n{contract}"
    )]
    InvalidVariable {
        /// Comma separated names.
        variables: String,
        /// Qualified step name.
        step: String,
        /// Rendered violations.
        violations: String,
        /// Rendered contract fields involved.
        contract: String,
    },

    /// The caller supplied values that fail validation.
    #[error(
        "These arguments violate context contract: {variables}\n\n\
         Story method: {story}\n\nViolations:\n\n{violations}\n\n{contract}"
    )]
    InvalidArguments {
        /// Comma separated names.
        variables: String,
        /// Qualified story name.
        story: String,
        /// Rendered violations.
        violations: String,
        /// Rendered contract fields involved.
        contract: String,
    },

    /// Story and substory both declare the same variables.
    #[error(
        "Repeated variables can not be used in a story composition.\n\n\
         Variables repeated in both context contracts: {repeated}\n\n\
         Story method: {story}\n\nSubstory method: {substory}\n\nUse variables with different names."
    )]
    RepeatedVariables {
        /// Comma separated repeated names.
        repeated: String,
        /// Qualified story name.
        story: String,
        /// Qualified substory name.
        substory: String,
    },

    /// Story and substory contracts come from incompatible validator families.
    #[error(
        "Story and substory context contracts has incompatible types:\n\n\
         Story method: {story}\n\nStory context contract: {contract}\n\n\
         Substory method: {substory}\n\nSubstory context contract: {other_contract}"
    )]
    IncompatibleTypes {
        /// Qualified story name.
        story: String,
        /// Story contract family.
        contract: String,
        /// Qualified substory name.
        substory: String,
        /// Substory contract family.
        other_contract: String,
    },

    /// Validators of the same name normalized a value differently.
    #[error("These arguments have normalization conflict: {conflict}\n\n{results}\n\n{contract}")]
    NormalizationConflict {
        /// Comma separated names.
        conflict: String,
        /// Normalized values per declaring story.
        results: String,
        /// Rendered contract fields involved.
        contract: String,
    },
}

// ============================================================================
// Failure Protocol Errors
// ============================================================================

/// Failure reason violates the declared failure protocol.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureProtocolError {
    /// A reason was given in a story without failure protocol.
    #[error(
        "Failure({reason}) can not be used in a story without failure protocol.\n\n\
         Function returned value: {step}\n\nUse 'failures' story method to define failure protocol."
    )]
    UnexpectedReason {
        /// Rendered reason.
        reason: String,
        /// Qualified step name.
        step: String,
    },

    /// No reason was given in a story with failure protocol.
    #[error(
        "Failure() can not be used in a story with failure protocol.\n\n\
         Available failures are: {available}\n\nFunction returned value: {step}\n\n\
         Use one of them as Failure() argument."
    )]
    MissingReason {
        /// Rendered vocabulary.
        available: String,
        /// Qualified step name.
        step: String,
    },

    /// No reason was given by a step whose null protocol was disabled by composition.
    #[error(
        "Failure() can not be used in a story composition.\n\n\
         Different types of failure protocol were used in parent and substory definitions.\n\n\
         Function returned value: {step}\n\nUse 'failures' story method to define failure protocol."
    )]
    DisabledNullProtocol {
        /// Qualified step name.
        step: String,
    },

    /// The reason is outside the declared vocabulary.
    #[error(
        "Failure({reason}) failure reason is not allowed by current protocol.\n\n\
         Available failures are: {available}\n\nFunction returned value: {step}"
    )]
    ReasonNotAllowed {
        /// Rendered reason.
        reason: String,
        /// Rendered vocabulary.
        available: String,
        /// Qualified step name.
        step: String,
    },

    /// `failed_because` was used on a story without failure protocol.
    #[error(
        "'failed_because' method can not be used with story defined without failure protocol.\n\n\
         Story returned result: {story}\n\nUse 'failures' story method to define failure protocol."
    )]
    SummaryWithoutProtocol {
        /// Qualified story name.
        story: String,
    },

    /// `failed_because` argument is outside the declared vocabulary.
    #[error(
        "'failed_because' method got argument mismatching failure protocol: {reason}\n\n\
         Available failures are: {available}\n\nStory returned result: {story}"
    )]
    SummaryReasonMismatch {
        /// Rendered reason.
        reason: String,
        /// Rendered vocabulary.
        available: String,
        /// Qualified story name.
        story: String,
    },

    /// Story and substory declared incompatible kinds of vocabulary.
    #[error(
        "Story and substory failure protocols has incompatible types:\n\n\
         Story method: {story}\n\nStory failure protocol: {available}\n\n\
         Substory method: {substory}\n\nSubstory failure protocol: {other_available}"
    )]
    IncompatibleTypes {
        /// Qualified story name.
        story: String,
        /// Rendered story vocabulary.
        available: String,
        /// Qualified substory name.
        substory: String,
        /// Rendered substory vocabulary.
        other_available: String,
    },
}

// ============================================================================
// Business Failure
// ============================================================================

/// A step reported `Failure` while the story ran in call mode.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("FailureError({})", .reason.as_ref().map(ToString::to_string).unwrap_or_default())]
pub struct FailureError {
    /// Name of the failed step.
    pub step: String,
    /// Reason given by the step, if any.
    pub reason: Option<Reason>,
}

// ============================================================================
// Step Errors
// ============================================================================

/// An error raised inside a step body.
///
/// Any `std::error::Error` converts into it with `?`. The original error stays
/// reachable through [`StepError::downcast_ref`] and [`StepError::into_inner`].
pub struct StepError {
    name: String,
    inner: BoxError,
}

impl StepError {
    /// Wrap a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Message(message.to_string()).into()
    }

    /// Short type name of the wrapped error.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the wrapped error as a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Unwrap into the original boxed error.
    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl<E> From<E> for StepError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            name: short_type_name::<E>(),
            inner: Box::new(error),
        }
    }
}

impl fmt::Debug for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepError")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Plain message raised through [`StepError::msg`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct Message(pub String);

// ============================================================================
// Story Error
// ============================================================================

/// Any error produced while defining, compiling or running a story.
#[derive(thiserror::Error, Debug)]
pub enum StoryError {
    /// The story is mis-declared.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Context contract violation.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Failure protocol violation.
    #[error(transparent)]
    FailureProtocol(#[from] FailureProtocolError),

    /// A step reported a business failure (call mode only).
    #[error(transparent)]
    Failure(#[from] FailureError),

    /// A step body raised an error.
    #[error("{0}")]
    Step(StepError),

    /// The value of a failure summary was requested.
    #[error("Summary value is not available: the story failed on {step}")]
    Summary {
        /// Name of the failed step.
        step: String,
    },

    /// Outcome serialization failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl StoryError {
    /// Short name of the error kind, as shown in execution history.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Definition(_) => "DefinitionError",
            Self::Contract(_) => "ContractError",
            Self::FailureProtocol(_) => "FailureProtocolError",
            Self::Failure(_) => "FailureError",
            Self::Step(error) => error.name(),
            Self::Summary { .. } => "SummaryError",
            Self::Serialization(_) => "SerializationError",
        }
    }
}

impl From<StepError> for StoryError {
    fn from(error: StepError) -> Self {
        Self::Step(error)
    }
}
