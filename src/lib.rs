#![deny(missing_docs)]

//! Fabula: strict composable stories for multi-step business transactions.
//!
//! # Design Goals
//!
//! - **Explicit outcomes**: every step answers with one of `Success`,
//!   `Failure`, `Result`, `Skip` or `Next`; errors raised by a step are never
//!   mistaken for business failures
//! - **Checked composition**: contracts and failure vocabularies of nested
//!   stories are combined while compiling, so conflicts surface at mount time
//! - **Append-only context**: a name set by one step can never be overwritten
//!   by a later one
//!
//! # Core Concepts
//!
//! - [`Story`]: an ordered list of step names declared for a class
//! - [`Storied`]: an owner object the names resolve against, usually
//!   implemented with [`storied!`]
//! - [`Mounted`]: a story compiled against its owner, invoked with
//!   [`Mounted::call`] or [`Mounted::run`]
//! - [`Context`]: the values accumulated during one invocation, with the
//!   [`History`] of executed steps

// Re-exports for macros
pub use async_trait;
pub use paste;

// Modules
pub mod compile;
pub mod context;
pub mod contract;
pub mod error;
pub mod execution;
pub mod failures;
pub mod history;
mod macros;
pub mod mounted;
pub mod observe;
mod parallel;
pub mod settings;
pub mod shortcuts;
pub mod step;
pub mod story;
pub mod summary;
pub mod validate;

// Re-exports for convenience
pub use compile::Instruction;
pub use context::{Arguments, Context, ContextError};
pub use contract::Contract;
pub use error::{
    ContractError, DefinitionError, FailureError, FailureProtocolError, Message, StepError,
    StoryError,
};
pub use execution::Termination;
pub use failures::{Enumeration, ExecProtocol, Failures, Reason, RunProtocol};
pub use history::History;
pub use mounted::Mounted;
pub use observe::{InvocationId, Observer, Record, Recorder};
pub use settings::{Settings, DEFAULT_REPR_WIDTH};
pub use shortcuts::{contract_in, failures_in};
pub use step::{Coroutine, IntoStory, Member, Mode, Outcome, Step, StepResult};
pub use story::{Storied, Story, StoryBuilder};
pub use summary::Summary;
pub use validate::{Family, FieldValidator, Kind, RawSchema, Schema, Spec, TypedSchema, Violation};

#[cfg(test)]
mod tests;
