//! A story compiled against its owner, ready to be invoked.
//!
//! Mounting happens once; the compiled instruction stream and contracts are
//! shared by every invocation. Invocations never share a context.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::compile::{Compiled, Instruction};
use crate::context::{Arguments, Context};
use crate::contract::Contract;
use crate::error::{DefinitionError, FailureError, StoryError};
use crate::execution::{Machine, Termination};
use crate::failures::{Failures, RunProtocol};
use crate::observe::Observer;
use crate::settings::Settings;
use crate::step::Mode;
use crate::summary::Summary;

/// A compiled story with its settings and observers.
///
/// Cloning is cheap; clones share the compiled story and the worker pool.
#[derive(Clone)]
pub struct Mounted {
    compiled: Arc<Compiled>,
    settings: Settings,
    pool: Option<Arc<rayon::ThreadPool>>,
    observers: Vec<Arc<dyn Observer>>,
}

impl Mounted {
    pub(crate) fn new(compiled: Compiled, settings: Settings) -> Result<Self, StoryError> {
        let pool = match settings.workers {
            Some(workers) => {
                let name = compiled.qualified();
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(move |index| format!("{name}-{index}"))
                    .build()
                    .map_err(|error| DefinitionError::WorkerPool(error.to_string()))?;
                Some(Arc::new(pool))
            }
            None => None,
        };
        Ok(Self {
            compiled: Arc::new(compiled),
            settings,
            pool,
            observers: Vec::new(),
        })
    }

    /// Register an observer called on every invocation.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub(crate) fn compiled(&self) -> &Compiled {
        &self.compiled
    }

    /// Class name of the owner.
    pub fn class_name(&self) -> &str {
        &self.compiled.class
    }

    /// Story name.
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    /// `Class.story`.
    pub fn qualified(&self) -> String {
        self.compiled.qualified()
    }

    /// Whether the story runs function or coroutine steps.
    pub fn mode(&self) -> Mode {
        self.compiled.mode
    }

    /// The root contract, combined with every substory contract.
    pub fn contract(&self) -> Option<&Contract> {
        self.compiled.contracts.first()
    }

    /// The composed failure vocabulary.
    pub fn failures(&self) -> Option<&Failures> {
        self.compiled.failures.as_ref()
    }

    /// The flattened instruction stream.
    pub fn instructions(&self) -> &[Instruction] {
        &self.compiled.instructions
    }

    /// Settings the story was mounted with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The inlined step tree, one name per line.
    pub fn describe(&self) -> String {
        self.to_string()
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Run the story, returning its result or raising on failure.
    ///
    /// A story that finishes without `Result` returns `Value::Null`.
    pub fn call(&self, arguments: impl Into<Arguments>) -> Result<Value, StoryError> {
        let (_, termination) = self.run_blocking(arguments.into())?;
        Self::value(termination?)
    }

    /// Run the story, reporting business failures in a [`Summary`].
    pub fn run(&self, arguments: impl Into<Arguments>) -> Result<Summary, StoryError> {
        let (ctx, termination) = self.run_blocking(arguments.into())?;
        Ok(self.summary(ctx, termination?))
    }

    /// Async counterpart of [`call`](Self::call). Works for both modes.
    pub async fn call_async(&self, arguments: impl Into<Arguments>) -> Result<Value, StoryError> {
        let machine = self.machine(arguments.into())?;
        let (_, termination) = machine.run_async().await;
        Self::value(termination?)
    }

    /// Async counterpart of [`run`](Self::run). Works for both modes.
    pub async fn run_async(&self, arguments: impl Into<Arguments>) -> Result<Summary, StoryError> {
        let machine = self.machine(arguments.into())?;
        let (ctx, termination) = machine.run_async().await;
        Ok(self.summary(ctx, termination?))
    }

    fn machine(&self, arguments: Arguments) -> Result<Machine<'_>, StoryError> {
        Machine::start(
            &self.compiled,
            self.pool.as_deref(),
            &self.observers,
            self.settings.repr_width,
            arguments,
        )
    }

    fn run_blocking(
        &self,
        arguments: Arguments,
    ) -> Result<(Context, Result<Termination, StoryError>), StoryError> {
        if self.compiled.mode == Mode::Coroutine {
            return Err(DefinitionError::CoroutineStory {
                story: self.qualified(),
            }
            .into());
        }
        Ok(self.machine(arguments)?.run_blocking())
    }

    fn value(termination: Termination) -> Result<Value, StoryError> {
        match termination {
            Termination::Result(value) => Ok(value),
            Termination::Finished => Ok(Value::Null),
            Termination::Failure { step, reason } => Err(FailureError { step, reason }.into()),
        }
    }

    fn summary(&self, ctx: Context, termination: Termination) -> Summary {
        let protocol = RunProtocol::new(self.qualified(), self.compiled.failures.clone());
        match termination {
            Termination::Result(value) => Summary::success(protocol, ctx, value),
            Termination::Finished => Summary::success(protocol, ctx, Value::Null),
            Termination::Failure { step, reason } => Summary::failure(protocol, ctx, step, reason),
        }
    }
}

impl fmt::Display for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut indent = 0usize;
        let mut lines = Vec::with_capacity(self.compiled.instructions.len());
        for instruction in &self.compiled.instructions {
            let pad = "  ".repeat(indent);
            match instruction {
                Instruction::Begin { label, .. } => {
                    lines.push(format!("{pad}{label}"));
                    indent += 1;
                }
                Instruction::End => indent = indent.saturating_sub(1),
                Instruction::Step { step, .. } => lines.push(format!("{pad}{}", step.name())),
                Instruction::Parallel { steps, .. } => {
                    let names: Vec<&str> = steps.iter().map(|step| step.name()).collect();
                    lines.push(format!("{pad}parallel({})", names.join(", ")));
                }
            }
        }
        f.write_str(&lines.join("\n"))
    }
}

impl fmt::Debug for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("story", &self.qualified())
            .field("mode", &self.compiled.mode)
            .field("instructions", &self.compiled.instructions.len())
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .finish()
    }
}
