//! The per-invocation state machine.
//!
//! One forward pass over the instruction stream, no backtracking. While a
//! `Skip` is in effect the machine only counts `Begin`/`End` pairs until the
//! substory that issued it is closed. Everything a step returns is classified
//! here: successes are validated and committed, failures checked against the
//! protocol, step errors recorded in the trace and returned unchanged.
//!
//! The blocking and async drivers share every rule; they only differ in how a
//! step body is invoked.

use std::sync::Arc;

use serde_json::Value;

use crate::compile::{Compiled, Instruction};
use crate::context::{Arguments, Context};
use crate::error::{DefinitionError, StoryError};
use crate::failures::{ExecProtocol, Reason};
use crate::observe::{InvocationId, Observer};
use crate::parallel::{self, Merged};
use crate::step::{Mode, Outcome, Step, StepResult};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// A step reported a business failure.
    Failure {
        /// Name of the failed step.
        step: String,
        /// Reason given by the step.
        reason: Option<Reason>,
    },
    /// A step returned the story result.
    Result(Value),
    /// The instruction stream was exhausted.
    Finished,
}

enum Flow {
    Continue,
    Stop(Termination),
}

/// Execution state of one invocation.
pub(crate) struct Machine<'a> {
    compiled: &'a Compiled,
    pool: Option<&'a rayon::ThreadPool>,
    observers: &'a [Arc<dyn Observer>],
    id: InvocationId,
    ctx: Context,
    skipped: usize,
    depth: usize,
}

impl<'a> Machine<'a> {
    /// Validate the call arguments and build the context.
    pub(crate) fn start(
        compiled: &'a Compiled,
        pool: Option<&'a rayon::ThreadPool>,
        observers: &'a [Arc<dyn Observer>],
        width: usize,
        arguments: Arguments,
    ) -> Result<Self, StoryError> {
        let root = compiled
            .contracts
            .first()
            .ok_or_else(|| DefinitionError::EmptyStory {
                story: compiled.qualified(),
            })?;
        let mut kwargs = root.check_call(arguments.into_inner())?;

        let mut ctx = Context::new(width);
        for name in root.argument_names() {
            if let Some(value) = kwargs.shift_remove(name) {
                ctx.argument(name.to_string(), value);
            }
        }

        let id = InvocationId::new();
        let story = compiled.qualified();

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %id, story = %story, arguments = ctx.len(), "story.start");

        for observer in observers {
            observer.context_created(id, &story, &ctx);
        }

        Ok(Self {
            compiled,
            pool,
            observers,
            id,
            ctx,
            skipped: 0,
            depth: 0,
        })
    }

    /// Run every function step on the current thread.
    pub(crate) fn run_blocking(mut self) -> (Context, Result<Termination, StoryError>) {
        let result = self.drive_blocking();
        self.finish();
        (self.ctx, result)
    }

    /// Run the story, awaiting coroutine steps one at a time.
    pub(crate) async fn run_async(mut self) -> (Context, Result<Termination, StoryError>) {
        let result = self.drive_async().await;
        self.finish();
        (self.ctx, result)
    }

    fn drive_blocking(&mut self) -> Result<Termination, StoryError> {
        let compiled = self.compiled;
        for instruction in &compiled.instructions {
            if self.suppressed(instruction) {
                continue;
            }
            let flow = match instruction {
                Instruction::Begin { label, contract } => self.begin(label, *contract)?,
                Instruction::End => self.end(),
                Instruction::Step {
                    step,
                    contract,
                    protocol,
                } => {
                    self.before(step);
                    let result = step.call_blocking(&self.ctx).ok_or_else(|| {
                        DefinitionError::CoroutineStory {
                            story: compiled.qualified(),
                        }
                    })?;
                    self.settle(step, *contract, protocol, result)?
                }
                Instruction::Parallel {
                    steps,
                    contract,
                    protocol,
                } => {
                    self.before_parallel(steps);
                    let results = parallel::run_blocking(self.pool, steps, &self.ctx);
                    self.settle_parallel(steps, *contract, protocol, results)?
                }
            };
            if let Flow::Stop(termination) = flow {
                return Ok(termination);
            }
        }
        Ok(Termination::Finished)
    }

    async fn drive_async(&mut self) -> Result<Termination, StoryError> {
        let compiled = self.compiled;
        for instruction in &compiled.instructions {
            if self.suppressed(instruction) {
                continue;
            }
            let flow = match instruction {
                Instruction::Begin { label, contract } => self.begin(label, *contract)?,
                Instruction::End => self.end(),
                Instruction::Step {
                    step,
                    contract,
                    protocol,
                } => {
                    self.before(step);
                    let result = step.invoke(&self.ctx).await;
                    self.settle(step, *contract, protocol, result)?
                }
                Instruction::Parallel {
                    steps,
                    contract,
                    protocol,
                } => {
                    self.before_parallel(steps);
                    let results = parallel::run_async(steps, &self.ctx).await;
                    self.settle_parallel(steps, *contract, protocol, results)?
                }
            };
            if let Flow::Stop(termination) = flow {
                return Ok(termination);
            }
        }
        Ok(Termination::Finished)
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Count nested substories while a skip is in effect.
    fn suppressed(&mut self, instruction: &Instruction) -> bool {
        if self.skipped == 0 {
            return false;
        }
        match instruction {
            Instruction::Begin { .. } => self.skipped += 1,
            Instruction::End => {
                self.skipped -= 1;
                if self.skipped == 0 {
                    self.depth = self.depth.saturating_sub(1);
                }
            }
            Instruction::Step { .. } | Instruction::Parallel { .. } => {}
        }
        true
    }

    fn begin(&mut self, label: &str, contract: usize) -> Result<Flow, StoryError> {
        self.depth += 1;
        self.ctx.history_mut().on_substory_start(label);

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, substory = label, depth = self.depth, "substory.start");

        if let Some(contract) = self.compiled.contracts.get(contract) {
            if let Err(error) = contract.check_substory_call(&self.ctx) {
                return Err(self.errored(error.into()));
            }
        }
        Ok(Flow::Continue)
    }

    fn end(&mut self) -> Flow {
        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, depth = self.depth, "substory.end");

        self.depth = self.depth.saturating_sub(1);
        self.ctx.history_mut().on_substory_end();
        Flow::Continue
    }

    fn before(&mut self, step: &Step) {
        self.ctx.history_mut().before_call(step.name());
        let qualified = step.qualified();

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, step = %qualified, "step.start");

        for observer in self.observers {
            observer.step_invoked(self.id, &qualified, &self.ctx);
        }
    }

    fn before_parallel(&mut self, steps: &[Step]) {
        let names: Vec<&str> = steps.iter().map(Step::name).collect();
        self.ctx
            .history_mut()
            .before_call(&format!("parallel({})", names.join(", ")));
        for step in steps {
            let qualified = step.qualified();

            #[cfg(feature = "tracing")]
            tracing::debug!(invocation = %self.id, step = %qualified, "step.start");

            for observer in self.observers {
                observer.step_invoked(self.id, &qualified, &self.ctx);
            }
        }
    }

    /// Record an error in the trace and hand it back.
    fn errored(&mut self, error: StoryError) -> StoryError {
        self.ctx.history_mut().on_error(error.kind_name());

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, kind = error.kind_name(), error = %error, "step.error");

        error
    }

    fn finish(&self) {
        let story = self.compiled.qualified();

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, story = %story, "story.end");

        for observer in self.observers {
            observer.finished(self.id, &story, &self.ctx);
        }
    }

    // ========================================================================
    // Outcomes
    // ========================================================================

    fn settle(
        &mut self,
        step: &Step,
        contract: usize,
        protocol: &ExecProtocol,
        result: StepResult,
    ) -> Result<Flow, StoryError> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => return Err(self.errored(error.into())),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(invocation = %self.id, step = %step.qualified(), outcome = %outcome, "step.end");

        match outcome {
            Outcome::Success(kwargs) => {
                self.commit(step, contract, kwargs)?;
                Ok(Flow::Continue)
            }
            Outcome::Failure(reason) => self.failure(step, protocol, reason),
            Outcome::Result(value) => Ok(self.result(value)),
            Outcome::Skip => {
                self.skip();
                Ok(Flow::Continue)
            }
            Outcome::Next(value) => {
                if self.compiled.mode == Mode::Function {
                    let error = DefinitionError::UnexpectedOutcome {
                        step: step.qualified(),
                        outcome: Outcome::Next(value).to_string(),
                    };
                    return Err(self.errored(error.into()));
                }
                match value {
                    Some(value) if self.depth <= 1 => Ok(self.result(value)),
                    _ => {
                        self.skip();
                        Ok(Flow::Continue)
                    }
                }
            }
        }
    }

    fn settle_parallel(
        &mut self,
        steps: &[Step],
        contract: usize,
        protocol: &ExecProtocol,
        results: Vec<StepResult>,
    ) -> Result<Flow, StoryError> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (step, result) in steps.iter().zip(results) {
            match result {
                Ok(Outcome::Next(value)) if self.compiled.mode == Mode::Function => {
                    let error = DefinitionError::UnexpectedOutcome {
                        step: step.qualified(),
                        outcome: Outcome::Next(value).to_string(),
                    };
                    return Err(self.errored(error.into()));
                }
                Ok(outcome) => outcomes.push((step, outcome)),
                Err(error) => return Err(self.errored(error.into())),
            }
        }

        match parallel::merge(outcomes) {
            Ok(Merged::Success(branches)) => {
                for (step, kwargs) in branches {
                    self.commit(step, contract, kwargs)?;
                }
                Ok(Flow::Continue)
            }
            Ok(Merged::Failure { step, reason }) => self.failure(step, protocol, reason),
            Ok(Merged::Result(value)) => Ok(self.result(value)),
            Err(error) => Err(self.errored(error.into())),
        }
    }

    fn commit(
        &mut self,
        step: &Step,
        contract: usize,
        kwargs: indexmap::IndexMap<String, Value>,
    ) -> Result<(), StoryError> {
        let qualified = step.qualified();
        let Some(contract) = self.compiled.contracts.get(contract) else {
            self.ctx.extend(&qualified, kwargs);
            return Ok(());
        };
        match contract.check_output(&qualified, &self.ctx, kwargs) {
            Ok(kwargs) => {
                self.ctx.extend(&qualified, kwargs);
                Ok(())
            }
            Err(error) => Err(self.errored(error.into())),
        }
    }

    fn failure(
        &mut self,
        step: &Step,
        protocol: &ExecProtocol,
        reason: Option<Reason>,
    ) -> Result<Flow, StoryError> {
        let qualified = step.qualified();
        if let Err(error) = protocol.check_return(&qualified, reason.as_ref()) {
            return Err(self.errored(error.into()));
        }
        let rendered = reason.as_ref().map(ToString::to_string);
        self.ctx.history_mut().on_failure(rendered.as_deref());
        for observer in self.observers {
            observer.failure_raised(self.id, &qualified, reason.as_ref());
        }
        Ok(Flow::Stop(Termination::Failure {
            step: step.name().to_string(),
            reason,
        }))
    }

    fn result(&mut self, value: Value) -> Flow {
        self.ctx.history_mut().on_result(&value.to_string());
        Flow::Stop(Termination::Result(value))
    }

    fn skip(&mut self) {
        self.ctx.history_mut().on_skip();
        self.skipped = 1;
    }
}
