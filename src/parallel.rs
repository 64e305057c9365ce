//! Fan-out of independent steps and the merge of their outcomes.
//!
//! Branches all read the same context and never write to it; their outcomes
//! are merged on the calling thread before anything is committed. Branches of
//! one group are expected to set disjoint names.

use futures::future::join_all;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;

use crate::context::Context;
use crate::error::{DefinitionError, StepError};
use crate::failures::Reason;
use crate::step::{Outcome, Step, StepResult};

/// Run function steps on the pool, or on the global rayon pool.
pub(crate) fn run_blocking(
    pool: Option<&rayon::ThreadPool>,
    steps: &[Step],
    ctx: &Context,
) -> Vec<StepResult> {
    let run = || {
        steps
            .par_iter()
            .map(|step| {
                step.call_blocking(ctx).unwrap_or_else(|| {
                    Err(StepError::from(DefinitionError::CoroutineStory {
                        story: step.qualified(),
                    }))
                })
            })
            .collect()
    };
    match pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
}

/// Poll every step concurrently on the current task.
pub(crate) async fn run_async(steps: &[Step], ctx: &Context) -> Vec<StepResult> {
    join_all(steps.iter().map(|step| step.invoke(ctx))).await
}

/// Merged outcome of a parallel group.
#[derive(Debug)]
pub(crate) enum Merged<'a> {
    /// Every branch succeeded; names are committed branch by branch.
    Success(Vec<(&'a Step, IndexMap<String, Value>)>),
    /// The first failing branch.
    Failure {
        step: &'a Step,
        reason: Option<Reason>,
    },
    /// Anything else: the list of raw outcomes.
    Result(Value),
}

pub(crate) fn merge(outcomes: Vec<(&Step, Outcome)>) -> Result<Merged<'_>, serde_json::Error> {
    if outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, Outcome::Success(_)))
    {
        let branches = outcomes
            .into_iter()
            .filter_map(|(step, outcome)| match outcome {
                Outcome::Success(kwargs) => Some((step, kwargs)),
                _ => None,
            })
            .collect();
        return Ok(Merged::Success(branches));
    }

    let failed = outcomes.iter().find_map(|(step, outcome)| match outcome {
        Outcome::Failure(reason) => Some((*step, reason.clone())),
        _ => None,
    });
    if let Some((step, reason)) = failed {
        return Ok(Merged::Failure { step, reason });
    }

    let raw: Vec<&Outcome> = outcomes.iter().map(|(_, outcome)| outcome).collect();
    Ok(Merged::Result(serde_json::to_value(raw)?))
}
