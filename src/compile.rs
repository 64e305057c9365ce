//! Story compiler: resolves collected names on the owner and flattens
//! substories into one instruction stream.
//!
//! Every story, the root included, is bracketed by `Begin`/`End`. A substory
//! is compiled on its own first (with its own post passes) and then spliced
//! into its parent, which combines the two contracts and failure protocols.
//!
//! ```text
//! Begin(Parent.y)
//!   Step(start)
//!   Begin(x (Simple.x))
//!     Step(one)
//!     Step(two)
//!   End
//!   Step(after)
//! End
//! ```

use std::sync::Arc;

use crate::contract::{self, Contract};
use crate::error::{DefinitionError, StoryError};
use crate::failures::{self, ExecProtocol, Failures};
use crate::step::{Member, Mode, Step};
use crate::story::{Collected, Storied, Story};

/// One entry of a compiled story.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// A story or substory starts.
    Begin {
        /// Label shown in traces and descriptions.
        label: String,
        /// Index of the story's own contract.
        contract: usize,
    },
    /// A leaf step.
    Step {
        /// The resolved step.
        step: Step,
        /// Index of the contract of the story declaring the step.
        contract: usize,
        /// Protocol of the story declaring the step.
        protocol: ExecProtocol,
    },
    /// A group of independent steps run together.
    Parallel {
        /// The resolved steps.
        steps: Vec<Step>,
        /// Index of the contract of the story declaring the group.
        contract: usize,
        /// Protocol of the story declaring the group.
        protocol: ExecProtocol,
    },
    /// The innermost open story ends.
    End,
}

impl Instruction {
    fn shifted(self, offset: usize) -> Self {
        match self {
            Self::Begin { label, contract } => Self::Begin {
                label,
                contract: contract + offset,
            },
            Self::Step {
                step,
                contract,
                protocol,
            } => Self::Step {
                step,
                contract: contract + offset,
                protocol,
            },
            Self::Parallel {
                steps,
                contract,
                protocol,
            } => Self::Parallel {
                steps,
                contract: contract + offset,
                protocol,
            },
            Self::End => Self::End,
        }
    }

    fn disable_null(&mut self) {
        if let Self::Step { protocol, .. } | Self::Parallel { protocol, .. } = self {
            *protocol = protocol.clone().disable_null();
        }
    }
}

/// A story resolved against its owner.
#[derive(Clone)]
pub(crate) struct Compiled {
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) owner: Arc<dyn Storied>,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) contracts: Vec<Contract>,
    pub(crate) failures: Option<Failures>,
    pub(crate) mode: Mode,
}

impl Compiled {
    pub(crate) fn qualified(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }
}

type Frame = (usize, String);

fn address(owner: &Arc<dyn Storied>) -> usize {
    Arc::as_ptr(owner) as *const () as usize
}

/// Compile `story` against `owner`.
pub(crate) fn compile(story: &Story, owner: Arc<dyn Storied>) -> Result<Compiled, StoryError> {
    let mut stack = Vec::new();
    let compiled = compile_nested(story, owner, &mut stack)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        story = %compiled.qualified(),
        instructions = compiled.instructions.len(),
        contracts = compiled.contracts.len(),
        mode = %compiled.mode,
        "story.compile"
    );

    Ok(compiled)
}

fn compile_nested(
    story: &Story,
    owner: Arc<dyn Storied>,
    stack: &mut Vec<Frame>,
) -> Result<Compiled, StoryError> {
    stack.push((address(&owner), story.qualified()));
    let result = Compiler::new(story, owner)?.run(stack);
    stack.pop();
    result
}

struct Compiler<'a> {
    story: &'a Story,
    owner: Arc<dyn Storied>,
    protocol: ExecProtocol,
    failures: Option<Failures>,
    mode: Option<Mode>,
    contracts: Vec<Contract>,
    instructions: Vec<Instruction>,
}

impl<'a> Compiler<'a> {
    fn new(story: &'a Story, owner: Arc<dyn Storied>) -> Result<Self, StoryError> {
        let contract = Contract::new(
            story.class_name(),
            story.name(),
            story.arguments(),
            story.spec(),
        )?;
        Ok(Self {
            story,
            owner,
            protocol: ExecProtocol::new(story.failures()),
            failures: story.failures().cloned(),
            mode: None,
            contracts: vec![contract],
            instructions: vec![Instruction::Begin {
                label: story.qualified(),
                contract: 0,
            }],
        })
    }

    fn run(mut self, stack: &mut Vec<Frame>) -> Result<Compiled, StoryError> {
        for collected in self.story.collected() {
            match collected {
                Collected::Step(name) => self.resolve(name, stack)?,
                Collected::Parallel(names) => self.resolve_parallel(names)?,
            }
        }
        self.instructions.push(Instruction::End);

        contract::sync_arguments(&mut self.contracts);
        if self.failures.is_some() {
            self.instructions
                .iter_mut()
                .for_each(Instruction::disable_null);
        }

        Ok(Compiled {
            class: self.story.class_name().to_string(),
            name: self.story.name().to_string(),
            owner: self.owner,
            instructions: self.instructions,
            contracts: self.contracts,
            failures: self.failures,
            mode: self.mode.unwrap_or(Mode::Function),
        })
    }

    fn member(&self, name: &str) -> Result<Member, StoryError> {
        Arc::clone(&self.owner).member(name).ok_or_else(|| {
            DefinitionError::UnknownStep {
                story: self.story.qualified(),
                step: name.to_string(),
            }
            .into()
        })
    }

    fn resolve(&mut self, name: &str, stack: &mut Vec<Frame>) -> Result<(), StoryError> {
        match self.member(name)? {
            Member::Step(step) => {
                let step = self.leaf(step)?;
                self.instructions.push(Instruction::Step {
                    step,
                    contract: 0,
                    protocol: self.protocol.clone(),
                });
            }
            Member::Story { story, owner } => {
                let story = story?;
                let frame = (address(&owner), story.qualified());
                if stack.contains(&frame) {
                    return Err(DefinitionError::RecursiveStory {
                        story: self.story.qualified(),
                        step: name.to_string(),
                    }
                    .into());
                }
                let child = compile_nested(&story, owner, stack)?;
                self.splice(name, child)?;
            }
            Member::Mounted(mounted) => {
                let child = mounted.compiled().clone();
                self.splice(name, child)?;
            }
        }
        Ok(())
    }

    fn resolve_parallel(&mut self, names: &[String]) -> Result<(), StoryError> {
        let mut steps = Vec::with_capacity(names.len());
        for name in names {
            match self.member(name)? {
                Member::Step(step) => steps.push(self.leaf(step)?),
                Member::Story { .. } | Member::Mounted(_) => {
                    return Err(DefinitionError::ParallelSubstory {
                        story: self.story.qualified(),
                        step: name.clone(),
                    }
                    .into());
                }
            }
        }
        self.instructions.push(Instruction::Parallel {
            steps,
            contract: 0,
            protocol: self.protocol.clone(),
        });
        Ok(())
    }

    /// Bind a leaf step to its owner and check it matches the story mode.
    fn leaf(&mut self, step: Step) -> Result<Step, StoryError> {
        let step = step.bind(self.owner.class_name());
        match self.mode {
            None => self.mode = Some(step.mode()),
            Some(mode) if mode != step.mode() => {
                return Err(DefinitionError::MixedSteps {
                    story: self.story.qualified(),
                    step: step.qualified(),
                    expected: mode,
                }
                .into());
            }
            Some(_) => {}
        }
        Ok(step)
    }

    fn splice(&mut self, name: &str, mut child: Compiled) -> Result<(), StoryError> {
        match self.mode {
            None => self.mode = Some(child.mode),
            Some(mode) if mode != child.mode => {
                return Err(DefinitionError::MixedComposition {
                    story: self.story.qualified(),
                    kind: mode,
                    substory: child.qualified(),
                    other_kind: child.mode,
                }
                .into());
            }
            Some(_) => {}
        }

        if let Some(root) = child.contracts.first_mut() {
            contract::combine(&mut self.contracts[0], root)?;
        }
        self.failures = failures::combine(
            &self.story.qualified(),
            self.failures.take(),
            &child.qualified(),
            child.failures.as_ref(),
        )?;

        let label = if address(&child.owner) == address(&self.owner) {
            name.to_string()
        } else {
            format!("{name} ({})", child.qualified())
        };
        let offset = self.contracts.len();
        let mut instructions = child.instructions.into_iter().map(|i| i.shifted(offset));
        if let Some(Instruction::Begin { contract, .. }) = instructions.next() {
            self.instructions.push(Instruction::Begin { label, contract });
        }
        self.instructions.extend(instructions);
        self.contracts.extend(child.contracts);
        Ok(())
    }
}
