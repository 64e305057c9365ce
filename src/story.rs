//! Story definitions.
//!
//! A story is declared once, as an ordered list of step names, and resolved
//! later against an owner object implementing [`Storied`]. Resolution happens
//! every time the story is mounted, so the same name may resolve to different
//! steps or substories on different owners.
//!
//! ```
//! use fabula::{Story, StoryError};
//!
//! fn place_order() -> Result<Story, StoryError> {
//!     Story::define("Shop", "place_order")
//!         .arguments(["order_id"])
//!         .steps(["find_order", "check_stock", "charge"])
//!         .build()
//! }
//! # assert!(place_order().is_ok());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::compile;
use crate::contract::Contract;
use crate::error::{DefinitionError, StoryError};
use crate::failures::Failures;
use crate::mounted::Mounted;
use crate::settings::Settings;
use crate::step::Member;
use crate::validate::Spec;

/// An object stories are resolved against.
///
/// Usually implemented with the `storied!` macro.
pub trait Storied: Send + Sync + 'static {
    /// Class name shown in diagnostics.
    fn class_name(&self) -> &str;

    /// Resolve a collected name to a step, a substory or an injected story.
    fn member(self: Arc<Self>, name: &str) -> Option<Member>;
}

/// One collected entry of a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Collected {
    Step(String),
    Parallel(Vec<String>),
}

struct Definition {
    class: String,
    name: String,
    arguments: Vec<String>,
    collected: Vec<Collected>,
    spec: Option<Arc<dyn Spec>>,
    failures: Option<Failures>,
}

/// A named, ordered list of steps, with its contract and failure protocol.
#[derive(Clone)]
pub struct Story(Arc<Definition>);

impl Story {
    /// Start declaring `Class.name`.
    pub fn define(class: impl Into<String>, name: impl Into<String>) -> StoryBuilder {
        StoryBuilder {
            class: class.into(),
            name: name.into(),
            arguments: None,
            collected: Vec::new(),
            spec: None,
            failures: None,
        }
    }

    /// Class the story is declared on.
    pub fn class_name(&self) -> &str {
        &self.0.class
    }

    /// Story name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// `Class.name`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.0.class, self.0.name)
    }

    /// Declared arguments.
    pub fn arguments(&self) -> &[String] {
        &self.0.arguments
    }

    /// Collected step names, parallel groups flattened.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.0.collected.iter().flat_map(|collected| match collected {
            Collected::Step(name) => std::slice::from_ref(name).iter(),
            Collected::Parallel(names) => names.iter(),
        })
        .map(String::as_str)
    }

    /// Declared failure vocabulary.
    pub fn failures(&self) -> Option<&Failures> {
        self.0.failures.as_ref()
    }

    /// Attached schema.
    pub fn spec(&self) -> Option<Arc<dyn Spec>> {
        self.0.spec.clone()
    }

    pub(crate) fn collected(&self) -> &[Collected] {
        &self.0.collected
    }

    /// The same story with `spec` as its context contract.
    pub fn with_contract(&self, spec: Arc<dyn Spec>) -> Result<Story, StoryError> {
        Contract::new(&self.0.class, &self.0.name, &self.0.arguments, Some(Arc::clone(&spec)))?;
        Ok(self.rebuild(|definition| definition.spec = Some(spec)))
    }

    /// The same story with `failures` as its failure protocol.
    pub fn with_failures(&self, failures: Failures) -> Story {
        self.rebuild(|definition| definition.failures = Some(failures))
    }

    fn rebuild(&self, change: impl FnOnce(&mut Definition)) -> Story {
        let mut definition = Definition {
            class: self.0.class.clone(),
            name: self.0.name.clone(),
            arguments: self.0.arguments.clone(),
            collected: self.0.collected.clone(),
            spec: self.0.spec.clone(),
            failures: self.0.failures.clone(),
        };
        change(&mut definition);
        Story(Arc::new(definition))
    }

    /// Compile the story against `owner` with default settings.
    pub fn mount<T: Storied>(&self, owner: Arc<T>) -> Result<Mounted, StoryError> {
        self.mount_with(owner, Settings::default())
    }

    /// Compile the story against `owner`.
    pub fn mount_with<T: Storied>(
        &self,
        owner: Arc<T>,
        settings: Settings,
    ) -> Result<Mounted, StoryError> {
        let compiled = compile::compile(self, owner)?;
        Mounted::new(compiled, settings)
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())?;
        for collected in &self.0.collected {
            match collected {
                Collected::Step(name) => write!(f, "\n  {name}")?,
                Collected::Parallel(names) => write!(f, "\n  parallel({})", names.join(", "))?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Story")
            .field("story", &self.qualified())
            .field("arguments", &self.0.arguments)
            .field("collected", &self.0.collected)
            .field("failures", &self.0.failures)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent declaration of a story. Nothing is checked until [`build`](Self::build).
pub struct StoryBuilder {
    class: String,
    name: String,
    arguments: Option<Vec<String>>,
    collected: Vec<Collected>,
    spec: Option<Arc<dyn Spec>>,
    failures: Option<Failures>,
}

impl StoryBuilder {
    /// Declare one argument.
    pub fn argument(mut self, name: impl Into<String>) -> Self {
        self.arguments.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Declare arguments. An empty list is a definition error.
    pub fn arguments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Collect one step.
    pub fn step(mut self, name: impl Into<String>) -> Self {
        self.collected.push(Collected::Step(name.into()));
        self
    }

    /// Collect steps in order.
    pub fn steps<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collected
            .extend(names.into_iter().map(|name| Collected::Step(name.into())));
        self
    }

    /// Collect a group of independent steps run together.
    pub fn parallel<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collected.push(Collected::Parallel(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Attach a context contract.
    pub fn contract(mut self, spec: Arc<dyn Spec>) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Attach a failure protocol.
    pub fn failures(mut self, failures: Failures) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Check the declaration and freeze it.
    pub fn build(self) -> Result<Story, StoryError> {
        let story = format!("{}.{}", self.class, self.name);

        let arguments = match self.arguments {
            Some(arguments) if arguments.is_empty() => {
                return Err(DefinitionError::EmptyArguments { story }.into());
            }
            Some(arguments) => arguments,
            None => Vec::new(),
        };
        let mut seen = BTreeSet::new();
        for argument in &arguments {
            if !is_identifier(argument) {
                return Err(DefinitionError::InvalidArgument {
                    story,
                    argument: argument.clone(),
                }
                .into());
            }
            if !seen.insert(argument.as_str()) {
                return Err(DefinitionError::DuplicateArgument {
                    story,
                    argument: argument.clone(),
                }
                .into());
            }
        }

        if self.collected.is_empty() {
            return Err(DefinitionError::EmptyStory { story }.into());
        }
        let mut steps = BTreeSet::new();
        for collected in &self.collected {
            let names = match collected {
                Collected::Step(name) => std::slice::from_ref(name),
                Collected::Parallel(names) if names.is_empty() => {
                    return Err(DefinitionError::EmptyParallel { story }.into());
                }
                Collected::Parallel(names) => names.as_slice(),
            };
            for name in names {
                if *name == self.name {
                    return Err(DefinitionError::RecursiveStory {
                        story,
                        step: name.clone(),
                    }
                    .into());
                }
                if !steps.insert(name.as_str()) {
                    return Err(DefinitionError::DuplicateStep {
                        story,
                        step: name.clone(),
                    }
                    .into());
                }
            }
        }

        if let Some(spec) = &self.spec {
            Contract::new(&self.class, &self.name, &arguments, Some(Arc::clone(spec)))?;
        }

        Ok(Story(Arc::new(Definition {
            class: self.class,
            name: self.name,
            arguments,
            collected: self.collected,
            spec: self.spec,
            failures: self.failures,
        })))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
