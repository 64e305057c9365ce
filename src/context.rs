//! The append-only namespace shared by the steps of one invocation.
//!
//! Steps only read the context. New names enter it through a `Success`
//! outcome, after the contract has validated them; a name never changes once
//! it is set. Every name remembers who set it, which is what the context
//! representation prints next to each value.

use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::history::History;
use crate::settings::DEFAULT_REPR_WIDTH;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised when a step reads the context.
#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    /// The name is not present.
    #[error("'Context' object has no attribute {name}\n\n{context}")]
    MissingVariable {
        /// Requested name.
        name: String,
        /// Rendered context.
        context: String,
    },

    /// The value could not be converted to the requested type.
    #[error("Context variable {name} has unexpected type: {source}")]
    Deserialize {
        /// Requested name.
        name: String,
        /// Conversion error.
        source: serde_json::Error,
    },
}

// ============================================================================
// Arguments
// ============================================================================

/// Named values a story is called with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(IndexMap<String, Value>);

impl Arguments {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub(crate) fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Arguments
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<serde_json::Map<String, Value>> for Arguments {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Context
// ============================================================================

/// Values set so far in one invocation, with the trace that produced them.
#[derive(Debug, Clone)]
pub struct Context {
    ns: IndexMap<String, Value>,
    lines: Vec<String>,
    history: History,
    width: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DEFAULT_REPR_WIDTH)
    }
}

impl Context {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            ns: IndexMap::new(),
            lines: Vec::new(),
            history: History::new(),
            width,
        }
    }

    /// Value of a name, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ns.get(name)
    }

    /// Value of a name, or an error rendering the whole context.
    pub fn require(&self, name: &str) -> Result<&Value, ContextError> {
        self.ns
            .get(name)
            .ok_or_else(|| ContextError::MissingVariable {
                name: name.to_string(),
                context: self.to_string(),
            })
    }

    /// Value of a name converted to `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ContextError> {
        let value = self.require(name)?;
        serde_json::from_value(value.clone()).map_err(|source| ContextError::Deserialize {
            name: name.to_string(),
            source,
        })
    }

    /// Whether a name is set.
    pub fn contains(&self, name: &str) -> bool {
        self.ns.contains_key(name)
    }

    /// Names in the order they were set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ns.keys().map(String::as_str)
    }

    /// Names and values in the order they were set.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of names set.
    pub fn len(&self) -> usize {
        self.ns.len()
    }

    /// Whether nothing is set.
    pub fn is_empty(&self) -> bool {
        self.ns.is_empty()
    }

    /// Execution trace so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub(crate) fn argument(&mut self, name: String, value: Value) {
        self.ns.insert(name, value);
        self.lines.push("Story argument".to_string());
    }

    /// Values must already be checked against the contract.
    pub(crate) fn extend(&mut self, step: &str, kwargs: IndexMap<String, Value>) {
        for (name, value) in kwargs {
            self.ns.insert(name, value);
            self.lines.push(format!("Set by {step}"));
        }
    }

    /// The `Context:` block, without the trace.
    pub fn representation(&self) -> String {
        if self.lines.is_empty() {
            return "Context()".to_string();
        }
        let mut items = Vec::with_capacity(self.ns.len());
        let mut longest = 0;
        for (name, value) in &self.ns {
            let item = value.to_string();
            let (head, tail) = if name.len() + item.len() + 4 > self.width || item.contains('\n') {
                let indented: Vec<String> = item.lines().map(|line| format!("    {line}")).collect();
                (format!("{name}:"), format!("\n{}", indented.join("\n")))
            } else {
                (format!("{name}: {item}"), String::new())
            };
            longest = longest.max(head.len());
            items.push((head, tail));
        }
        let mut lines = vec!["Context:".to_string()];
        for ((head, tail), line) in items.iter().zip(&self.lines) {
            lines.push(format!("  {head:<longest$}  # {line}{tail}"));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.history.lines().is_empty() {
            f.write_str(&self.representation())
        } else {
            write!(f, "{}\n\n{}", self.history, self.representation())
        }
    }
}
