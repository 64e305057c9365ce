//! Failure protocols: the closed vocabulary of reasons a story may fail with.
//!
//! A story declares either no vocabulary, a flat list of tokens, or an
//! enumeration. Steps are checked against the [`ExecProtocol`] of the story that
//! declared them; summaries compare reasons through the [`RunProtocol`] built
//! from the vocabulary of the whole composition.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::{short_type_name, FailureProtocolError};

// ============================================================================
// Reason
// ============================================================================

/// A failure reason carried by `Outcome::Failure`.
///
/// Tokens compare by value. Enumeration members compare by member name only,
/// so a member of a combined enumeration equals the member it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reason {
    /// Member of a flat token list.
    Token(String),
    /// Member of an enumeration.
    Member {
        /// Enumeration name.
        enumeration: String,
        /// Member name.
        name: String,
        /// Underlying member value.
        value: i64,
    },
}

impl Reason {
    /// Build a reason from a member of a `strum` enumeration.
    ///
    /// Values are assigned by declaration order, starting at 1.
    pub fn member<E>(member: E) -> Self
    where
        E: IntoEnumIterator + AsRef<str> + 'static,
    {
        let name = member.as_ref().to_string();
        let value = E::iter()
            .position(|other| other.as_ref() == name)
            .map_or(0, |index| index as i64 + 1);
        Self::Member {
            enumeration: short_type_name::<E>(),
            name,
            value,
        }
    }

    /// Token text or member name.
    pub fn name(&self) -> &str {
        match self {
            Self::Token(token) => token,
            Self::Member { name, .. } => name,
        }
    }
}

impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Token(a), Self::Token(b)) => a == b,
            (Self::Member { name: a, .. }, Self::Member { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => write!(f, "{token:?}"),
            Self::Member {
                enumeration,
                name,
                value,
            } => write!(f, "<{enumeration}.{name}: {value}>"),
        }
    }
}

impl From<&str> for Reason {
    fn from(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl From<String> for Reason {
    fn from(token: String) -> Self {
        Self::Token(token)
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

/// A named, closed set of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    name: String,
    members: IndexMap<String, i64>,
}

impl Enumeration {
    /// Create an enumeration whose values follow declaration order, starting at 1.
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = IndexMap::new();
        for member in members {
            let next = values.len() as i64 + 1;
            values.entry(member.into()).or_insert(next);
        }
        Self {
            name: name.into(),
            members: values,
        }
    }

    /// Build the enumeration of a `strum` enum.
    pub fn of<E>() -> Self
    where
        E: IntoEnumIterator + AsRef<str> + 'static,
    {
        Self::new(
            short_type_name::<E>(),
            E::iter().map(|member| member.as_ref().to_string()),
        )
    }

    /// Enumeration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members with their values, in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&str, i64)> {
        self.members
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Look up a member as a reason.
    pub fn get(&self, name: &str) -> Option<Reason> {
        self.members.get(name).map(|value| Reason::Member {
            enumeration: self.name.clone(),
            name: name.to_string(),
            value: *value,
        })
    }

    fn contains(&self, reason: &Reason) -> bool {
        matches!(reason, Reason::Member { name, .. } if self.members.contains_key(name))
    }
}

impl fmt::Display for Enumeration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .members
            .iter()
            .map(|(name, value)| format!("<{}.{name}: {value}>", self.name))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

/// The failure vocabulary declared by a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Failures {
    /// Flat list of tokens.
    Tokens(Vec<String>),
    /// Enumerated members.
    Enumeration(Enumeration),
}

impl Failures {
    /// Declare a flat token list. Repeated tokens are kept once.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.into();
            if !list.contains(&token) {
                list.push(token);
            }
        }
        Self::Tokens(list)
    }

    /// Declare the members of a `strum` enum.
    pub fn enumeration<E>() -> Self
    where
        E: IntoEnumIterator + AsRef<str> + 'static,
    {
        Self::Enumeration(Enumeration::of::<E>())
    }

    /// Whether the reason belongs to this vocabulary.
    pub fn contains(&self, reason: &Reason) -> bool {
        match self {
            Self::Tokens(tokens) => {
                matches!(reason, Reason::Token(token) if tokens.contains(token))
            }
            Self::Enumeration(enumeration) => enumeration.contains(reason),
        }
    }

    /// Compare two reasons with the equality rule of this vocabulary.
    pub fn compare(&self, a: &Reason, b: &Reason) -> bool {
        match self {
            Self::Tokens(_) => matches!((a, b), (Reason::Token(a), Reason::Token(b)) if a == b),
            Self::Enumeration(_) => a.name() == b.name(),
        }
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokens(tokens) => {
                let rendered: Vec<String> = tokens.iter().map(|t| format!("{t:?}")).collect();
                f.write_str(&rendered.join(", "))
            }
            Self::Enumeration(enumeration) => fmt::Display::fmt(enumeration, f),
        }
    }
}

fn representation(failures: Option<&Failures>) -> String {
    failures.map_or_else(|| "None".to_string(), ToString::to_string)
}

/// Combine a story vocabulary with the vocabulary of one of its substories.
///
/// "None" is absorbed by the other side. Token lists and enumerations union by
/// value and by member name respectively; the story keeps its own value for a
/// member both sides declare.
pub fn combine(
    story: &str,
    failures: Option<Failures>,
    substory: &str,
    other: Option<&Failures>,
) -> Result<Option<Failures>, FailureProtocolError> {
    match (failures, other) {
        (None, other) => Ok(other.cloned()),
        (failures, None) => Ok(failures),
        (Some(Failures::Tokens(mut tokens)), Some(Failures::Tokens(others))) => {
            for token in others {
                if !tokens.contains(token) {
                    tokens.push(token.clone());
                }
            }
            Ok(Some(Failures::Tokens(tokens)))
        }
        (Some(Failures::Enumeration(mut enumeration)), Some(Failures::Enumeration(others))) => {
            let mut next = enumeration.members.values().copied().max().unwrap_or(0) + 1;
            for (name, value) in &others.members {
                match enumeration.members.get(name) {
                    Some(existing) => {
                        if existing != value {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(
                                story,
                                substory,
                                member = %name,
                                kept = existing,
                                dropped = value,
                                "failures.member_conflict"
                            );
                        }
                    }
                    None => {
                        enumeration.members.insert(name.clone(), next);
                        next += 1;
                    }
                }
            }
            Ok(Some(Failures::Enumeration(enumeration)))
        }
        (Some(failures), Some(other)) => Err(FailureProtocolError::IncompatibleTypes {
            story: story.to_string(),
            available: representation(Some(&failures)),
            substory: substory.to_string(),
            other_available: representation(Some(other)),
        }),
    }
}

// ============================================================================
// Protocols
// ============================================================================

/// Protocol checked whenever a step returns `Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecProtocol {
    /// No vocabulary: only `Failure()` without reason is legal.
    Null,
    /// No vocabulary in a composition that has one: no failure form is legal
    /// without a reason, and reasons stay illegal.
    DisabledNull,
    /// A declared vocabulary: the reason is required and must belong to it.
    Declared(Failures),
}

impl ExecProtocol {
    /// Protocol for a story's own declared vocabulary.
    pub fn new(failures: Option<&Failures>) -> Self {
        failures.map_or(Self::Null, |failures| Self::Declared(failures.clone()))
    }

    /// Check the reason a step failed with.
    pub fn check_return(&self, step: &str, reason: Option<&Reason>) -> Result<(), FailureProtocolError> {
        match (self, reason) {
            (Self::Null, None) => Ok(()),
            (Self::Null | Self::DisabledNull, Some(reason)) => {
                Err(FailureProtocolError::UnexpectedReason {
                    reason: reason.to_string(),
                    step: step.to_string(),
                })
            }
            (Self::DisabledNull, None) => Err(FailureProtocolError::DisabledNullProtocol {
                step: step.to_string(),
            }),
            (Self::Declared(failures), None) => Err(FailureProtocolError::MissingReason {
                available: failures.to_string(),
                step: step.to_string(),
            }),
            (Self::Declared(failures), Some(reason)) => {
                if failures.contains(reason) {
                    Ok(())
                } else {
                    Err(FailureProtocolError::ReasonNotAllowed {
                        reason: reason.to_string(),
                        available: failures.to_string(),
                        step: step.to_string(),
                    })
                }
            }
        }
    }

    /// Turn a null protocol into a disabled one; declared protocols are unchanged.
    pub(crate) fn disable_null(self) -> Self {
        match self {
            Self::Null => Self::DisabledNull,
            other => other,
        }
    }
}

/// Protocol used by a summary to answer `failed_because`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProtocol {
    story: String,
    failures: Option<Failures>,
}

impl RunProtocol {
    /// Build the protocol of a composed story.
    pub fn new(story: impl Into<String>, failures: Option<Failures>) -> Self {
        Self {
            story: story.into(),
            failures,
        }
    }

    /// Check that a `failed_because` argument belongs to the vocabulary.
    pub fn check_argument(&self, reason: &Reason) -> Result<(), FailureProtocolError> {
        match &self.failures {
            None => Err(FailureProtocolError::SummaryWithoutProtocol {
                story: self.story.clone(),
            }),
            Some(failures) if failures.contains(reason) => Ok(()),
            Some(failures) => Err(FailureProtocolError::SummaryReasonMismatch {
                reason: reason.to_string(),
                available: failures.to_string(),
                story: self.story.clone(),
            }),
        }
    }

    /// Compare an argument with the reason the story failed with.
    pub fn compare(&self, argument: &Reason, reason: Option<&Reason>) -> bool {
        match (&self.failures, reason) {
            (Some(failures), Some(reason)) => failures.compare(argument, reason),
            _ => false,
        }
    }
}
