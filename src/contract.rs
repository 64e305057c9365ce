//! Context contracts: which names may enter the context and how they validate.
//!
//! A contract is built per story from its declared arguments and optional
//! schema. Arguments may be validated by several sources at once, one per story
//! that declares them, and every source has to agree on the normalized value.
//! Variables are the remaining schema fields; steps may only set those.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::context::Context;
use crate::error::ContractError;
use crate::validate::{same_spec, FieldValidator, Spec, Violation};

#[derive(Debug, Clone)]
struct Source {
    validator: Option<FieldValidator>,
    class: String,
    story: String,
}

impl Source {
    fn qualified(&self) -> String {
        format!("{}.{}", self.class, self.story)
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    class: String,
    story: String,
    description: String,
}

/// Contract of one story, combined with the contracts it was composed with.
#[derive(Clone)]
pub struct Contract {
    class: String,
    story: String,
    arguments: Vec<String>,
    spec: Option<Arc<dyn Spec>>,
    argset: BTreeMap<String, Vec<Source>>,
    variables: BTreeMap<String, FieldValidator>,
    declared: BTreeMap<String, Declaration>,
}

impl Contract {
    /// Build the contract of `Class.story`.
    ///
    /// With a schema, every argument has to be one of its fields.
    pub fn new(
        class: &str,
        story: &str,
        arguments: &[String],
        spec: Option<Arc<dyn Spec>>,
    ) -> Result<Self, ContractError> {
        let mut contract = Self {
            class: class.to_string(),
            story: story.to_string(),
            arguments: arguments.to_vec(),
            spec: spec.clone(),
            argset: BTreeMap::new(),
            variables: BTreeMap::new(),
            declared: BTreeMap::new(),
        };

        let Some(spec) = spec else {
            for argument in arguments {
                let source = contract.source(None);
                contract.argset.insert(argument.clone(), vec![source]);
            }
            return Ok(contract);
        };

        let fields = spec.fields();
        let mut undefined: Vec<&str> = arguments
            .iter()
            .filter(|argument| !fields.contains(argument))
            .map(String::as_str)
            .collect();
        if !undefined.is_empty() {
            undefined.sort_unstable();
            return Err(ContractError::UndefinedArguments {
                undefined: undefined.join(", "),
                story: contract.qualified(),
                arguments: arguments.join(", "),
            });
        }

        for field in fields {
            let validator = FieldValidator::new(Arc::clone(&spec), field.as_str());
            if arguments.contains(&field) {
                let source = contract.source(Some(validator));
                contract.argset.insert(field, vec![source]);
            } else {
                contract.declared.insert(
                    field.clone(),
                    Declaration {
                        class: class.to_string(),
                        story: story.to_string(),
                        description: validator.describe(),
                    },
                );
                contract.variables.insert(field, validator);
            }
        }
        Ok(contract)
    }

    fn source(&self, validator: Option<FieldValidator>) -> Source {
        Source {
            validator,
            class: self.class.clone(),
            story: self.story.clone(),
        }
    }

    fn qualified(&self) -> String {
        format!("{}.{}", self.class, self.story)
    }

    /// Whether no schema is attached.
    pub fn is_null(&self) -> bool {
        self.spec.is_none()
    }

    /// Arguments of the story this contract was built for.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Every name the story may be called with, after composition.
    pub fn argument_names(&self) -> impl Iterator<Item = &str> {
        self.argset.keys().map(String::as_str)
    }

    /// Check the arguments of a story call.
    pub fn check_call(
        &self,
        kwargs: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, ContractError> {
        let mut unknown: Vec<&str> = kwargs
            .keys()
            .filter(|name| !self.argset.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(ContractError::UnknownArguments {
                unknown: unknown.join(", "),
                story: self.qualified(),
                contract: self.to_string(),
            });
        }
        if self.is_null() {
            return Ok(kwargs);
        }

        let (result, errors) = self.validate(&kwargs)?;
        if !errors.is_empty() {
            return Err(ContractError::InvalidArguments {
                variables: quoted(errors.keys()),
                story: self.qualified(),
                violations: format_violations(&kwargs, &errors),
                contract: self.format_fields(errors.keys().map(String::as_str)),
            });
        }
        Ok(result)
    }

    /// Check that the story's own arguments are in the context before it starts.
    pub fn check_substory_call(&self, ctx: &Context) -> Result<(), ContractError> {
        let mut missed: Vec<&str> = self
            .arguments
            .iter()
            .filter(|argument| !ctx.contains(argument))
            .map(String::as_str)
            .collect();
        if missed.is_empty() {
            return Ok(());
        }
        missed.sort_unstable();
        Err(ContractError::MissingVariables {
            missed: missed.join(", "),
            story: self.qualified(),
            arguments: self.arguments.join(", "),
            context: ctx.to_string(),
        })
    }

    /// Check the names a step returned in its `Success`.
    pub fn check_output(
        &self,
        step: &str,
        ctx: &Context,
        kwargs: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, ContractError> {
        if let Some(variable) = kwargs.keys().find(|name| ctx.contains(name)) {
            return Err(ContractError::VariableOverride {
                variable: variable.clone(),
                step: step.to_string(),
                context: ctx.to_string(),
            });
        }
        if self.is_null() {
            return Ok(kwargs);
        }

        if let Some(variable) = kwargs
            .keys()
            .find(|name| !self.variables.contains_key(*name) && !self.argset.contains_key(*name))
        {
            return Err(ContractError::UnknownVariable {
                variable: variable.clone(),
                step: step.to_string(),
                contract: self.to_string(),
            });
        }

        let (result, errors) = self.validate(&kwargs)?;
        if !errors.is_empty() {
            return Err(ContractError::InvalidVariable {
                variables: quoted(errors.keys()),
                step: step.to_string(),
                violations: format_violations(&kwargs, &errors),
                contract: self.format_fields(errors.keys().map(String::as_str)),
            });
        }
        Ok(result)
    }

    /// Run every validator registered for each name.
    fn validate(
        &self,
        kwargs: &IndexMap<String, Value>,
    ) -> Result<(IndexMap<String, Value>, BTreeMap<String, Violation>), ContractError> {
        let mut result = IndexMap::new();
        let mut errors = BTreeMap::new();
        let mut conflict: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

        for (name, value) in kwargs {
            let mut validators: Vec<(String, &FieldValidator)> = Vec::new();
            if let (Some(validator), Some(declaration)) =
                (self.variables.get(name), self.declared.get(name))
            {
                let owner = format!("{}.{}", declaration.class, declaration.story);
                validators.push((owner, validator));
            }
            for source in self.argset.get(name).into_iter().flatten() {
                if let Some(validator) = &source.validator {
                    validators.push((source.qualified(), validator));
                }
            }

            let mut normalized: Vec<(Value, String)> = Vec::new();
            let mut failed = false;
            for (owner, validator) in validators {
                match validator.validate(value) {
                    Ok(new_value) => normalized.push((new_value, owner)),
                    Err(violation) => {
                        failed = true;
                        errors.entry(name.clone()).or_insert(violation);
                    }
                }
            }
            if let Some(((first, first_source), others)) = normalized.split_first() {
                for (other, other_source) in others {
                    if first != other {
                        conflict
                            .entry(first_source.clone())
                            .or_default()
                            .insert(name.clone(), first.clone());
                        conflict
                            .entry(other_source.clone())
                            .or_default()
                            .insert(name.clone(), other.clone());
                    }
                }
            }
            if !failed {
                let new_value = normalized
                    .into_iter()
                    .next()
                    .map_or_else(|| value.clone(), |(new_value, _)| new_value);
                result.insert(name.clone(), new_value);
            }
        }

        if !conflict.is_empty() {
            let mut names: Vec<&str> = conflict
                .values()
                .flat_map(|values| values.keys().map(String::as_str))
                .collect();
            names.sort_unstable();
            names.dedup();
            let results: Vec<String> = conflict
                .iter()
                .map(|(story, values)| {
                    let lines: Vec<String> = values
                        .iter()
                        .map(|(name, value)| format!(" - {name}: {value}"))
                        .collect();
                    format!("{story}:\n{}", lines.join("\n"))
                })
                .collect();
            return Err(ContractError::NormalizationConflict {
                conflict: quoted(names.iter()),
                results: results.join("\n\n"),
                contract: self.format_fields(names.iter().copied()),
            });
        }

        Ok((result, errors))
    }

    fn family_name(&self) -> String {
        self.spec
            .as_ref()
            .map_or_else(|| "None".to_string(), |spec| spec.family().to_string())
    }

    /// Render the fields named in `names` that this contract knows about.
    fn format_fields<'a>(&self, names: impl Iterator<Item = &'a str>) -> String {
        let mut names: Vec<&str> = names.collect();
        names.sort_unstable();
        names.dedup();

        if self.is_null() {
            if self.argset.is_empty() {
                return "Contract()".to_string();
            }
            let mut lines = vec!["Contract:".to_string()];
            for name in &names {
                for source in self.argset.get(*name).into_iter().flatten() {
                    lines.push(format!("  {name}  # Argument of {}", source.qualified()));
                }
            }
            return lines.join("\n");
        }

        let mut lines = vec!["Contract:".to_string()];
        for name in &names {
            let Some(sources) = self.argset.get(*name) else {
                continue;
            };
            let describe = |source: &Source| {
                source
                    .validator
                    .as_ref()
                    .map(FieldValidator::describe)
                    .unwrap_or_default()
            };
            match sources.as_slice() {
                [source] => lines.push(format!(
                    "  {name}: {}  # Argument of {}",
                    describe(source),
                    source.qualified()
                )),
                _ => {
                    lines.push(format!("  {name}:"));
                    let mut sorted: Vec<&Source> = sources.iter().collect();
                    sorted.sort_by_key(|source| (source.class.clone(), source.story.clone()));
                    for source in sorted {
                        lines.push(format!(
                            "    {}  # Argument of {}",
                            describe(source),
                            source.qualified()
                        ));
                    }
                }
            }
        }
        for name in &names {
            if let Some(declaration) = self.declared.get(*name) {
                lines.push(format!(
                    "  {name}: {}  # Variable in {}.{}",
                    declaration.description, declaration.class, declaration.story
                ));
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .argset
            .keys()
            .chain(self.declared.keys())
            .map(String::as_str);
        f.write_str(&self.format_fields(names))
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("story", &self.qualified())
            .field("family", &self.family_name())
            .field("arguments", &self.argset.keys().collect::<Vec<_>>())
            .field("variables", &self.declared.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn quoted<'a, I, S>(names: I) -> String
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + ?Sized + 'a,
{
    names
        .into_iter()
        .map(|name| format!("{:?}", name.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_violations(kwargs: &IndexMap<String, Value>, errors: &BTreeMap<String, Violation>) -> String {
    errors
        .iter()
        .map(|(name, violation)| {
            let mut lines = vec![format!("{name}:")];
            if let Some(value) = kwargs.get(name) {
                lines.push(format!("  {value}"));
            }
            lines.extend(violation.0.iter().map(|message| format!("  {message}")));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Composition
// ============================================================================

/// Union the argument sources of two contracts, in both directions.
fn combine_argsets(parent: &mut Contract, child: &mut Contract) {
    merge_sources(&mut parent.argset, &child.argset);
    merge_sources(&mut child.argset, &parent.argset);
}

fn merge_sources(into: &mut BTreeMap<String, Vec<Source>>, from: &BTreeMap<String, Vec<Source>>) {
    for (name, sources) in from {
        let entry = into.entry(name.clone()).or_default();
        for source in sources {
            let known = entry
                .iter()
                .any(|other| other.class == source.class && other.story == source.story);
            if !known {
                entry.push(source.clone());
            }
        }
    }
}

enum Kinship {
    Null,
    Shared,
    Family,
    Incompatible,
}

/// Combine a substory contract into the contract of the story that uses it.
///
/// Contracts without schema combine only with each other. Contracts sharing
/// one schema object combine their arguments. Contracts of the same family
/// combine when no variable is declared by both.
pub fn combine(parent: &mut Contract, child: &mut Contract) -> Result<(), ContractError> {
    let kinship = match (&parent.spec, &child.spec) {
        (None, None) => Kinship::Null,
        (Some(a), Some(b)) if same_spec(a, b) => Kinship::Shared,
        (Some(a), Some(b)) if a.family() == b.family() => Kinship::Family,
        _ => Kinship::Incompatible,
    };
    match kinship {
        Kinship::Null | Kinship::Shared => {
            combine_argsets(parent, child);
            Ok(())
        }
        Kinship::Family => {
            let repeated: Vec<&String> = parent
                .declared
                .keys()
                .filter(|name| child.declared.contains_key(*name))
                .collect();
            if let Some(first) = repeated.first() {
                let ours = &parent.declared[*first];
                let theirs = &child.declared[*first];
                return Err(ContractError::RepeatedVariables {
                    repeated: quoted(repeated.iter().copied()),
                    story: format!("{}.{}", ours.class, ours.story),
                    substory: format!("{}.{}", theirs.class, theirs.story),
                });
            }
            combine_argsets(parent, child);
            let declared = child.declared.clone();
            parent.declared.extend(declared);
            Ok(())
        }
        Kinship::Incompatible => Err(ContractError::IncompatibleTypes {
            story: parent.qualified(),
            contract: parent.family_name(),
            substory: child.qualified(),
            other_contract: child.family_name(),
        }),
    }
}

/// Share the full argument set of the root contract with every contract of a
/// composition, so caller arguments validate against every declaring story.
///
/// Compositions without schema are left unchanged.
pub fn sync_arguments(contracts: &mut [Contract]) {
    let Some((root, rest)) = contracts.split_first_mut() else {
        return;
    };
    if root.is_null() {
        return;
    }
    for contract in rest.iter() {
        merge_sources(&mut root.argset, &contract.argset);
    }
    for contract in rest.iter_mut() {
        merge_sources(&mut contract.argset, &root.argset);
    }
}
