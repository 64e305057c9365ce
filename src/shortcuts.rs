//! Attach one contract or one failure vocabulary to several stories at once.

use std::sync::Arc;

use crate::error::StoryError;
use crate::failures::Failures;
use crate::story::Story;
use crate::validate::Spec;

/// Attach `spec` to every story.
///
/// Fails on the first story whose arguments the schema does not declare.
pub fn contract_in<I>(spec: Arc<dyn Spec>, stories: I) -> Result<Vec<Story>, StoryError>
where
    I: IntoIterator<Item = Story>,
{
    stories
        .into_iter()
        .map(|story| story.with_contract(Arc::clone(&spec)))
        .collect()
}

/// Attach `failures` to every story.
pub fn failures_in<I>(failures: Failures, stories: I) -> Vec<Story>
where
    I: IntoIterator<Item = Story>,
{
    stories
        .into_iter()
        .map(|story| story.with_failures(failures.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContractError;
    use crate::validate::{Kind, Schema};

    fn story(name: &str) -> Story {
        Story::define("T", name)
            .arguments(["foo"])
            .step("one")
            .build()
            .expect("valid story")
    }

    #[test]
    fn contract_in_every_story() {
        let spec: Arc<dyn Spec> = Arc::new(Schema::new("Contract").field("foo", Kind::Integer));
        let stories = contract_in(Arc::clone(&spec), [story("x"), story("y")]).expect("declared");
        assert_eq!(stories.len(), 2);
        assert!(stories.iter().all(|story| story.spec().is_some()));
    }

    #[test]
    fn contract_in_rejects_undeclared_argument() {
        let spec: Arc<dyn Spec> = Arc::new(Schema::new("Contract").field("bar", Kind::Integer));
        match contract_in(spec, [story("x")]) {
            Err(StoryError::Contract(ContractError::UndefinedArguments { .. })) => {}
            other => panic!("Expected UndefinedArguments, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn failures_in_every_story() {
        let stories = failures_in(Failures::tokens(["foo"]), [story("x"), story("y")]);
        assert!(stories
            .iter()
            .all(|story| story.failures() == Some(&Failures::tokens(["foo"]))));
    }
}
