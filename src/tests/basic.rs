//! Basic invocation tests.
//!
//! Call mode and summary mode of plain stories: results, failures, skips and
//! step errors.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::{Arguments, ContractError, StoryError};

use super::common::{Branch, ExpectedException, Pipe, Raising, Simple, SimpleSubstory, SubstoryDI};

fn simple() -> crate::Mounted {
    Simple::x()
        .and_then(|story| story.mount(Arc::new(Simple)))
        .expect("Simple.x mounts")
}

/// A story returning `Result` gives the value back in both modes.
#[test]
fn result_is_returned() {
    let x = simple();
    assert_eq!(x.call([("foo", 1), ("bar", 3)]).expect("result"), json!(-1));

    let summary = x.run([("foo", 1), ("bar", 3)]).expect("summary");
    assert!(summary.is_success());
    assert!(!summary.is_failure());
    assert_eq!(summary.value().expect("success"), &json!(-1));
    assert_eq!(summary.ctx().get("baz"), Some(&json!(4)));
}

/// A failure raises in call mode and is reported in summary mode.
#[test]
fn failure_raises_in_call_mode() {
    let x = simple();

    match x.call([("foo", 2), ("bar", 2)]) {
        Err(StoryError::Failure(error)) => {
            assert_eq!(error.step, "two");
            assert_eq!(error.reason, None);
            assert_eq!(error.to_string(), "FailureError()");
        }
        other => panic!("Expected FailureError, got {:?}", other),
    }

    let summary = x.run([("foo", 2), ("bar", 2)]).expect("summary");
    assert!(summary.is_failure());
    assert!(summary.failed_on("two"));
    assert!(!summary.failed_on("one"));
    assert!(matches!(summary.value(), Err(StoryError::Summary { ref step }) if step == "two"));
    assert_eq!(summary.to_string(), "Failure()");
}

/// A top-level skip finishes the story without a value.
#[test]
fn skip_finishes_without_value() {
    let x = simple();
    assert_eq!(x.call([("foo", 1), ("bar", -1)]).expect("finished"), Value::Null);

    let summary = x.run([("foo", 1), ("bar", -1)]).expect("summary");
    assert!(summary.is_success());
    assert_eq!(summary.value().expect("success"), &Value::Null);
    assert!(!summary.ctx().contains("baz"));
}

/// Skip at the top level also passes over every nested substory.
#[test]
fn top_level_skip_passes_substories() {
    let y = Pipe::y()
        .and_then(|story| story.mount(Arc::new(Pipe)))
        .expect("Pipe.y mounts");
    assert_eq!(y.call(Arguments::new()).expect("finished"), Value::Null);
}

/// `Result` inside a substory ends the whole story.
#[test]
fn substory_result_ends_story() {
    let y = SimpleSubstory::y()
        .and_then(|story| story.mount(Arc::new(SimpleSubstory)))
        .expect("SimpleSubstory.y mounts");
    assert_eq!(y.call([("spam", 2)]).expect("result"), json!(-1));
    assert_eq!(y.call([("spam", 3)]).ok(), None);

    let summary = y.run([("spam", 3)]).expect("summary");
    assert!(summary.failed_on("two"));
}

/// Skip inside a substory resumes with the next parent step.
#[test]
fn substory_skip_resumes_parent() {
    let y = SimpleSubstory::y()
        .and_then(|story| story.mount(Arc::new(SimpleSubstory)))
        .expect("SimpleSubstory.y mounts");
    assert_eq!(y.call([("spam", -2)]).expect("result"), json!(-4));
}

/// Injected stories behave like inherited ones.
#[test]
fn injected_substory() {
    let x = simple();
    let owner = Arc::new(SubstoryDI { x });
    let y = SubstoryDI::y()
        .and_then(|story| story.mount(owner))
        .expect("SubstoryDI.y mounts");

    assert_eq!(y.call([("spam", 2)]).expect("result"), json!(-1));
    assert_eq!(y.call([("spam", -2)]).expect("result"), json!(-4));
    assert!(y.run([("spam", 3)]).expect("summary").failed_on("two"));
}

/// Skip at the start of a nested substory leaves only that substory.
#[test]
fn nested_skip_resumes_at_outer_parent() {
    let z = SimpleSubstory::z()
        .and_then(|story| story.mount(Arc::new(SimpleSubstory)))
        .expect("SimpleSubstory.z mounts");
    let owner = Arc::new(SubstoryDI { x: z });
    let y = SubstoryDI::y()
        .and_then(|story| story.mount(owner))
        .expect("SubstoryDI.y mounts");
    assert_eq!(y.call([("spam", 2)]).expect("result"), json!(4));
}

/// Steps see names set by earlier steps.
#[test]
fn branches_on_context() {
    let show = Branch::show_content()
        .and_then(|story| story.mount(Arc::new(Branch)))
        .expect("Branch.show_content mounts");
    assert_eq!(show.call([("age", 17)]).expect("result"), json!("denied"));
    assert_eq!(show.call([("age", 18)]).expect("result"), json!("allowed"));
}

/// Step errors propagate unchanged in both modes.
#[test]
fn step_error_propagates() {
    let x = Raising::x()
        .and_then(|story| story.mount(Arc::new(Raising)))
        .expect("Raising.x mounts");

    match x.call(Arguments::new()) {
        Err(StoryError::Step(error)) => {
            assert_eq!(error.name(), "ExpectedException");
            assert_eq!(error.downcast_ref::<ExpectedException>(), Some(&ExpectedException));
        }
        other => panic!("Expected StepError, got {:?}", other),
    }
    assert!(matches!(x.run(Arguments::new()), Err(StoryError::Step(_))));
}

/// Names outside the argument set are rejected before any step runs.
#[test]
fn unknown_arguments_rejected() {
    let x = simple();
    match x.call([("foo", 1), ("bar", 2), ("quiz", 3)]) {
        Err(StoryError::Contract(ContractError::UnknownArguments { unknown, .. })) => {
            assert_eq!(unknown, "quiz");
        }
        other => panic!("Expected UnknownArguments, got {:?}", other),
    }
}

/// A missing argument fails the call check of the story itself.
#[test]
fn missing_arguments_rejected() {
    let x = simple();
    match x.call([("foo", 1)]) {
        Err(StoryError::Contract(ContractError::MissingVariables { missed, .. })) => {
            assert_eq!(missed, "bar");
        }
        other => panic!("Expected MissingVariables, got {:?}", other),
    }
}

/// One mounted story serves many invocations without sharing state.
#[test]
fn invocations_are_independent() {
    let x = simple();
    for _ in 0..3 {
        assert_eq!(x.call([("foo", 1), ("bar", 3)]).expect("result"), json!(-1));
    }
    let clone = x.clone();
    assert_eq!(clone.call([("foo", 1), ("bar", 5)]).expect("result"), json!(1));
}
