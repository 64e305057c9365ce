//! Fan-out tests.
//!
//! Parallel groups on the rayon pool and on the async driver, and how their
//! outcomes are merged.

use std::sync::Arc;

use serde_json::json;

use crate::{
    storied, Context, ContractError, Outcome, Settings, StepResult, Story, StoryError,
};

struct Fan;

impl Fan {
    fn story(name: &str, group: &[&str]) -> Result<Story, StoryError> {
        Story::define("Fan", name)
            .argument("n")
            .parallel(group.iter().copied())
            .step("sum")
            .build()
    }

    fn merged() -> Result<Story, StoryError> {
        Self::story("merged", &["double", "square"])
    }

    fn refused() -> Result<Story, StoryError> {
        Self::story("refused", &["double", "refuse"])
    }

    fn answered() -> Result<Story, StoryError> {
        Self::story("answered", &["double", "answer"])
    }

    fn clashing() -> Result<Story, StoryError> {
        Self::story("clashing", &["double", "double_again"])
    }

    fn pooled() -> Result<Story, StoryError> {
        Self::story("pooled", &["double", "square", "locate"])
    }

    fn double(&self, ctx: &Context) -> StepResult {
        let n: i64 = ctx.get_as("n")?;
        Ok(Outcome::assign([("d", n * 2)]))
    }

    fn double_again(&self, ctx: &Context) -> StepResult {
        self.double(ctx)
    }

    fn square(&self, ctx: &Context) -> StepResult {
        let n: i64 = ctx.get_as("n")?;
        Ok(Outcome::assign([("s", n * n)]))
    }

    fn refuse(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::failure())
    }

    fn answer(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::result(42))
    }

    fn locate(&self, _ctx: &Context) -> StepResult {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        Ok(Outcome::assign([("worker", name)]))
    }

    fn sum(&self, ctx: &Context) -> StepResult {
        let d: i64 = ctx.get_as("d")?;
        let s: i64 = ctx.get_as("s")?;
        Ok(Outcome::result(d + s))
    }
}

storied! {
    Fan {
        steps: [double, double_again, square, refuse, answer, locate, sum],
    }
}

fn mount(story: Result<Story, StoryError>) -> crate::Mounted {
    story
        .and_then(|story| story.mount(Arc::new(Fan)))
        .expect("Fan story mounts")
}

/// Successful branches are committed in declaration order.
#[test]
fn successes_are_merged() {
    let merged = mount(Fan::merged());
    let summary = merged.run([("n", 3)]).expect("summary");
    assert_eq!(summary.value().expect("success"), &json!(15));

    let names: Vec<&str> = summary.ctx().names().collect();
    assert_eq!(names, ["n", "d", "s"]);
    assert_eq!(
        summary.ctx().history().to_string(),
        "Fan.merged\n  parallel(double, square)\n  sum (returned: 15)"
    );
}

/// Any failing branch fails the story.
#[test]
fn failure_wins() {
    let refused = mount(Fan::refused());
    let summary = refused.run([("n", 3)]).expect("summary");
    assert!(summary.failed_on("refuse"));
    assert!(!summary.ctx().contains("d"));
}

/// Mixed outcomes end the story with the list of outcomes.
#[test]
fn mixed_outcomes_are_returned() {
    let answered = mount(Fan::answered());
    assert_eq!(
        answered.call([("n", 1)]).expect("result"),
        json!([
            {"outcome": "Success", "value": {"d": 2}},
            {"outcome": "Result", "value": 42}
        ])
    );
}

/// Branches setting the same name clash on commit.
#[test]
fn branches_can_not_share_names() {
    let clashing = mount(Fan::clashing());
    match clashing.call([("n", 1)]) {
        Err(StoryError::Contract(ContractError::VariableOverride { variable, step, .. })) => {
            assert_eq!(variable, "d");
            assert_eq!(step, "Fan.double_again");
        }
        other => panic!("Expected VariableOverride, got {:?}", other),
    }
}

/// A dedicated pool runs the branches on its own named threads.
#[test]
fn dedicated_pool() {
    let pooled = Fan::pooled()
        .and_then(|story| story.mount_with(Arc::new(Fan), Settings::default().with_workers(2)))
        .expect("Fan.pooled mounts");
    let summary = pooled.run([("n", 2)]).expect("summary");
    assert_eq!(summary.value().expect("success"), &json!(8));

    let worker: String = summary.ctx().get_as("worker").expect("worker set");
    assert!(worker.starts_with("Fan.pooled-"), "unexpected thread {worker}");
}

struct AsyncFan;

impl AsyncFan {
    fn x() -> Result<Story, StoryError> {
        Story::define("AsyncFan", "x")
            .argument("n")
            .parallel(["slow", "fast"])
            .step("total")
            .build()
    }

    async fn slow(&self, ctx: &Context) -> StepResult {
        let n: i64 = ctx.get_as("n")?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(Outcome::assign([("slow", n + 1)]))
    }

    async fn fast(&self, ctx: &Context) -> StepResult {
        let n: i64 = ctx.get_as("n")?;
        Ok(Outcome::assign([("fast", n + 2)]))
    }

    async fn total(&self, ctx: &Context) -> StepResult {
        let slow: i64 = ctx.get_as("slow")?;
        let fast: i64 = ctx.get_as("fast")?;
        Ok(Outcome::result(slow + fast))
    }
}

storied! {
    AsyncFan {
        coroutines: [slow, fast, total],
        stories: [x],
    }
}

/// Coroutine branches are polled together and merged in declaration order.
#[tokio::test]
async fn coroutine_branches() {
    let x = AsyncFan::x()
        .and_then(|story| story.mount(Arc::new(AsyncFan)))
        .expect("AsyncFan.x mounts");
    let summary = x.run_async([("n", 1)]).await.expect("summary");
    assert_eq!(summary.value().expect("success"), &json!(5));

    let names: Vec<&str> = summary.ctx().names().collect();
    assert_eq!(names, ["n", "slow", "fast"]);
}
