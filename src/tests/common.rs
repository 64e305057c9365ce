//! Common owners and story definitions for tests.
//!
//! This module contains:
//! - `Simple`: three steps reading `foo` and `bar`, failing, skipping or
//!   returning depending on them
//! - `SimpleSubstory`, `SubstoryDI`: the same story used as a substory, by
//!   inheritance-like sharing and by injection
//! - `Pipe`, `Branch`, `Raising`: skip at the top level, presence checks and
//!   step errors
//! - Contract and failure protocol owners

use std::sync::Arc;

use crate::{
    storied, Context, Failures, Kind, Mounted, Outcome, Schema, Spec, StepResult, Story,
    StoryError,
};

// ============================================================================
// Shared Steps
// ============================================================================

/// Steps of `Simple.x`, shared by every owner running it.
pub trait SimpleSteps {
    fn one(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::success())
    }

    fn two(&self, ctx: &Context) -> StepResult {
        let foo: i64 = ctx.get_as("foo")?;
        let bar: i64 = ctx.get_as("bar")?;
        if foo > 1 {
            return Ok(Outcome::failure());
        }
        if bar < 0 {
            return Ok(Outcome::skip());
        }
        Ok(Outcome::assign([("baz", 4)]))
    }

    fn three(&self, ctx: &Context) -> StepResult {
        let bar: i64 = ctx.get_as("bar")?;
        let baz: i64 = ctx.get_as("baz")?;
        Ok(Outcome::result(bar - baz))
    }
}

/// Steps of the parent stories wrapping `x`.
pub trait ParentSteps {
    fn start(&self, ctx: &Context) -> StepResult {
        let spam: i64 = ctx.get_as("spam")?;
        Ok(Outcome::assign([("foo", spam - 1)]))
    }

    fn before(&self, ctx: &Context) -> StepResult {
        let spam: i64 = ctx.get_as("spam")?;
        Ok(Outcome::assign([("bar", spam + 1)]))
    }

    fn after(&self, ctx: &Context) -> StepResult {
        let spam: i64 = ctx.get_as("spam")?;
        Ok(Outcome::result(spam * 2))
    }
}

pub fn simple_x(class: &str) -> Result<Story, StoryError> {
    Story::define(class, "x")
        .arguments(["foo", "bar"])
        .steps(["one", "two", "three"])
        .build()
}

pub fn parent_y(class: &str) -> Result<Story, StoryError> {
    Story::define(class, "y")
        .argument("spam")
        .steps(["start", "before", "x", "after"])
        .build()
}

// ============================================================================
// Simple Stories
// ============================================================================

pub struct Simple;

impl Simple {
    pub fn x() -> Result<Story, StoryError> {
        simple_x("Simple")
    }
}

impl SimpleSteps for Simple {}

storied! {
    Simple {
        steps: [one, two, three],
        stories: [x],
    }
}

pub struct SimpleSubstory;

impl SimpleSubstory {
    pub fn x() -> Result<Story, StoryError> {
        simple_x("SimpleSubstory")
    }

    pub fn y() -> Result<Story, StoryError> {
        parent_y("SimpleSubstory")
    }

    pub fn z() -> Result<Story, StoryError> {
        Story::define("SimpleSubstory", "z")
            .arguments(["foo", "bar"])
            .steps(["first", "x"])
            .build()
    }

    fn first(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::skip())
    }
}

impl SimpleSteps for SimpleSubstory {}
impl ParentSteps for SimpleSubstory {}

storied! {
    SimpleSubstory {
        steps: [one, two, three, start, before, after, first],
        stories: [x, y, z],
    }
}

/// Runs an injected story as `x`.
pub struct SubstoryDI {
    pub x: Mounted,
}

impl SubstoryDI {
    pub fn y() -> Result<Story, StoryError> {
        parent_y("SubstoryDI")
    }
}

impl ParentSteps for SubstoryDI {}

storied! {
    SubstoryDI {
        steps: [start, before, after],
        stories: [y],
        injected: [x],
    }
}

pub struct Pipe;

impl Pipe {
    pub fn x() -> Result<Story, StoryError> {
        Story::define("Pipe", "x").steps(["one", "two", "three"]).build()
    }

    pub fn y() -> Result<Story, StoryError> {
        Story::define("Pipe", "y").steps(["before", "x", "after"]).build()
    }

    fn one(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::success())
    }

    fn two(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::success())
    }

    fn three(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::success())
    }

    fn before(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::skip())
    }

    fn after(&self, _ctx: &Context) -> StepResult {
        Err(crate::StepError::msg("after must not run"))
    }
}

storied! {
    Pipe {
        steps: [one, two, three, before, after],
        stories: [x, y],
    }
}

pub struct Branch;

impl Branch {
    pub fn show_content() -> Result<Story, StoryError> {
        Story::define("Branch", "show_content")
            .argument("age")
            .steps(["age_lt_18", "age_gte_18", "load_content"])
            .build()
    }

    fn age_lt_18(&self, ctx: &Context) -> StepResult {
        let age: i64 = ctx.get_as("age")?;
        if age < 18 {
            return Ok(Outcome::assign([("access_allowed", false)]));
        }
        Ok(Outcome::success())
    }

    fn age_gte_18(&self, ctx: &Context) -> StepResult {
        let age: i64 = ctx.get_as("age")?;
        if !ctx.contains("access_allowed") && age >= 18 {
            return Ok(Outcome::assign([("access_allowed", true)]));
        }
        Ok(Outcome::success())
    }

    fn load_content(&self, ctx: &Context) -> StepResult {
        if ctx.get_as::<bool>("access_allowed")? {
            Ok(Outcome::result("allowed"))
        } else {
            Ok(Outcome::result("denied"))
        }
    }
}

storied! {
    Branch {
        steps: [age_lt_18, age_gte_18, load_content],
        stories: [show_content],
    }
}

/// Error raised by `Raising.one`.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("expected")]
pub struct ExpectedException;

pub struct Raising;

impl Raising {
    pub fn x() -> Result<Story, StoryError> {
        Story::define("Raising", "x").step("one").build()
    }

    fn one(&self, _ctx: &Context) -> StepResult {
        Err(ExpectedException.into())
    }
}

storied! {
    Raising {
        steps: [one],
        stories: [x],
    }
}

// ============================================================================
// Contracts
// ============================================================================

pub fn order_schema() -> Arc<dyn Spec> {
    Arc::new(
        Schema::new("Order")
            .field("order_id", Kind::Integer)
            .field("quantity", Kind::Integer)
            .field("total", Kind::Float)
            .field("tags", Kind::List(Box::new(Kind::String))),
    )
}

/// Owner whose steps set names of the order schema, correctly or not.
pub struct Orders {
    pub schema: Arc<dyn Spec>,
}

impl Orders {
    fn story(&self, name: &str, steps: &[&str]) -> Result<Story, StoryError> {
        Story::define("Orders", name)
            .argument("order_id")
            .steps(steps.iter().copied())
            .contract(Arc::clone(&self.schema))
            .build()
    }

    pub fn place(&self) -> Result<Story, StoryError> {
        self.story("place", &["count", "price"])
    }

    pub fn overwrite(&self) -> Result<Story, StoryError> {
        self.story("overwrite", &["reassign"])
    }

    pub fn unknown(&self) -> Result<Story, StoryError> {
        self.story("unknown", &["undeclared"])
    }

    pub fn invalid(&self) -> Result<Story, StoryError> {
        self.story("invalid", &["malformed"])
    }

    fn count(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("quantity", "3")]))
    }

    fn price(&self, ctx: &Context) -> StepResult {
        let quantity: i64 = ctx.get_as("quantity")?;
        Ok(Outcome::assign([("total", quantity as f64 * 2.5)]))
    }

    fn reassign(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("order_id", 2)]))
    }

    fn undeclared(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("discount", 10)]))
    }

    fn malformed(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("quantity", "many")]))
    }
}

storied! {
    Orders {
        steps: [count, price, reassign, undeclared, malformed],
    }
}

/// Parent and child stories with their own schemas of one family.
pub struct Checkout;

impl Checkout {
    pub fn parent_schema() -> Arc<dyn Spec> {
        Arc::new(
            Schema::new("Parent")
                .field("user_id", Kind::Integer)
                .field("total", Kind::Float),
        )
    }

    pub fn child_schema(repeat: bool) -> Arc<dyn Spec> {
        let schema = Schema::new("Child").field("user_id", Kind::Integer);
        if repeat {
            Arc::new(schema.field("total", Kind::Float))
        } else {
            Arc::new(schema.field("receipt", Kind::String))
        }
    }

    pub fn pay(repeat: bool) -> Result<Story, StoryError> {
        Story::define("Checkout", "pay")
            .argument("user_id")
            .step("charge")
            .contract(Self::child_schema(repeat))
            .build()
    }

    pub fn checkout() -> Result<Story, StoryError> {
        Story::define("Checkout", "checkout")
            .argument("user_id")
            .steps(["sum", "pay"])
            .contract(Self::parent_schema())
            .build()
    }

    pub fn mount(repeat: bool) -> Result<Mounted, StoryError> {
        Self::checkout()?.mount(Arc::new(CheckoutOwner { repeat }))
    }
}

pub struct CheckoutOwner {
    pub repeat: bool,
}

impl CheckoutOwner {
    fn pay(&self) -> Result<Story, StoryError> {
        Checkout::pay(self.repeat)
    }

    fn sum(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("total", 7.5)]))
    }

    fn charge(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::assign([("receipt", "R-1")]))
    }
}

impl crate::Storied for CheckoutOwner {
    fn class_name(&self) -> &str {
        "Checkout"
    }

    fn member(self: Arc<Self>, name: &str) -> Option<crate::Member> {
        match name {
            "sum" => {
                let this = Arc::clone(&self);
                Some(crate::Member::step(name, move |ctx: &Context| this.sum(ctx)))
            }
            "charge" => {
                let this = Arc::clone(&self);
                Some(crate::Member::step(name, move |ctx: &Context| this.charge(ctx)))
            }
            "pay" => Some(crate::Member::story(self.pay(), Arc::clone(&self))),
            _ => None,
        }
    }
}

// ============================================================================
// Failure Protocols
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumIter, strum::AsRefStr)]
#[allow(non_camel_case_types)]
pub enum Errors {
    foo,
    bar,
}

/// Owner whose single step fails with the reason it was built with.
pub struct Refusing {
    pub reason: Option<crate::Reason>,
}

impl Refusing {
    pub fn x(failures: Option<Failures>) -> Result<Story, StoryError> {
        let story = Story::define("Refusing", "x").step("one").build()?;
        Ok(match failures {
            Some(failures) => story.with_failures(failures),
            None => story,
        })
    }

    fn one(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::Failure(self.reason.clone()))
    }
}

storied! {
    Refusing {
        steps: [one],
    }
}

/// Parent wrapping an injected `Refusing.x`.
pub struct Wrapping {
    pub x: Mounted,
}

impl Wrapping {
    pub fn a(failures: Option<Failures>) -> Result<Story, StoryError> {
        let story = Story::define("Wrapping", "a").steps(["before", "x"]).build()?;
        Ok(match failures {
            Some(failures) => story.with_failures(failures),
            None => story,
        })
    }

    fn before(&self, _ctx: &Context) -> StepResult {
        Ok(Outcome::success())
    }
}

storied! {
    Wrapping {
        steps: [before],
        injected: [x],
    }
}
