//! Purchase story showing the happy path, a business failure and a trace.
//!
//! Run with: cargo run --example place_order

use std::collections::HashMap;
use std::sync::Arc;

use fabula::{
    storied, Context, Failures, Kind, Mounted, Outcome, Recorder, Schema, Settings,
    Spec, StepResult, Story, StoryError,
};
use serde_json::json;

// ============================================================================
// Repositories
// ============================================================================

struct Shop {
    prices: HashMap<i64, f64>,
    balances: HashMap<i64, f64>,
}

impl Shop {
    fn new() -> Self {
        Self {
            prices: HashMap::from([(1, 12.5), (2, 250.0)]),
            balances: HashMap::from([(1, 100.0), (2, 5.0)]),
        }
    }
}

// ============================================================================
// Payment story
// ============================================================================

struct Payments;

impl Payments {
    fn pay() -> Result<Story, StoryError> {
        Story::define("Payments", "pay")
            .arguments(["customer_id", "total"])
            .parallel(["authorize", "fraud_check"])
            .step("capture")
            .failures(Failures::tokens(["declined"]))
            .build()
    }

    fn authorize(&self, ctx: &Context) -> StepResult {
        let customer: i64 = ctx.get_as("customer_id")?;
        Ok(Outcome::assign([("authorization", format!("AUTH-{customer}"))]))
    }

    fn fraud_check(&self, ctx: &Context) -> StepResult {
        let total: f64 = ctx.get_as("total")?;
        if total > 1000.0 {
            return Ok(Outcome::fail("declined"));
        }
        Ok(Outcome::success())
    }

    fn capture(&self, ctx: &Context) -> StepResult {
        let authorization: String = ctx.get_as("authorization")?;
        Ok(Outcome::result(json!({ "payment": authorization })))
    }
}

storied! {
    Payments {
        steps: [authorize, fraud_check, capture],
    }
}

// ============================================================================
// Purchase story
// ============================================================================

struct Purchase {
    shop: Shop,
    pay: Mounted,
}

impl Purchase {
    fn make() -> Result<Story, StoryError> {
        Story::define("Purchase", "make")
            .arguments(["order_id", "customer_id"])
            .steps(["find_order", "find_customer", "check_balance", "pay"])
            .failures(Failures::tokens(["low_balance", "unknown_order"]))
            .build()
    }

    fn find_order(&self, ctx: &Context) -> StepResult {
        let order: i64 = ctx.get_as("order_id")?;
        match self.shop.prices.get(&order) {
            Some(total) => Ok(Outcome::assign([("total", *total)])),
            None => Ok(Outcome::fail("unknown_order")),
        }
    }

    fn find_customer(&self, ctx: &Context) -> StepResult {
        let customer: i64 = ctx.get_as("customer_id")?;
        let balance = self.shop.balances.get(&customer).copied().unwrap_or_default();
        Ok(Outcome::assign([("balance", balance)]))
    }

    fn check_balance(&self, ctx: &Context) -> StepResult {
        let total: f64 = ctx.get_as("total")?;
        let balance: f64 = ctx.get_as("balance")?;
        if balance < total {
            return Ok(Outcome::fail("low_balance"));
        }
        Ok(Outcome::success())
    }
}

storied! {
    Purchase {
        steps: [find_order, find_customer, check_balance],
        injected: [pay],
    }
}

fn contract() -> Arc<dyn Spec> {
    Arc::new(
        Schema::new("PurchaseContract")
            .field("order_id", Kind::Integer)
            .field("customer_id", Kind::Integer)
            .field("total", Kind::Float)
            .field("balance", Kind::Float)
            .field("authorization", Kind::String),
    )
}

fn main() -> Result<(), StoryError> {
    let spec = contract();
    let make = Purchase::make()?.with_contract(Arc::clone(&spec))?;
    let pay = Payments::pay()?.with_contract(spec)?;

    let purchase = Arc::new(Purchase {
        shop: Shop::new(),
        pay: pay.mount(Arc::new(Payments))?,
    });

    let recorder = Arc::new(Recorder::new());
    let make = make
        .mount_with(purchase, Settings::default().with_workers(2))?
        .with_observer(recorder.clone());

    println!("{}\n", make.describe());

    println!("=== Happy path ===");
    let payment = make.call([("order_id", 1), ("customer_id", 1)])?;
    println!("  payment: {payment}\n");

    println!("=== Low balance ===");
    let summary = make.run([("order_id", 2), ("customer_id", 2)])?;
    println!("  failed on check_balance: {}", summary.failed_on("check_balance"));
    println!("  because of low_balance: {}\n", summary.failed_because("low_balance")?);

    println!("=== Unknown order ===");
    match make.call([("order_id", 7), ("customer_id", 1)]) {
        Err(StoryError::Failure(error)) => println!("  {error} raised by {}\n", error.step),
        other => println!("  unexpected: {other:?}\n"),
    }

    println!("=== Traces ===");
    for record in recorder.records() {
        println!("{}\n", record.rendered);
    }
    Ok(())
}
