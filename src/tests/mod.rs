//! Scenario tests for mounted stories.
//!
//! ## Test Organization
//!
//! - `common`: Shared owners, steps and story definitions
//! - `basic`: Call and summary modes of plain stories
//! - `definition`: Compiled instruction streams and definition errors
//! - `contract`: Context contracts and their composition
//! - `failures`: Failure protocols and their composition
//! - `coroutine`: Async drivers and `Next`
//! - `parallel`: Fan-out groups
//! - `representation`: Rendered traces collected by a `Recorder`
//!
//! ## Test Stories
//!
//! Most tests use `Simple.x(foo, bar)`:
//! - `one`: does nothing
//! - `two`: fails when `foo > 1`, skips when `bar < 0`, else sets `baz = 4`
//! - `three`: returns `bar - baz`
//!
//! wrapped by `y(spam)`, which sets `foo = spam - 1` and `bar = spam + 1`
//! before running `x` and returns `spam * 2` after it.

mod common;

mod basic;
mod parallel;
