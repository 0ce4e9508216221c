//! Test helpers: an in-memory driver backend that speaks the statement
//! shapes this crate generates, plus fault injection for liveness tests.
//!
//! Not a SQL engine, just a strict parser over the generated dialect. Anything
//! it does not recognize (including a second statement smuggled into a
//! literal) is an execution error, which is exactly what the injection
//! tests rely on.

mod memory;

pub use memory::{MemoryConnection, MemoryFactory, MemoryServer};
