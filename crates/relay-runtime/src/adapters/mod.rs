//! Port implementations.

pub mod memory;

pub use memory::{InMemoryOddsStore, InMemoryProcessedEvents, InMemoryProjections};
