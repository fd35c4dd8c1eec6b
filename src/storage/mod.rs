mod filter;
pub mod memory;
mod mongo;

pub use memory::{InMemoryClient, InMemoryCollection, InMemoryDatabase};
