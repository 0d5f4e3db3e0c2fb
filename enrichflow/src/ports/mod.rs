//! Collaborator ports consumed by the engine and its stages.
//!
//! The engine never talks to a database, a model, or a config file
//! directly. Stages receive these traits and the crate ships in-memory
//! implementations of each.

mod config;
mod generation;
mod store;

pub use config::{ConfigSource, MapConfigSource};
pub use generation::{StaticTextGenerator, TextGenerator, UnavailableTextGenerator};
pub use store::{InMemoryStore, Store, StoredRecord};

#[cfg(test)]
pub use generation::MockTextGenerator;
