//! Cooperative cancellation for stage executors.
//!
//! Every stage receives a [`CancellationToken`]. Tokens form a tree: the
//! run's root token cancels each stage's child token.

mod token;

pub use token::{CancelCallback, CancellationToken};
