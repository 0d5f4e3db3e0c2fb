//! Upstream operation boundary.
//!
//! This module provides:
//! - Operation descriptors and structured results
//! - The [`OperationAdapter`] that runs enrichment operations by name

mod definitions;
mod service;

pub use definitions::{OperationDescriptor, OperationResult};
pub use service::{
    EnrichmentReport, OperationAdapter, ENRICH_CONTEXT, ENRICH_SEQUENTIAL, GET_THINKING_SESSION,
};
