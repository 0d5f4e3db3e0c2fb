//! The enrichment context and its ledgers.
//!
//! This module provides:
//! - The immutable request identity
//! - The append-only operation ledger
//! - The context record that stages enrich

mod enrichment;
mod identity;
mod ledger;

pub use enrichment::EnrichmentContext;
pub use identity::RequestIdentity;
pub use ledger::OperationLedger;
