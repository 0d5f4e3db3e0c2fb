//! Core domain model types for enrichflow.
//!
//! This module contains the typed results that flow between stages:
//! - Partial results, one variant per analysis kind
//! - The partial-result set handed to synthesis
//! - The synthesized context

mod partial;
mod synthesized;

pub use partial::{
    AnalysisSource, ConsciousnessUpdate, InsightAnalysis, IntentAnalysis, MemoryRecall,
    PartialResult, PartialResults, PartialSlot, RecalledMemory, SentimentAnalysis,
    SentimentLabel, SocialAnalysis,
};
pub use synthesized::SynthesizedContext;
