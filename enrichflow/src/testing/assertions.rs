//! Test assertions for enrichment outcomes.

use crate::context::EnrichmentContext;
use crate::observability::TraceEntry;

/// Asserts that `stage` is in the context's performed list.
pub fn assert_performed(ctx: &EnrichmentContext, stage: &str) {
    assert!(
        ctx.ledger().has_performed(stage),
        "Expected stage '{}' to be performed, performed: {:?}",
        stage,
        ctx.ledger().performed()
    );
}

/// Asserts that `stage` has an entry in the context's error ledger.
pub fn assert_failed(ctx: &EnrichmentContext, stage: &str) {
    assert!(
        ctx.errors().iter().any(|e| e.stage == stage),
        "Expected stage '{}' to have failed, errors: {:?}",
        stage,
        ctx.errors()
    );
}

/// Asserts that the trace holds exactly `expected` stage names, in order.
pub fn assert_trace_stages(trace: &[TraceEntry], expected: &[&str]) {
    let actual: Vec<&str> = trace.iter().map(|entry| entry.stage.as_str()).collect();
    assert_eq!(actual, expected, "Unexpected trace stages");
}

/// Asserts that the context carries a synthesized view.
pub fn assert_synthesized(ctx: &EnrichmentContext) {
    assert!(
        ctx.synthesized().is_some(),
        "Expected a synthesized context, performed: {:?}",
        ctx.ledger().performed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;
    use crate::testing::test_context;

    #[test]
    fn test_assert_performed_and_failed() {
        let mut ctx = test_context("hi");
        ctx.ledger_mut().record_performed("a");
        ctx.record_error(StageError::new("b", "boom", true));
        assert_performed(&ctx, "a");
        assert_failed(&ctx, "b");
    }

    #[test]
    #[should_panic(expected = "Expected stage 'x' to be performed")]
    fn test_assert_performed_panics() {
        assert_performed(&test_context("hi"), "x");
    }

    #[test]
    #[should_panic(expected = "Expected a synthesized context")]
    fn test_assert_synthesized_panics() {
        assert_synthesized(&test_context("hi"));
    }
}
