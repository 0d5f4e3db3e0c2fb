//! Stage traits and stage descriptors.
//!
//! Stages are the units of work an executor runs. Sequential stages consume
//! and return the whole context; analysis stages read a shared snapshot and
//! return one typed partial result.

mod spec;

pub use spec::{validate_stage_specs, AnalysisStageSpec, EnrichStageSpec, StageSpec};

use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::core::PartialResult;
use crate::errors::StageFailure;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A stage for the sequential executor.
///
/// The stage owns the context while it runs and hands back the enriched
/// version. It may append to the operation ledger and write its own result
/// slot.
#[async_trait]
pub trait EnrichStage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Enriches the context.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The current context
    /// * `cancel` - Cancelled when the stage loses its timeout race or the run is cancelled
    async fn enrich(
        &self,
        ctx: EnrichmentContext,
        cancel: Arc<CancellationToken>,
    ) -> Result<EnrichmentContext, StageFailure>;
}

/// A stage for the parallel executor.
///
/// Every analysis stage in a run sees the same read-only snapshot.
#[async_trait]
pub trait AnalysisStage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Analyzes the snapshot.
    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure>;
}

/// A closure-backed [`EnrichStage`].
pub struct FnEnrichStage<F, Fut>
where
    F: Fn(EnrichmentContext, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EnrichmentContext, StageFailure>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnEnrichStage<F, Fut>
where
    F: Fn(EnrichmentContext, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EnrichmentContext, StageFailure>> + Send,
{
    /// Creates a new closure-backed stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnEnrichStage<F, Fut>
where
    F: Fn(EnrichmentContext, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EnrichmentContext, StageFailure>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEnrichStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> EnrichStage for FnEnrichStage<F, Fut>
where
    F: Fn(EnrichmentContext, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EnrichmentContext, StageFailure>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn enrich(
        &self,
        ctx: EnrichmentContext,
        cancel: Arc<CancellationToken>,
    ) -> Result<EnrichmentContext, StageFailure> {
        (self.func)(ctx, cancel).await
    }
}

/// A closure-backed [`AnalysisStage`].
pub struct FnAnalysisStage<F, Fut>
where
    F: Fn(Arc<EnrichmentContext>, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PartialResult, StageFailure>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnAnalysisStage<F, Fut>
where
    F: Fn(Arc<EnrichmentContext>, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PartialResult, StageFailure>> + Send,
{
    /// Creates a new closure-backed stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnAnalysisStage<F, Fut>
where
    F: Fn(Arc<EnrichmentContext>, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PartialResult, StageFailure>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAnalysisStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> AnalysisStage for FnAnalysisStage<F, Fut>
where
    F: Fn(Arc<EnrichmentContext>, Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PartialResult, StageFailure>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        (self.func)(snapshot, cancel).await
    }
}

/// Runs an [`AnalysisStage`] inside the sequential executor.
///
/// The analysis sees a snapshot of the current context; its result is
/// written to the stage's own slot and folded into the operation ledger.
#[derive(Debug)]
pub struct AnalysisSlotStage {
    name: String,
    inner: Arc<dyn AnalysisStage>,
}

impl AnalysisSlotStage {
    /// Wraps an analysis stage under the given slot name.
    pub fn new(name: impl Into<String>, inner: Arc<dyn AnalysisStage>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

#[async_trait]
impl EnrichStage for AnalysisSlotStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enrich(
        &self,
        mut ctx: EnrichmentContext,
        cancel: Arc<CancellationToken>,
    ) -> Result<EnrichmentContext, StageFailure> {
        let result = self.inner.analyze(Arc::new(ctx.clone()), cancel).await?;
        ctx.record_result(&self.name, result);
        Ok(ctx)
    }
}
