//! The unit of work a scheduler dispatches.

use crate::error::WorkloadError;
use async_trait::async_trait;

/// A unit of work driven at a target rate.
///
/// Only [`Workload::call`] is timed. `pre_call` runs before the measured
/// window (sampling ids, rendering a query) and hands its result to `call`;
/// `post_call` runs after it.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Per-call input produced by `pre_call`.
    type Prepared: Send + 'static;

    /// Name used in logs and summaries.
    fn name(&self) -> &str;

    /// Validation and setup before a session starts.
    async fn pre_process(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Teardown after a session has drained.
    async fn post_process(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_call(&self) -> Result<Self::Prepared, WorkloadError>;

    async fn call(&self, prepared: Self::Prepared) -> Result<(), WorkloadError>;

    async fn post_call(&self) {}
}
