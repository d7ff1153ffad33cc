//! Sample source trait

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::sample::Sample;

/// Anything that can produce one [`Sample`] for a set of slot indices
///
/// Implemented by the live protocol engine and by the synthetic
/// generator. The sampling engine holds an `Arc<dyn SamplePoller>` and
/// never needs to know which one it has.
#[async_trait]
pub trait SamplePoller: Send + Sync {
    /// Poll the given slots once and return the assembled sample
    ///
    /// Slots are polled in the order given. Derived slots are filled in
    /// before the sample is returned.
    async fn poll(&self, indices: &[usize]) -> SourceResult<Sample>;
}
