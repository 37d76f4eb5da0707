//! Process-wide resource manager

use crate::limits::{IntoResourceLimits, ResourceLimits};
use crate::semaphore::{acquire_semaphore_permit, create_semaphore, try_acquire_semaphore_permit};
use paygen_errors::Error;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared handle to the generator slot semaphore.
///
/// Construct once per process and clone the handle into every payload run.
/// Clones share the same semaphore.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    limits: ResourceLimits,
    generators: Arc<Semaphore>,
}

impl ResourceManager {
    #[must_use]
    pub fn new(limits: impl IntoResourceLimits) -> Self {
        let limits = limits.into_resource_limits();
        let generators = create_semaphore(limits.concurrent_generators);
        Self { limits, generators }
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Wait for a generator slot.
    ///
    /// The permit is released when dropped, including on error and
    /// cancellation paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the semaphore has been closed.
    pub async fn acquire_generator_permit(&self) -> Result<OwnedSemaphorePermit, Error> {
        let permit = acquire_semaphore_permit(self.generators.clone(), "payload generator").await?;
        tracing::trace!(
            available = self.generators.available_permits(),
            "generator slot acquired"
        );
        Ok(permit)
    }

    /// Take a generator slot only if one is free right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the semaphore has been closed.
    pub fn try_acquire_generator_permit(&self) -> Result<Option<OwnedSemaphorePermit>, Error> {
        try_acquire_semaphore_permit(&self.generators)
    }

    #[must_use]
    pub fn available_generator_permits(&self) -> usize {
        self.generators.available_permits()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}
