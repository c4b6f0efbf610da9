use std::future::Future;

use crate::error::AppError;
use crate::models::ExtractionOutcome;
use crate::target::SearchTarget;

/// One rendered query result, owned by a single job.
pub trait RenderSurface: Send + Sync {
    /// Whether the rendering engine reports the surface as settled.
    ///
    /// An unstable surface is polled again like a `NotReady` outcome.
    fn is_stable(&self) -> impl Future<Output = bool> + Send {
        std::future::ready(true)
    }

    /// Current rendered content (HTML) of the surface.
    fn snapshot(&self) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Produces render surfaces for search targets.
pub trait ContentSource: Send + Sync + Clone + 'static {
    type Surface: RenderSurface + 'static;

    fn create_surface(
        &self,
        target: &SearchTarget,
    ) -> impl Future<Output = Result<Self::Surface, AppError>> + Send;

    /// Dispose of a surface. Must be idempotent and never fail.
    fn release_surface(&self, surface: Self::Surface) -> impl Future<Output = ()> + Send;
}

/// Reads contact fields out of a content snapshot.
pub trait Extractor: Send + Sync + Clone + 'static {
    fn extract(&self, snapshot: &str) -> ExtractionOutcome;
}
