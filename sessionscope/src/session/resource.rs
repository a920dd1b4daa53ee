//! The contract a concrete pooled resource implements.

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use std::any::Any;

/// A concrete resource managed by a [`Session`](super::Session), e.g. a
/// browser-driver connection.
///
/// The crate only decides when resources are started and stopped; what they
/// do is up to the implementation.
#[async_trait]
pub trait SessionResource: Send + Sync + 'static {
    /// Startup hook, invoked once after construction by the owning builder.
    async fn start(&self, token: &CancellationToken) -> anyhow::Result<()>;

    /// Releases the underlying resource. Invoked at most once.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Returns `self` for typed access through [`Session::resource`](super::Session::resource).
    fn as_any(&self) -> &dyn Any;
}
