//! A builder backed by an async factory closure.

use super::{SessionBuilder, SessionBuilderOptions};
use crate::cancellation::CancellationToken;
use crate::context::{ExecutionContext, StartScopes};
use crate::pool::PoolOptions;
use crate::session::{SessionKind, SessionMode, SessionResource};
use crate::wait::WaitOptions;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Factory producing a fresh resource for every build.
pub type ResourceFactory =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<dyn SessionResource>>> + Send + Sync>;

/// A [`SessionBuilder`] that delegates resource creation to a closure.
#[derive(Clone)]
pub struct FnSessionBuilder {
    kind: SessionKind,
    options: SessionBuilderOptions,
    factory: ResourceFactory,
}

impl FnSessionBuilder {
    /// Creates a builder for an explicit kind.
    pub fn new<F, Fut>(kind: SessionKind, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<dyn SessionResource>>> + Send + 'static,
    {
        Self {
            kind,
            options: SessionBuilderOptions::default(),
            factory: Arc::new(move || factory().boxed()),
        }
    }

    /// Creates a builder whose kind is derived from the resource type `R`.
    pub fn for_resource<R, F, Fut>(factory: F) -> Self
    where
        R: SessionResource,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self::new(SessionKind::of::<R>(), move || {
            let created = factory();
            async move { created.await.map(|r| Arc::new(r) as Arc<dyn SessionResource>) }
        })
    }

    /// Replaces all options.
    #[must_use]
    pub fn with_options(mut self, options: SessionBuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the session name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Shorthand for shared mode.
    #[must_use]
    pub fn shared(self) -> Self {
        self.with_mode(SessionMode::Shared)
    }

    /// Shorthand for pool mode with the given capacity settings.
    #[must_use]
    pub fn pooled(mut self, pool: PoolOptions) -> Self {
        self.options.pool = pool;
        self.with_mode(SessionMode::Pool)
    }

    /// Sets the automatic start scopes.
    #[must_use]
    pub fn with_start_scopes(mut self, scopes: StartScopes) -> Self {
        self.options.start_scopes = scopes;
        self
    }

    /// Sets the wait timing.
    #[must_use]
    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.options.wait = wait;
        self
    }
}

impl std::fmt::Debug for FnSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSessionBuilder")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionBuilder for FnSessionBuilder {
    fn kind(&self) -> SessionKind {
        self.kind.clone()
    }

    fn options(&self) -> &SessionBuilderOptions {
        &self.options
    }

    async fn create_resource(
        &self,
        _context: &Arc<ExecutionContext>,
        _token: &CancellationToken,
    ) -> anyhow::Result<Arc<dyn SessionResource>> {
        (self.factory)().await
    }

    fn clone_builder(&self) -> Arc<dyn SessionBuilder> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextScope;
    use crate::events::CollectingEventSink;
    use crate::session::SessionState;
    use crate::testing::MockResource;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_build_registers_and_publishes_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = ExecutionContext::builder(ContextScope::Global, "run")
            .with_event_sink(sink.clone())
            .build()
            .unwrap();
        let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::new()) }).with_name("main");

        let session = builder.build(&ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.owner_context_id(), Some(ctx.id()));
        assert!(ctx.sessions().contains(session.id()));
        assert_eq!(
            sink.event_types(),
            vec![
                "session.assigned_to_context",
                "session.init_started",
                "session.init_completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_leaves_nothing_registered() {
        let ctx = ExecutionContext::builder(ContextScope::Global, "run").build().unwrap();
        let resource = Arc::new(MockResource::failing_start());
        let shared = resource.clone();
        let builder = FnSessionBuilder::new(SessionKind::of::<MockResource>(), move || {
            let resource = shared.clone();
            async move { Ok(resource as Arc<dyn SessionResource>) }
        });

        let err = builder.build(&ctx, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, crate::errors::SessionError::StartFailed { .. }));
        assert!(ctx.sessions().is_empty());
        assert_eq!(resource.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_context_disposed_during_start_tears_session_down() {
        use std::time::Duration;

        let ctx = ExecutionContext::builder(ContextScope::Global, "run").build().unwrap();
        let resource = Arc::new(
            MockResource::new()
                .with_start_delay(Duration::from_millis(100))
                .with_failing_stop(),
        );
        let shared = resource.clone();
        let builder = FnSessionBuilder::new(SessionKind::of::<MockResource>(), move || {
            let resource = shared.clone();
            async move { Ok(resource as Arc<dyn SessionResource>) }
        });
        let token = CancellationToken::new();

        let disposing = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.dispose().await
        };
        let (result, failures) = tokio::join!(builder.build(&ctx, &token), disposing);

        assert!(failures.is_empty());
        // The registration error wins over the failed stop.
        assert!(result.unwrap_err().is_disposed());
        assert_eq!(resource.start_count(), 1);
        assert_eq!(resource.stop_count(), 1);
        assert!(ctx.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_pool_mode_sessions_are_not_registered() {
        let ctx = ExecutionContext::builder(ContextScope::Global, "run").build().unwrap();
        let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::new()) })
            .pooled(PoolOptions::default());

        let session = builder.build(&ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(session.mode(), SessionMode::Pool);
        assert!(ctx.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_build_into_disposed_context_fails() {
        let ctx = ExecutionContext::builder(ContextScope::Global, "run").build().unwrap();
        ctx.dispose().await;
        let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::new()) });

        let err = builder.build(&ctx, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_disposed());
    }

    #[test]
    fn test_clone_builder_keeps_options() {
        let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::new()) })
            .with_name("admin")
            .shared();
        let cloned = builder.clone_builder();
        assert_eq!(cloned.name(), Some("admin"));
        assert_eq!(cloned.options().mode, SessionMode::Shared);
        assert_eq!(cloned.kind(), SessionKind::of::<MockResource>());
    }
}
