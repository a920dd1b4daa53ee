use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pretty_assertions::assert_eq;

use crate::builder::FnSessionBuilder;
use crate::cancellation::CancellationToken;
use crate::context::{ContextScope, ExecutionContext};
use crate::errors::SessionError;
use crate::pool::{PoolOptions, SessionPool};
use crate::session::{SessionKind, SessionResource, SessionState};
use crate::testing::{quick_wait, MockResource, ResourceProbe};

fn pooled(probe: &Arc<ResourceProbe>, options: PoolOptions) -> Arc<FnSessionBuilder> {
    Arc::new(
        MockResource::builder(probe.clone())
            .pooled(options)
            .with_wait_options(quick_wait()),
    )
}

fn root() -> Arc<ExecutionContext> {
    ExecutionContext::builder(ContextScope::Global, "run").build().unwrap()
}

#[tokio::test]
async fn test_initial_fill_then_exhaustion_then_return() {
    let ctx = root();
    let probe = ResourceProbe::new();
    let token = Arc::new(CancellationToken::new());
    let options = PoolOptions::default().with_initial_capacity(2).with_max_capacity(2);
    let pool = ctx.start_pool(pooled(&probe, options), &token).await.unwrap();

    assert_eq!(pool.built_count(), 2);
    assert_eq!(pool.queued_count(), 2);

    let first = pool.get_async(&ctx, &token).await.unwrap();
    let _second = pool.get_async(&ctx, &token).await.unwrap();
    assert_eq!(pool.queued_count(), 0);

    let waiter = {
        let pool = pool.clone();
        let ctx = ctx.clone();
        let token = token.clone();
        tokio::spawn(async move { pool.get_async(&ctx, &token).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    let returned_at = Instant::now();
    pool.return_session(&first).await.unwrap();
    let third = waiter.await.unwrap().unwrap();

    assert!(returned_at.elapsed() < Duration::from_millis(200));
    assert_eq!(third.id(), first.id());
    assert!(third.is_taken_from_pool());
    assert_eq!(pool.built_count(), 2);
    assert_eq!(probe.created(), 2);
}

#[tokio::test]
async fn test_fill_beyond_capacity_keeps_what_was_built() {
    for in_parallel in [false, true] {
        let ctx = root();
        let probe = ResourceProbe::new();
        let token = CancellationToken::new();
        let pool = ctx
            .start_pool(pooled(&probe, PoolOptions::default().with_max_capacity(2)), &token)
            .await
            .unwrap();

        let err = pool.fill_async(3, in_parallel, &token).await.unwrap_err();

        assert!(matches!(err, SessionError::Capacity { .. }), "{err}");
        assert_eq!(pool.queued_count(), 2);
        assert_eq!(pool.built_count(), 2);
        assert_eq!(probe.created(), 2);
    }
}

#[tokio::test]
async fn test_concurrent_takers_never_exceed_capacity() {
    let ctx = root();
    let probe = ResourceProbe::new();
    let token = CancellationToken::new();
    let pool = ctx
        .start_pool(pooled(&probe, PoolOptions::default().with_max_capacity(3)), &token)
        .await
        .unwrap();

    let results = join_all((0..6).map(|_| pool.get_async(&ctx, &token))).await;

    let taken = results.iter().filter(|r| r.is_ok()).count();
    let timed_out = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_timeout()))
        .count();
    assert_eq!(taken, 3);
    assert_eq!(timed_out, 3);
    assert_eq!(pool.built_count(), 3);
    assert_eq!(probe.created(), 3);
}

#[tokio::test]
async fn test_take_from_ancestor_pool_and_missing_pool() {
    let root = root();
    let suite_a = root.child(ContextScope::Suite, "a").build().unwrap();
    let test_a = suite_a.child(ContextScope::Test, "a1").build().unwrap();
    let suite_b = root.child(ContextScope::Suite, "b").build().unwrap();
    let test_b = suite_b.child(ContextScope::Test, "b1").build().unwrap();
    let token = CancellationToken::new();
    let pool = suite_a
        .start_pool(pooled(&ResourceProbe::new(), PoolOptions::default()), &token)
        .await
        .unwrap();
    let kind = SessionKind::of::<MockResource>();

    let session = test_a.sessions().take_from_pool_async(&kind, None, &token).await.unwrap();

    assert_eq!(session.owner_context_id(), Some(suite_a.id()));
    assert_eq!(session.context_id(), Some(test_a.id()));
    assert!(test_a.sessions().contains(session.id()));
    assert!(suite_a.sessions().is_empty());

    let err = test_b.sessions().take_from_pool_async(&kind, None, &token).await.unwrap_err();
    assert!(matches!(err, SessionError::PoolNotFound { .. }), "{err}");

    test_a.sessions().release(&session).await.unwrap();
    assert!(!test_a.sessions().contains(session.id()));
    assert_eq!(session.state(), SessionState::Deactivated);
    assert_eq!(pool.queued_count(), 1);
}

#[tokio::test]
async fn test_return_validates_pool_and_checkout() {
    let ctx = root();
    let token = CancellationToken::new();
    let probe = ResourceProbe::new();
    let first = ctx
        .start_pool(pooled(&probe, PoolOptions::default().with_initial_capacity(1)), &token)
        .await
        .unwrap();
    let other = SessionPool::new(
        &ctx,
        Arc::new(
            MockResource::builder(probe.clone())
                .with_name("other")
                .pooled(PoolOptions::default()),
        ),
    )
    .unwrap();

    let session = first.get_async(&ctx, &token).await.unwrap();

    assert!(matches!(other.return_session(&session).await, Err(SessionError::Validation(_))));
    first.return_session(&session).await.unwrap();
    assert!(matches!(first.return_session(&session).await, Err(SessionError::Validation(_))));
    assert_eq!(first.queued_count(), 1);
}

#[tokio::test]
async fn test_pool_requires_pool_mode_and_unique_key() {
    let ctx = root();
    let token = CancellationToken::new();
    let probe = ResourceProbe::new();

    let own = Arc::new(MockResource::builder(probe.clone()));
    assert!(matches!(
        ctx.start_pool(own, &token).await,
        Err(SessionError::Validation(_))
    ));

    ctx.start_pool(pooled(&probe, PoolOptions::default()), &token).await.unwrap();
    let err = ctx
        .start_pool(pooled(&probe, PoolOptions::default()), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DuplicatePool { .. }), "{err}");
    assert_eq!(ctx.pools().len(), 1);
}

#[tokio::test]
async fn test_failed_builds_release_capacity() {
    let ctx = root();
    let token = CancellationToken::new();
    let builder = FnSessionBuilder::for_resource(|| async { Ok(MockResource::failing_start()) })
        .pooled(PoolOptions::default().with_max_capacity(1))
        .with_wait_options(quick_wait());
    let pool = ctx.start_pool(Arc::new(builder), &token).await.unwrap();

    let err = pool.fill_async(1, false, &token).await.unwrap_err();
    assert!(matches!(err, SessionError::StartFailed { .. }), "{err}");
    assert_eq!(pool.built_count(), 0);

    let err = pool.get_async(&ctx, &token).await.unwrap_err();
    assert!(matches!(err, SessionError::StartFailed { .. }), "{err}");
    assert_eq!(pool.built_count(), 0);
}

#[tokio::test]
async fn test_disposing_idle_session_frees_its_slot() {
    let ctx = root();
    let token = CancellationToken::new();
    let pool = ctx
        .start_pool(
            pooled(&ResourceProbe::new(), PoolOptions::default().with_initial_capacity(1).with_max_capacity(1)),
            &token,
        )
        .await
        .unwrap();

    let session = pool.get_async(&ctx, &token).await.unwrap();
    session.dispose().await.unwrap();

    assert_eq!(pool.built_count(), 0);
    let replacement = pool.get_async(&ctx, &token).await.unwrap();
    assert_ne!(replacement.id(), session.id());
}

#[tokio::test]
async fn test_dispose_tears_down_idle_and_checked_out_sessions() {
    let ctx = root();
    let token = CancellationToken::new();
    let probe = ResourceProbe::new();
    let pool = ctx
        .start_pool(pooled(&probe, PoolOptions::default().with_initial_capacity(3)), &token)
        .await
        .unwrap();
    let taken = pool.get_async(&ctx, &token).await.unwrap();

    assert!(pool.dispose().await.is_empty());
    assert!(pool.dispose().await.is_empty());

    assert!(taken.is_disposed());
    assert_eq!(probe.stopped(), 3);
    assert_eq!(pool.queued_count(), 0);
    assert!(pool.get_async(&ctx, &token).await.unwrap_err().is_disposed());
    assert!(pool.fill_async(1, true, &token).await.unwrap_err().is_disposed());
}

#[tokio::test]
async fn test_typed_access_through_pool_session() {
    let ctx = root();
    let token = CancellationToken::new();
    let pool = ctx
        .start_pool(pooled(&ResourceProbe::new(), PoolOptions::default()), &token)
        .await
        .unwrap();

    let session = pool.get_async(&ctx, &token).await.unwrap();
    let resource = session.resource::<MockResource>().unwrap();
    assert_eq!(resource.start_count(), 1);
    assert!(session.raw_resource().as_any().is::<MockResource>());
}

#[tokio::test]
async fn test_exhausted_pool_wait_honors_cancellation() {
    let ctx = root();
    let token = Arc::new(CancellationToken::new());
    let builder = MockResource::builder(ResourceProbe::new())
        .pooled(PoolOptions::default().with_max_capacity(1));
    let pool = ctx.start_pool(Arc::new(builder), &token).await.unwrap();
    let _held = pool.get_async(&ctx, &token).await.unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel("suite aborted");
    });

    let started = Instant::now();
    let err = pool.get_async(&ctx, &token).await.unwrap_err();

    assert!(matches!(err, SessionError::Cancelled { .. }), "{err}");
    assert!(err.to_string().contains("suite aborted"));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pool.max_capacity(), 1);
}
