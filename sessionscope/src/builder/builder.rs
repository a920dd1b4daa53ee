//! The session builder contract.

use super::SessionBuilderOptions;
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::{Result, SessionError};
use crate::events::SessionEventKind;
use crate::session::{Session, SessionKind, SessionMode, SessionResource};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Knows how to create and start one kind of session.
///
/// Implementors supply the resource; [`SessionBuilder::build`] drives the
/// shared lifecycle. Builders declared on a context are inherited by its
/// children through [`SessionBuilder::clone_builder`].
#[async_trait]
pub trait SessionBuilder: Send + Sync + std::fmt::Debug {
    /// The kind of session this builder produces.
    fn kind(&self) -> SessionKind;

    /// The builder's settings.
    fn options(&self) -> &SessionBuilderOptions;

    /// Creates a fresh, not yet started resource.
    async fn create_resource(
        &self,
        context: &Arc<ExecutionContext>,
        token: &CancellationToken,
    ) -> anyhow::Result<Arc<dyn SessionResource>>;

    /// Returns an independent copy for a child context.
    fn clone_builder(&self) -> Arc<dyn SessionBuilder>;

    /// The session name, if any.
    fn name(&self) -> Option<&str> {
        self.options().name.as_deref()
    }

    /// Builds and starts a session owned by `context`.
    ///
    /// Pool-mode sessions are not registered with the context; their pool
    /// tracks them instead.
    ///
    /// # Errors
    ///
    /// Fails if the context is disposed, the options are invalid, or the
    /// resource cannot be created or started.
    async fn build(&self, context: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Arc<Session>> {
        build_session(self, context, token).await
    }
}

/// The build pipeline behind [`SessionBuilder::build`].
///
/// A session whose start hook fails is disposed and never registered.
///
/// # Errors
///
/// See [`SessionBuilder::build`].
pub async fn build_session<B>(
    builder: &B,
    context: &Arc<ExecutionContext>,
    token: &CancellationToken,
) -> Result<Arc<Session>>
where
    B: SessionBuilder + ?Sized,
{
    if context.is_disposed() {
        return Err(SessionError::disposed(context.describe()));
    }
    let options = builder.options();
    options.validate()?;

    let kind = builder.kind();
    let resource_label = kind.describe(options.name.as_deref());
    let resource = builder
        .create_resource(context, token)
        .await
        .map_err(|e| SessionError::start_failed(resource_label.clone(), e))?;

    let session = Arc::new(Session::new(
        kind,
        options.name.clone(),
        options.mode,
        options.wait,
        resource,
        context.events().clone(),
    ));
    session.assign_to_owner_context(context)?;
    session.publish(SessionEventKind::InitStarted);

    if let Err(e) = session.start(token).await {
        warn!(resource = %resource_label, context = %context.describe(), error = %e, "Session failed to start");
        if let Err(teardown) = session.dispose().await {
            warn!(resource = %resource_label, error = %teardown, "Cleanup after failed start also failed");
        }
        return Err(e);
    }

    if options.mode != SessionMode::Pool {
        if let Err(e) = context.sessions().add(session.clone()) {
            warn!(resource = %resource_label, context = %context.describe(), error = %e, "Session could not be registered");
            if let Err(teardown) = session.dispose().await {
                warn!(resource = %resource_label, error = %teardown, "Cleanup after failed registration also failed");
            }
            return Err(e);
        }
    }

    session.publish(SessionEventKind::InitCompleted);
    info!(
        session_id = %session.id(),
        resource = %resource_label,
        mode = ?options.mode,
        context = %context.describe(),
        "Session started"
    );
    Ok(session)
}
