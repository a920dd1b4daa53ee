//! Execution contexts: the nodes of the run tree that own sessions.

use super::{ContextScope, ExecutionContextBuilder};
use crate::builder::{SessionBuilder, SessionProvider};
use crate::cancellation::CancellationToken;
use crate::errors::{Result, SessionError};
use crate::events::EventBus;
use crate::ids::ContextId;
use crate::pool::{SessionPool, SessionPoolContainer};
use crate::registry::SessionCollection;
use crate::session::{ContextRef, SessionKind, SessionMode};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// A node in the run tree (global, namespace, suite or test).
///
/// Each context owns a session registry, a pool container and the session
/// declarations it starts from. Children keep their parent alive; parents
/// only hold weak references to children.
pub struct ExecutionContext {
    id: ContextId,
    scope: ContextScope,
    name: String,
    parent: Option<Arc<ExecutionContext>>,
    children: RwLock<Vec<Weak<ExecutionContext>>>,
    sessions: SessionCollection,
    pools: SessionPoolContainer,
    providers: RwLock<Vec<SessionProvider>>,
    events: Arc<EventBus>,
    cancellation_token: Arc<CancellationToken>,
    disposed: AtomicBool,
}

impl ExecutionContext {
    /// Starts building a root context.
    #[must_use]
    pub fn builder(scope: ContextScope, name: impl Into<String>) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(scope, name, None)
    }

    /// Starts building a child context that inherits this context's session
    /// declarations and event bus.
    #[must_use]
    pub fn child(self: &Arc<Self>, scope: ContextScope, name: impl Into<String>) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(scope, name, Some(self.clone()))
    }

    pub(crate) fn create(
        scope: ContextScope,
        name: String,
        parent: Option<Arc<Self>>,
        providers: Vec<SessionProvider>,
        events: Arc<EventBus>,
    ) -> Result<Arc<Self>> {
        // Held until the child is linked so a concurrent dispose either sees
        // the child or makes this call fail.
        let mut siblings = match &parent {
            Some(parent) => {
                let siblings = parent.children.write();
                if parent.is_disposed() {
                    return Err(SessionError::disposed(parent.describe()));
                }
                Some(siblings)
            }
            None => None,
        };

        let id = ContextId::new();
        let label = format!("{scope} '{name}'");
        let cancellation_token = match &parent {
            Some(parent) => parent.cancellation_token.child_token(),
            None => Arc::new(CancellationToken::new()),
        };

        let context = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            id,
            scope,
            name,
            parent: parent.clone(),
            children: RwLock::new(Vec::new()),
            sessions: SessionCollection::new(ContextRef::from_parts(id, label.clone(), weak.clone())),
            pools: SessionPoolContainer::new(ContextRef::from_parts(id, label, weak.clone())),
            providers: RwLock::new(providers),
            events,
            cancellation_token,
            disposed: AtomicBool::new(false),
        });

        if let Some(siblings) = siblings.as_mut() {
            siblings.push(Arc::downgrade(&context));
        }
        drop(siblings);
        debug!(context_id = %id, context = %context.describe(), depth = context.depth(), "Context created");
        Ok(context)
    }

    /// Returns the context id.
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the scope.
    pub const fn scope(&self) -> ContextScope {
        self.scope
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Describes the context, e.g. `test 'login'`.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.scope, self.name)
    }

    /// Returns the parent context, if any.
    pub fn parent(&self) -> Option<&Arc<ExecutionContext>> {
        self.parent.as_ref()
    }

    /// Iterates over the ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Arc<ExecutionContext>> {
        std::iter::successors(self.parent.clone(), |context| context.parent.clone())
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Children that are still alive.
    pub fn children(&self) -> Vec<Arc<ExecutionContext>> {
        self.children.read().iter().filter_map(Weak::upgrade).collect()
    }

    /// The session registry.
    pub const fn sessions(&self) -> &SessionCollection {
        &self.sessions
    }

    /// The pool container.
    pub const fn pools(&self) -> &SessionPoolContainer {
        &self.pools
    }

    /// The event bus shared with the sessions built here.
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Cancelled when this context or any ancestor is disposed.
    pub fn cancellation_token(&self) -> &Arc<CancellationToken> {
        &self.cancellation_token
    }

    /// Returns true once [`ExecutionContext::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Snapshot of the session declarations.
    pub fn providers(&self) -> Vec<SessionProvider> {
        self.providers.read().clone()
    }

    /// Adds a session declaration. It is not started automatically.
    pub fn add_provider(&self, provider: SessionProvider) {
        self.providers.write().push(provider);
    }

    /// Finds a declared builder for a kind and optional name.
    pub fn find_builder(&self, kind: &SessionKind, name: Option<&str>) -> Option<Arc<dyn SessionBuilder>> {
        self.providers.read().iter().find_map(|provider| match provider {
            SessionProvider::Builder(builder)
                if &builder.kind() == kind && name.map_or(true, |n| builder.name() == Some(n)) =>
            {
                Some(builder.clone())
            }
            _ => None,
        })
    }

    /// Starts every declaration whose start scopes include this context's
    /// scope, in declaration order.
    ///
    /// Own and shared builders build a session, pool-mode builders create
    /// and fill a pool, borrow requests borrow, and pool requests take.
    ///
    /// # Errors
    ///
    /// Stops at the first failure and returns it.
    pub async fn start(self: &Arc<Self>, token: &CancellationToken) -> Result<()> {
        if self.is_disposed() {
            return Err(SessionError::disposed(self.describe()));
        }

        let providers: Vec<SessionProvider> = self
            .providers()
            .into_iter()
            .filter(|p| p.start_scopes().contains(self.scope))
            .collect();

        for provider in &providers {
            match provider {
                SessionProvider::Builder(builder) if builder.options().mode == SessionMode::Pool => {
                    self.start_pool(builder.clone(), token).await?;
                }
                SessionProvider::Builder(builder) => {
                    builder.build(self, token).await?;
                }
                SessionProvider::Borrow(request) => {
                    self.sessions
                        .borrow_async(&request.kind, request.name.as_deref(), token)
                        .await?;
                }
                SessionProvider::TakeFromPool(request) => {
                    self.sessions
                        .take_from_pool_async(&request.kind, request.name.as_deref(), token)
                        .await?;
                }
            }
        }

        info!(
            context_id = %self.id,
            context = %self.describe(),
            started = providers.len(),
            "Context started"
        );
        Ok(())
    }

    /// Creates a pool from a pool-mode builder, registers it here and fills
    /// it to its initial capacity.
    ///
    /// # Errors
    ///
    /// Invalid options, a duplicate pool, or a failed initial fill.
    pub async fn start_pool(
        self: &Arc<Self>,
        builder: Arc<dyn SessionBuilder>,
        token: &CancellationToken,
    ) -> Result<Arc<SessionPool>> {
        let pool = SessionPool::new(self, builder)?;
        self.pools.add(pool.clone())?;

        let options = *pool.options();
        if options.initial_capacity > 0 {
            pool.fill_async(options.initial_capacity, options.fill_in_parallel, token)
                .await?;
        }
        Ok(pool)
    }

    /// Tears the context down. Only the first call has any effect.
    ///
    /// Cancels the context token, disposes live children, then handles each
    /// registered session: owned ones are disposed, borrowed ones go back to
    /// their owner and pool checkouts go back to their pool. Finally the
    /// pools and the registry are disposed.
    ///
    /// Failures do not stop the teardown; they are returned.
    pub fn dispose(&self) -> BoxFuture<'_, Vec<SessionError>> {
        async move {
            {
                let _children = self.children.write();
                if self.disposed.swap(true, Ordering::SeqCst) {
                    return Vec::new();
                }
            }
            self.cancellation_token
                .cancel(format!("{} disposed", self.describe()));

            let mut failures = Vec::new();
            for child in self.children() {
                failures.extend(child.dispose().await);
            }

            for session in self.sessions.sessions().into_iter().rev() {
                let result = if session.owner_context_id() == Some(self.id) {
                    session.dispose().await
                } else if session.is_borrowed() {
                    session.return_to_owner()
                } else if session.is_taken_from_pool() {
                    match session.pool() {
                        Some(pool) => pool.return_session(&session).await,
                        None => session.dispose().await,
                    }
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    warn!(context = %self.describe(), resource = %session.describe(), error = %e, "Session cleanup failed");
                    failures.push(e);
                }
            }

            failures.extend(self.pools.dispose().await);
            self.sessions.dispose();

            if let Some(parent) = &self.parent {
                parent
                    .children
                    .write()
                    .retain(|child| !std::ptr::eq(child.as_ptr(), self));
            }

            info!(
                context_id = %self.id,
                context = %self.describe(),
                failures = failures.len(),
                "Context disposed"
            );
            failures
        }
        .boxed()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("sessions", &self.sessions.len())
            .field("pools", &self.pools.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
