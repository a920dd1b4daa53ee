//! A started resource tracked by the context tree.

use super::{SessionKind, SessionMode, SessionResource, SessionState};
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::{Result, SessionError};
use crate::events::{EventBus, SessionEvent, SessionEventKind};
use crate::ids::{ContextId, SessionId};
use crate::pool::SessionPool;
use crate::wait::WaitOptions;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

/// A weak, labelled reference to an execution context.
///
/// Sessions and registries never keep their contexts alive; the label keeps
/// error messages readable after the context is gone.
#[derive(Debug, Clone)]
pub(crate) struct ContextRef {
    id: ContextId,
    label: String,
    context: Weak<ExecutionContext>,
}

impl ContextRef {
    pub(crate) fn new(context: &Arc<ExecutionContext>) -> Self {
        Self::from_parts(context.id(), context.describe(), Arc::downgrade(context))
    }

    pub(crate) fn from_parts(id: ContextId, label: String, context: Weak<ExecutionContext>) -> Self {
        Self { id, label, context }
    }

    pub(crate) const fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<ExecutionContext>> {
        self.context.upgrade()
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    current: Option<ContextRef>,
    borrowed: bool,
    taken_from_pool: bool,
}

/// A started resource with an owner context, a current context and a mode.
///
/// Every state change goes through one internal lock, so borrowing, pool
/// checkout and disposal are linearizable per session. Sessions are shared as
/// `Arc<Session>` between the owner's registry, borrowers and pools.
pub struct Session {
    id: SessionId,
    kind: SessionKind,
    name: Option<String>,
    mode: SessionMode,
    wait: WaitOptions,
    resource: Arc<dyn SessionResource>,
    events: Arc<EventBus>,
    owner: OnceLock<ContextRef>,
    pool: OnceLock<Weak<SessionPool>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Session {
    /// Creates a session in the `Building` state.
    ///
    /// Builders call this; the session has no owner until
    /// [`Session::assign_to_owner_context`] runs.
    #[must_use]
    pub fn new(
        kind: SessionKind,
        name: Option<String>,
        mode: SessionMode,
        wait: WaitOptions,
        resource: Arc<dyn SessionResource>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            name,
            mode,
            wait,
            resource,
            events,
            owner: OnceLock::new(),
            pool: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Building,
                current: None,
                borrowed: false,
                taken_from_pool: false,
            }),
        }
    }

    /// Returns the session id.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the resource kind.
    pub const fn kind(&self) -> &SessionKind {
        &self.kind
    }

    /// Returns the optional name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the mode.
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Returns the timing used when waiting for this session.
    pub const fn wait_options(&self) -> WaitOptions {
        self.wait
    }

    /// Describes the resource, e.g. `Browser "admin"`.
    pub fn describe(&self) -> String {
        self.kind.describe(self.name())
    }

    /// Returns true if the session matches a kind and an optional name.
    /// An absent name matches any session of the kind.
    pub fn matches(&self, kind: &SessionKind, name: Option<&str>) -> bool {
        &self.kind == kind && name.map_or(true, |name| self.name() == Some(name))
    }

    /// Returns the underlying resource.
    pub fn raw_resource(&self) -> &Arc<dyn SessionResource> {
        &self.resource
    }

    /// Returns the underlying resource as `R`, if it is one.
    pub fn resource<R: SessionResource>(&self) -> Option<&R> {
        self.resource.as_any().downcast_ref::<R>()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// Returns true if the session is started and not deactivated.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Returns true once the session has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    /// Returns true while a descendant context holds this shared session.
    pub fn is_borrowed(&self) -> bool {
        self.lifecycle.lock().borrowed
    }

    /// Returns true while this pool session is checked out.
    pub fn is_taken_from_pool(&self) -> bool {
        self.lifecycle.lock().taken_from_pool
    }

    /// Returns the id of the owner context, once assigned.
    pub fn owner_context_id(&self) -> Option<ContextId> {
        self.owner.get().map(ContextRef::id)
    }

    /// Returns the owner context if it is still alive.
    pub fn owner_context(&self) -> Option<Arc<ExecutionContext>> {
        self.owner.get().and_then(ContextRef::upgrade)
    }

    /// Returns the id of the context currently entitled to use the session.
    pub fn context_id(&self) -> Option<ContextId> {
        self.lifecycle.lock().current.as_ref().map(ContextRef::id)
    }

    /// Returns the current context if it is still alive.
    pub fn context(&self) -> Option<Arc<ExecutionContext>> {
        self.lifecycle.lock().current.as_ref().and_then(ContextRef::upgrade)
    }

    /// Returns true if `context` currently holds usage rights.
    pub fn is_usable_by(&self, context: ContextId) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.state != SessionState::Disposed
            && lifecycle.current.as_ref().map(ContextRef::id) == Some(context)
    }

    /// Binds the session to the context that built it. Also makes that
    /// context the current one.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed or already has an owner.
    pub fn assign_to_owner_context(&self, context: &Arc<ExecutionContext>) -> Result<()> {
        let owner = ContextRef::new(context);
        {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            self.owner.set(owner.clone()).map_err(|_| {
                SessionError::validation(format!(
                    "{} is already owned by {}",
                    self.describe(),
                    self.owner_label()
                ))
            })?;
            lifecycle.current = Some(owner);
        }
        self.publish(SessionEventKind::AssignedToContext {
            context_id: context.id(),
        });
        Ok(())
    }

    /// Moves usage rights to another context.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed.
    pub fn reassign_to_context(&self, context: &Arc<ExecutionContext>) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            lifecycle.current = Some(ContextRef::new(context));
        }
        self.publish(SessionEventKind::AssignedToContext {
            context_id: context.id(),
        });
        Ok(())
    }

    /// Moves usage rights back to the owner context.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed or has no owner.
    pub fn reassign_to_owner_context(&self) -> Result<()> {
        let owner = self.owner_ref()?.clone();
        let context_id = owner.id();
        {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            lifecycle.current = Some(owner);
        }
        self.publish(SessionEventKind::AssignedToContext { context_id });
        Ok(())
    }

    /// Makes this the most recently used session of its kind in the current
    /// context's registry.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed, its context is gone, or the context's
    /// registry does not hold it.
    pub fn set_as_current(&self) -> Result<()> {
        let context = {
            let lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            lifecycle.current.as_ref().and_then(ContextRef::upgrade)
        };
        let context = context.ok_or_else(|| SessionError::disposed(format!("context of {}", self.describe())))?;
        context.sessions().set_current(self.id)
    }

    /// Runs the resource start hook and activates the session.
    ///
    /// # Errors
    ///
    /// Fails if the session is not `Building` or the hook fails.
    pub async fn start(&self, token: &CancellationToken) -> Result<()> {
        {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.state != SessionState::Building {
                return Err(SessionError::validation(format!(
                    "{} cannot start from state {:?}",
                    self.describe(),
                    lifecycle.state
                )));
            }
        }

        self.resource
            .start(token)
            .await
            .map_err(|e| SessionError::start_failed(self.describe(), e))?;

        let mut lifecycle = self.lifecycle.lock();
        self.ensure_alive(&lifecycle)?;
        lifecycle.state = SessionState::Active;
        Ok(())
    }

    /// Soft-disables the session.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed.
    pub fn deactivate(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            if lifecycle.state == SessionState::Deactivated {
                return Ok(());
            }
            lifecycle.state = SessionState::Deactivated;
        }
        self.publish(SessionEventKind::Deactivated);
        Ok(())
    }

    /// Re-enables a deactivated session.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed or has not started yet.
    pub fn activate(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.ensure_alive(&lifecycle)?;
        if lifecycle.state == SessionState::Building {
            return Err(SessionError::validation(format!(
                "{} has not started",
                self.describe()
            )));
        }
        lifecycle.state = SessionState::Active;
        Ok(())
    }

    /// Atomically lends this shared session to `context`.
    ///
    /// Returns false if the session is not shared, is disposed, is already
    /// lent out, or `context` is its owner.
    pub fn try_borrow_to(&self, context: &Arc<ExecutionContext>) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            if self.mode != SessionMode::Shared
                || lifecycle.state == SessionState::Disposed
                || lifecycle.borrowed
                || self.owner_context_id() == Some(context.id())
            {
                return false;
            }
            lifecycle.borrowed = true;
            lifecycle.state = SessionState::Active;
            lifecycle.current = Some(ContextRef::new(context));
        }
        debug!(
            session_id = %self.id,
            resource = %self.describe(),
            context = %context.describe(),
            "Session borrowed"
        );
        self.publish(SessionEventKind::Borrowed {
            context_id: context.id(),
        });
        true
    }

    /// Hands a borrowed session back to its owner.
    ///
    /// Usage rights move back to the owner, the session is deactivated and it
    /// disappears from the borrower's registry.
    ///
    /// # Errors
    ///
    /// Fails if the session is disposed or not currently borrowed.
    pub fn return_to_owner(&self) -> Result<()> {
        let owner = self.owner_ref()?.clone();
        let borrower = {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            if !lifecycle.borrowed {
                return Err(SessionError::validation(format!(
                    "{} is not borrowed",
                    self.describe()
                )));
            }
            lifecycle.borrowed = false;
            lifecycle.state = SessionState::Deactivated;
            lifecycle.current.replace(owner)
        };

        if let Some(borrower) = borrower.as_ref().and_then(ContextRef::upgrade) {
            borrower.sessions().forget(self.id);
        }
        debug!(session_id = %self.id, resource = %self.describe(), "Session returned to owner");
        self.publish(SessionEventKind::Returned);
        self.publish(SessionEventKind::Deactivated);
        Ok(())
    }

    pub(crate) fn bind_pool(&self, pool: Weak<SessionPool>) -> Result<()> {
        self.pool
            .set(pool)
            .map_err(|_| SessionError::validation(format!("{} already belongs to a pool", self.describe())))
    }

    pub(crate) fn pool(&self) -> Option<Arc<SessionPool>> {
        self.pool.get().and_then(Weak::upgrade)
    }

    pub(crate) fn belongs_to_pool(&self, pool: &SessionPool) -> bool {
        self.pool
            .get()
            .is_some_and(|bound| std::ptr::eq(bound.as_ptr(), pool))
    }

    /// Checks the session out of its pool for `context`.
    pub(crate) fn mark_taken_from_pool(&self, context: &Arc<ExecutionContext>) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            if self.mode != SessionMode::Pool {
                return Err(SessionError::validation(format!(
                    "{} is not a pool session",
                    self.describe()
                )));
            }
            if lifecycle.taken_from_pool {
                return Err(SessionError::validation(format!(
                    "{} is already checked out",
                    self.describe()
                )));
            }
            lifecycle.taken_from_pool = true;
            lifecycle.state = SessionState::Active;
            lifecycle.current = Some(ContextRef::new(context));
        }
        self.publish(SessionEventKind::TakenFromPool {
            context_id: context.id(),
        });
        Ok(())
    }

    /// Clears the checkout and moves usage rights back to the pool's owner.
    pub(crate) fn release_to_pool(&self) -> Result<()> {
        let owner = self.owner_ref()?.clone();
        let taker = {
            let mut lifecycle = self.lifecycle.lock();
            self.ensure_alive(&lifecycle)?;
            if !lifecycle.taken_from_pool {
                return Err(SessionError::validation(format!(
                    "{} is not checked out",
                    self.describe()
                )));
            }
            lifecycle.taken_from_pool = false;
            lifecycle.state = SessionState::Deactivated;
            lifecycle.current.replace(owner)
        };

        if let Some(taker) = taker.as_ref().and_then(ContextRef::upgrade) {
            taker.sessions().forget(self.id);
        }
        self.publish(SessionEventKind::ReturnedToPool);
        self.publish(SessionEventKind::Deactivated);
        Ok(())
    }

    /// Tears the session down. Only the first call has any effect.
    ///
    /// The session leaves every registry and pool that tracks it before the
    /// resource stop hook runs, so it can no longer be found.
    ///
    /// # Errors
    ///
    /// Returns a teardown error if the stop hook fails. The session is
    /// disposed regardless.
    pub async fn dispose(&self) -> Result<()> {
        let current = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == SessionState::Disposed {
                return Ok(());
            }
            lifecycle.state = SessionState::Disposed;
            lifecycle.borrowed = false;
            lifecycle.taken_from_pool = false;
            lifecycle.current.take()
        };

        let owner = self.owner.get();
        if let Some(context) = owner.and_then(ContextRef::upgrade) {
            context.sessions().forget(self.id);
        }
        if let Some(current) = current.filter(|c| Some(c.id()) != owner.map(ContextRef::id)) {
            if let Some(context) = current.upgrade() {
                context.sessions().forget(self.id);
            }
        }
        if let Some(pool) = self.pool() {
            pool.forget(self.id);
        }

        let result = self
            .resource
            .stop()
            .await
            .map_err(|e| SessionError::teardown_failed(self.describe(), e));

        match &result {
            Ok(()) => debug!(session_id = %self.id, resource = %self.describe(), "Session disposed"),
            Err(e) => warn!(session_id = %self.id, resource = %self.describe(), error = %e, "Session teardown failed"),
        }
        self.publish(SessionEventKind::Disposed);
        result
    }

    pub(crate) fn publish(&self, kind: SessionEventKind) {
        if let Some(owner) = self.owner.get() {
            self.events.publish(&SessionEvent::new(
                kind,
                Some(self.id),
                self.describe(),
                owner.id(),
            ));
        }
    }

    fn owner_ref(&self) -> Result<&ContextRef> {
        self.owner
            .get()
            .ok_or_else(|| SessionError::validation(format!("{} has no owner context", self.describe())))
    }

    fn owner_label(&self) -> String {
        self.owner
            .get()
            .map_or_else(|| "no context".to_string(), |owner| owner.label().to_string())
    }

    fn ensure_alive(&self, lifecycle: &Lifecycle) -> Result<()> {
        if lifecycle.state == SessionState::Disposed {
            return Err(SessionError::disposed(self.describe()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("resource", &self.describe())
            .field("mode", &self.mode)
            .field("state", &lifecycle.state)
            .field("owner", &self.owner.get().map(ContextRef::id))
            .field("current", &lifecycle.current.as_ref().map(ContextRef::id))
            .field("borrowed", &lifecycle.borrowed)
            .field("taken_from_pool", &lifecycle.taken_from_pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextScope, ExecutionContext};
    use crate::testing::MockResource;

    fn session(mode: SessionMode, resource: Arc<MockResource>) -> Session {
        Session::new(
            SessionKind::of::<MockResource>(),
            Some("main".to_string()),
            mode,
            WaitOptions::default(),
            resource,
            Arc::new(EventBus::new()),
        )
    }

    fn context() -> Arc<ExecutionContext> {
        ExecutionContext::builder(ContextScope::Global, "run").build().unwrap()
    }

    #[tokio::test]
    async fn test_start_activates_and_dispose_stops_once() {
        let resource = Arc::new(MockResource::new());
        let session = session(SessionMode::Own, resource.clone());
        assert_eq!(session.state(), SessionState::Building);

        session.start(&CancellationToken::new()).await.unwrap();
        assert!(session.is_active());
        assert_eq!(resource.start_count(), 1);

        session.dispose().await.unwrap();
        session.dispose().await.unwrap();
        assert!(session.is_disposed());
        assert_eq!(resource.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_after_dispose() {
        let ctx = context();
        let session = session(SessionMode::Shared, Arc::new(MockResource::new()));
        session.assign_to_owner_context(&ctx).unwrap();
        session.dispose().await.unwrap();

        assert!(session.deactivate().unwrap_err().is_disposed());
        assert!(session.reassign_to_owner_context().unwrap_err().is_disposed());
        assert!(session.return_to_owner().unwrap_err().is_disposed());
        assert!(!session.is_usable_by(ctx.id()));
    }

    #[tokio::test]
    async fn test_owner_is_assigned_once() {
        let first = context();
        let second = context();
        let session = session(SessionMode::Own, Arc::new(MockResource::new()));

        session.assign_to_owner_context(&first).unwrap();
        assert_eq!(session.owner_context_id(), Some(first.id()));
        assert!(session.is_usable_by(first.id()));

        assert!(session.assign_to_owner_context(&second).is_err());
        assert_eq!(session.owner_context_id(), Some(first.id()));
    }

    #[tokio::test]
    async fn test_borrow_is_exclusive_and_shared_only() {
        let owner = context();
        let borrower = owner.child(ContextScope::Test, "a").build().unwrap();
        let other = owner.child(ContextScope::Test, "b").build().unwrap();

        let own = session(SessionMode::Own, Arc::new(MockResource::new()));
        own.assign_to_owner_context(&owner).unwrap();
        assert!(!own.try_borrow_to(&borrower));

        let shared = session(SessionMode::Shared, Arc::new(MockResource::new()));
        shared.assign_to_owner_context(&owner).unwrap();
        assert!(!shared.try_borrow_to(&owner));
        assert!(shared.try_borrow_to(&borrower));
        assert!(!shared.try_borrow_to(&other));
        assert!(shared.is_usable_by(borrower.id()));
        assert!(!shared.is_usable_by(owner.id()));

        shared.return_to_owner().unwrap();
        assert_eq!(shared.state(), SessionState::Deactivated);
        assert!(shared.is_usable_by(owner.id()));
        assert!(shared.return_to_owner().is_err());
        assert!(shared.try_borrow_to(&other));
    }

    #[tokio::test]
    async fn test_typed_resource_access() {
        let session = session(SessionMode::Own, Arc::new(MockResource::labelled("chrome")));
        assert_eq!(session.resource::<MockResource>().unwrap().label(), "chrome");
        assert_eq!(session.describe(), "MockResource \"main\"");
        assert!(session.matches(&SessionKind::of::<MockResource>(), None));
        assert!(!session.matches(&SessionKind::of::<MockResource>(), Some("other")));
    }

    #[tokio::test]
    async fn test_failed_stop_still_disposes() {
        let resource = Arc::new(MockResource::failing_stop());
        let session = session(SessionMode::Own, resource.clone());
        session.start(&CancellationToken::new()).await.unwrap();

        let err = session.dispose().await.unwrap_err();
        assert!(matches!(err, SessionError::TeardownFailed { .. }));
        assert!(session.is_disposed());
        assert!(session.dispose().await.is_ok());
        assert_eq!(resource.stop_count(), 1);
    }
}
