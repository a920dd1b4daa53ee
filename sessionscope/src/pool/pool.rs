//! A bounded pool of pre-built sessions.

use super::PoolOptions;
use crate::builder::SessionBuilder;
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::{Result, SessionError};
use crate::events::{EventBus, SessionEvent, SessionEventKind};
use crate::ids::SessionId;
use crate::session::{ContextRef, Session, SessionKind, SessionMode};
use crate::wait::{RetryWait, WaitOptions};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Identity of a pool within a context: resource kind plus optional name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    /// The resource kind.
    pub kind: SessionKind,
    /// The optional session name.
    pub name: Option<String>,
}

impl PoolKey {
    /// Creates a key.
    #[must_use]
    pub fn new(kind: SessionKind, name: Option<String>) -> Self {
        Self { kind, name }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind.describe(self.name.as_deref()))
    }
}

enum Acquired {
    Idle(Arc<Session>),
    Reserved,
    Disposed,
}

/// A bounded set of interchangeable pool-mode sessions.
///
/// Idle sessions wait in a FIFO queue. The built count tracks every live
/// session the pool created, idle or checked out, and never exceeds the
/// maximum capacity for longer than a failed reservation takes to roll back.
pub struct SessionPool {
    key: PoolKey,
    owner: ContextRef,
    builder: Arc<dyn SessionBuilder>,
    options: PoolOptions,
    wait: WaitOptions,
    events: Arc<EventBus>,
    idle: Mutex<VecDeque<Arc<Session>>>,
    sessions: Mutex<Vec<Arc<Session>>>,
    built: AtomicUsize,
    disposed: AtomicBool,
    self_ref: Weak<SessionPool>,
}

impl SessionPool {
    /// Creates an empty pool owned by `owner` that builds with `builder`.
    ///
    /// # Errors
    ///
    /// Fails if the builder is not in pool mode or its options are invalid.
    pub fn new(owner: &Arc<ExecutionContext>, builder: Arc<dyn SessionBuilder>) -> Result<Arc<Self>> {
        let options = builder.options();
        options.validate()?;
        if options.mode != SessionMode::Pool {
            return Err(SessionError::validation(format!(
                "{} builder must use pool mode to back a pool",
                builder.kind().describe(options.name.as_deref())
            )));
        }

        let key = PoolKey::new(builder.kind(), options.name.clone());
        let pool_options = options.pool;
        let wait = options.wait;
        Ok(Arc::new_cyclic(|self_ref| Self {
            key,
            owner: ContextRef::new(owner),
            builder,
            options: pool_options,
            wait,
            events: owner.events().clone(),
            idle: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(Vec::new()),
            built: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    /// Returns the pool key.
    pub const fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Returns the capacity options.
    pub const fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Describes the pool for messages, e.g. `pool of Browser "main"`.
    pub fn describe(&self) -> String {
        format!("pool of {}", self.key)
    }

    /// Upper bound on live sessions.
    pub const fn max_capacity(&self) -> usize {
        self.options.max_capacity
    }

    /// Number of live sessions the pool has built, idle or checked out.
    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    /// Number of idle sessions.
    pub fn queued_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns true once the pool has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Checks a session out for `taker`.
    ///
    /// Takes an idle session if one is queued, builds one if capacity
    /// remains, and otherwise waits for a return.
    ///
    /// # Errors
    ///
    /// Timeout or cancellation while waiting, a build failure, or disposal.
    pub async fn get_async(&self, taker: &Arc<ExecutionContext>, token: &CancellationToken) -> Result<Arc<Session>> {
        let acquired = match self.try_acquire() {
            Some(acquired) => acquired,
            None => {
                debug!(pool = %self.key, taker = %taker.describe(), "Pool exhausted, waiting for a return");
                let waiter = RetryWait::new(self.wait);
                waiter
                    .until_some(|| self.try_acquire(), token)
                    .await
                    .ok_or_else(|| waiter.failure(self.key.to_string(), taker.describe(), token))?
            }
        };

        let session = match acquired {
            Acquired::Idle(session) => session,
            Acquired::Reserved => self.build_reserved(token).await?,
            Acquired::Disposed => return Err(SessionError::disposed(self.describe())),
        };
        session.mark_taken_from_pool(taker)?;
        debug!(pool = %self.key, session_id = %session.id(), taker = %taker.describe(), "Session taken from pool");
        Ok(session)
    }

    /// Builds up to `count` idle sessions.
    ///
    /// Sessions built before a failure stay queued. Returns the number built.
    ///
    /// # Errors
    ///
    /// A capacity error once the pool is full, or the first build failure.
    pub async fn fill_async(&self, count: usize, in_parallel: bool, token: &CancellationToken) -> Result<usize> {
        self.ensure_alive()?;
        if count == 0 {
            return Ok(0);
        }

        let results = if in_parallel {
            join_all((0..count).map(|_| self.fill_one(token))).await
        } else {
            let mut results = Vec::with_capacity(count);
            for _ in 0..count {
                let result = self.fill_one(token).await;
                let failed = result.is_err();
                results.push(result);
                if failed {
                    break;
                }
            }
            results
        };

        let built = results.iter().filter(|r| r.is_ok()).count();
        self.publish(SessionEventKind::PoolFilled { built });
        info!(pool = %self.key, requested = count, built, in_parallel, "Pool filled");

        match results.into_iter().find_map(std::result::Result::err) {
            Some(e) => Err(e),
            None => Ok(built),
        }
    }

    /// Returns a checked-out session to the idle queue.
    ///
    /// If the pool has been disposed meanwhile, the session is disposed
    /// instead.
    ///
    /// # Errors
    ///
    /// Fails if the session was not built by this pool or is not checked out.
    pub async fn return_session(&self, session: &Arc<Session>) -> Result<()> {
        if !session.belongs_to_pool(self) || session.owner_context_id() != Some(self.owner.id()) {
            return Err(SessionError::validation(format!(
                "{} does not belong to the {}",
                session.describe(),
                self.describe()
            )));
        }
        session.release_to_pool()?;

        if self.is_disposed() {
            return session.dispose().await;
        }
        self.idle.lock().push_back(session.clone());
        debug!(pool = %self.key, session_id = %session.id(), "Session returned to pool");
        Ok(())
    }

    /// Disposes every session the pool built, idle or checked out.
    ///
    /// Teardown failures are collected; the remaining sessions are still
    /// disposed.
    pub async fn dispose(&self) -> Vec<SessionError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        self.idle.lock().clear();
        let sessions = std::mem::take(&mut *self.sessions.lock());
        self.built.store(0, Ordering::SeqCst);

        let mut failures = Vec::new();
        for session in sessions {
            if let Err(e) = session.dispose().await {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            debug!(pool = %self.key, "Pool disposed");
        } else {
            warn!(pool = %self.key, failures = failures.len(), "Pool disposed with teardown failures");
        }
        failures
    }

    /// Drops a disposed session from the pool's bookkeeping.
    pub(crate) fn forget(&self, id: SessionId) {
        self.idle.lock().retain(|s| s.id() != id);
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|s| s.id() != id);
        if sessions.len() < before {
            self.release_slot();
        }
    }

    fn release_slot(&self) {
        // Saturating: disposal may already have reset the count.
        let _ = self
            .built
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn try_acquire(&self) -> Option<Acquired> {
        if self.is_disposed() {
            return Some(Acquired::Disposed);
        }
        if let Some(session) = self.idle.lock().pop_front() {
            return Some(Acquired::Idle(session));
        }
        self.try_reserve().then_some(Acquired::Reserved)
    }

    /// Claims one unit of capacity without ever letting concurrent claims
    /// settle above the maximum.
    fn try_reserve(&self) -> bool {
        let claimed = self.built.fetch_add(1, Ordering::SeqCst) + 1;
        if claimed <= self.options.max_capacity {
            true
        } else {
            self.release_slot();
            false
        }
    }

    async fn fill_one(&self, token: &CancellationToken) -> Result<()> {
        if !self.try_reserve() {
            return Err(SessionError::capacity(
                self.key.to_string(),
                format!("cannot hold more than {} sessions", self.options.max_capacity),
            ));
        }
        let session = self.build_reserved(token).await?;
        session.deactivate()?;
        self.idle.lock().push_back(session);
        Ok(())
    }

    /// Builds a session against an already reserved slot.
    async fn build_reserved(&self, token: &CancellationToken) -> Result<Arc<Session>> {
        let Some(owner) = self.owner.upgrade() else {
            self.release_slot();
            return Err(SessionError::disposed(self.owner.label()));
        };

        let session = match self.builder.build(&owner, token).await {
            Ok(session) => session,
            Err(e) => {
                self.release_slot();
                warn!(pool = %self.key, error = %e, "Pool session build failed");
                return Err(e);
            }
        };

        session.bind_pool(self.self_ref.clone())?;
        self.sessions.lock().push(session.clone());
        if self.is_disposed() {
            session.dispose().await?;
            return Err(SessionError::disposed(self.describe()));
        }
        Ok(session)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SessionError::disposed(self.describe()));
        }
        Ok(())
    }

    fn publish(&self, kind: SessionEventKind) {
        self.events
            .publish(&SessionEvent::new(kind, None, self.key.to_string(), self.owner.id()));
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("key", &self.key)
            .field("owner", &self.owner.id())
            .field("options", &self.options)
            .field("built", &self.built_count())
            .field("queued", &self.queued_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
