//! Per-context session registry.

use super::recency::RecencyList;
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::{Result, SessionError};
use crate::ids::SessionId;
use crate::session::{ContextRef, Session, SessionKind, SessionMode};
use crate::wait::RetryWait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct Entries {
    added: Vec<Arc<Session>>,
    recency: RecencyList<SessionId, Arc<Session>>,
    disposed: bool,
}

/// The sessions a context owns or is currently using.
///
/// Keeps two orders: insertion order for positional lookups, and recency for
/// "current session" lookups. Lookups only return sessions the context may
/// use right now, so an owner does not see a shared session while it is lent
/// out.
#[derive(Debug)]
pub struct SessionCollection {
    owner: ContextRef,
    entries: RwLock<Entries>,
}

impl SessionCollection {
    pub(crate) fn new(owner: ContextRef) -> Self {
        Self {
            owner,
            entries: RwLock::new(Entries {
                added: Vec::new(),
                recency: RecencyList::new(),
                disposed: false,
            }),
        }
    }

    /// Returns the number of registered sessions.
    pub fn len(&self) -> usize {
        self.entries.read().recency.len()
    }

    /// Returns true if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the session is registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.entries.read().recency.contains(&id)
    }

    /// Returns true once the registry has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.entries.read().disposed
    }

    /// Snapshot of all registered sessions in insertion order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.entries.read().added.clone()
    }

    /// Snapshot of all registered sessions, most recently used first.
    pub fn by_recency(&self) -> Vec<Arc<Session>> {
        self.entries
            .read()
            .recency
            .iter()
            .map(|(_, session)| session.clone())
            .collect()
    }

    /// Registers a session. New sessions rank as least recently used.
    ///
    /// # Errors
    ///
    /// Fails if the session is already registered or the registry is disposed.
    pub fn add(&self, session: Arc<Session>) -> Result<()> {
        let mut entries = self.entries.write();
        self.ensure_alive(&entries)?;
        if !entries.recency.push_back(session.id(), session.clone()) {
            return Err(SessionError::validation(format!(
                "{} is already registered in {}",
                session.describe(),
                self.owner.label()
            )));
        }
        entries.added.push(session);
        Ok(())
    }

    /// Unregisters a session. Returns false if it was not registered.
    ///
    /// # Errors
    ///
    /// Fails if the registry is disposed.
    pub fn remove(&self, session: &Session) -> Result<bool> {
        let mut entries = self.entries.write();
        self.ensure_alive(&entries)?;
        Ok(Self::remove_entry(&mut entries, session.id()))
    }

    /// Unregisters a session if present, ignoring disposal.
    pub(crate) fn forget(&self, id: SessionId) {
        let mut entries = self.entries.write();
        if !entries.disposed {
            Self::remove_entry(&mut entries, id);
        }
    }

    fn remove_entry(entries: &mut Entries, id: SessionId) -> bool {
        if entries.recency.remove(&id).is_none() {
            return false;
        }
        entries.added.retain(|s| s.id() != id);
        true
    }

    /// Makes a registered session the most recently used one.
    ///
    /// # Errors
    ///
    /// Fails if the session is not registered or the registry is disposed.
    pub fn set_current(&self, id: SessionId) -> Result<()> {
        let mut entries = self.entries.write();
        self.ensure_alive(&entries)?;
        if entries.recency.move_to_front(&id) {
            Ok(())
        } else {
            Err(SessionError::session_not_found(
                format!("session {id}"),
                self.owner.label(),
            ))
        }
    }

    /// Returns the most recently used matching session this context may use.
    ///
    /// # Errors
    ///
    /// Fails with a not-found error naming the resource and this context.
    pub fn get(&self, kind: &SessionKind, name: Option<&str>) -> Result<Arc<Session>> {
        self.get_or_none(kind, name)
            .ok_or_else(|| SessionError::session_not_found(kind.describe(name), self.owner.label()))
    }

    /// Like [`SessionCollection::get`] but returns `None` when nothing matches.
    pub fn get_or_none(&self, kind: &SessionKind, name: Option<&str>) -> Option<Arc<Session>> {
        let entries = self.entries.read();
        entries
            .recency
            .iter()
            .map(|(_, session)| session)
            .find(|s| s.matches(kind, name) && s.is_usable_by(self.owner.id()))
            .cloned()
    }

    /// Returns the `index`-th usable session of a kind in insertion order.
    ///
    /// # Errors
    ///
    /// Fails with a not-found error if there are not enough sessions.
    pub fn get_at(&self, kind: &SessionKind, index: usize) -> Result<Arc<Session>> {
        self.get_at_or_none(kind, index).ok_or_else(|| {
            SessionError::session_not_found(format!("{kind} #{index}"), self.owner.label())
        })
    }

    /// Like [`SessionCollection::get_at`] but returns `None` when out of range.
    pub fn get_at_or_none(&self, kind: &SessionKind, index: usize) -> Option<Arc<Session>> {
        self.entries
            .read()
            .added
            .iter()
            .filter(|s| s.matches(kind, None) && s.is_usable_by(self.owner.id()))
            .nth(index)
            .cloned()
    }

    /// Searches this context and then each ancestor for a usable session.
    ///
    /// # Errors
    ///
    /// Fails with a not-found error naming this context.
    pub fn get_recursively(&self, kind: &SessionKind, name: Option<&str>) -> Result<Arc<Session>> {
        self.get_recursively_or_none(kind, name)
            .ok_or_else(|| SessionError::session_not_found(kind.describe(name), self.owner.label()))
    }

    /// Like [`SessionCollection::get_recursively`] but returns `None`.
    pub fn get_recursively_or_none(&self, kind: &SessionKind, name: Option<&str>) -> Option<Arc<Session>> {
        if let Some(session) = self.get_or_none(kind, name) {
            return Some(session);
        }
        let context = self.owner.upgrade()?;
        context
            .ancestors()
            .find_map(|ancestor| ancestor.sessions().get_or_none(kind, name))
    }

    /// Snapshot of registered sessions accepted by `filter`, whether or not
    /// this context can use them right now.
    pub(crate) fn find_all(&self, mut filter: impl FnMut(&Session) -> bool) -> Vec<Arc<Session>> {
        self.entries
            .read()
            .added
            .iter()
            .filter(|s| filter(s))
            .cloned()
            .collect()
    }

    /// Borrows a shared session from the nearest ancestor that owns one.
    ///
    /// Waits with the session's own timing while every candidate is lent to
    /// another context.
    ///
    /// # Errors
    ///
    /// Not found if no ancestor owns a matching shared session; timeout or
    /// cancellation if none becomes free in time.
    pub async fn borrow_async(
        &self,
        kind: &SessionKind,
        name: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Arc<Session>> {
        let context = self.owner_context()?;
        let resource = kind.describe(name);

        let Some((ancestor, first)) = context.ancestors().find_map(|ancestor| {
            let candidates = shared_candidates(&ancestor, kind, name);
            candidates.first().cloned().map(|first| (ancestor, first))
        }) else {
            return Err(SessionError::session_not_found(resource, context.describe()));
        };

        let waiter = RetryWait::new(first.wait_options());
        let outcome = waiter
            .until_some(
                || {
                    let candidates = shared_candidates(&ancestor, kind, name);
                    if candidates.is_empty() {
                        return Some(Err(SessionError::session_not_found(
                            resource.clone(),
                            context.describe(),
                        )));
                    }
                    candidates
                        .into_iter()
                        .find(|s| s.try_borrow_to(&context))
                        .map(Ok)
                },
                token,
            )
            .await;

        let session = match outcome {
            Some(result) => result?,
            None => return Err(waiter.failure(resource, context.describe(), token)),
        };

        if let Err(e) = self.add(session.clone()) {
            session.return_to_owner()?;
            return Err(e);
        }
        debug!(session_id = %session.id(), owner = %ancestor.describe(), "Borrowed shared session");
        Ok(session)
    }

    /// Builds a session with the matching builder declared in this context.
    ///
    /// # Errors
    ///
    /// Builder not found, a pool-mode builder, or any build failure.
    pub async fn build_async(
        &self,
        kind: &SessionKind,
        name: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Arc<Session>> {
        let context = self.owner_context()?;
        let builder = context
            .find_builder(kind, name)
            .ok_or_else(|| SessionError::builder_not_found(kind.describe(name), context.describe()))?;
        if builder.options().mode == SessionMode::Pool {
            return Err(SessionError::validation(format!(
                "{} is built for a pool; take it from the pool instead",
                kind.describe(name)
            )));
        }
        builder.build(&context, token).await
    }

    /// Checks a session out of the nearest matching pool in this context or
    /// an ancestor, and registers it here.
    ///
    /// # Errors
    ///
    /// Pool not found, or the pool's checkout failure.
    pub async fn take_from_pool_async(
        &self,
        kind: &SessionKind,
        name: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Arc<Session>> {
        let context = self.owner_context()?;
        let pool = std::iter::once(context.clone())
            .chain(context.ancestors())
            .find_map(|c| c.pools().get_or_none(kind, name))
            .ok_or_else(|| SessionError::pool_not_found(kind.describe(name), context.describe()))?;

        let session = pool.get_async(&context, token).await?;
        if let Err(e) = self.add(session.clone()) {
            pool.return_session(&session).await?;
            return Err(e);
        }
        Ok(session)
    }

    /// Hands back a session this context borrowed or took from a pool.
    ///
    /// # Errors
    ///
    /// Fails if this context neither borrowed nor took the session.
    pub async fn release(&self, session: &Arc<Session>) -> Result<()> {
        if !session.is_usable_by(self.owner.id()) {
            return Err(SessionError::validation(format!(
                "{} is not in use by {}",
                session.describe(),
                self.owner.label()
            )));
        }
        if session.is_borrowed() {
            return session.return_to_owner();
        }
        if session.is_taken_from_pool() {
            let pool = session
                .pool()
                .ok_or_else(|| SessionError::disposed(format!("pool of {}", session.describe())))?;
            return pool.return_session(session).await;
        }
        Err(SessionError::validation(format!(
            "{} is neither borrowed nor taken from a pool by {}",
            session.describe(),
            self.owner.label()
        )))
    }

    /// Drops every registration. The sessions themselves are untouched.
    /// Later mutations fail.
    pub fn dispose(&self) {
        let mut entries = self.entries.write();
        if entries.disposed {
            return;
        }
        entries.disposed = true;
        entries.added.clear();
        entries.recency.clear();
    }

    fn owner_context(&self) -> Result<Arc<ExecutionContext>> {
        self.owner
            .upgrade()
            .ok_or_else(|| SessionError::disposed(self.owner.label()))
    }

    fn ensure_alive(&self, entries: &Entries) -> Result<()> {
        if entries.disposed {
            return Err(SessionError::disposed(format!(
                "session registry of {}",
                self.owner.label()
            )));
        }
        Ok(())
    }
}

/// Shared sessions of a kind that `owner` built itself, lent out or not.
fn shared_candidates(
    owner: &Arc<ExecutionContext>,
    kind: &SessionKind,
    name: Option<&str>,
) -> Vec<Arc<Session>> {
    owner.sessions().find_all(|s| {
        s.mode() == SessionMode::Shared
            && s.matches(kind, name)
            && s.owner_context_id() == Some(owner.id())
            && !s.is_disposed()
    })
}
