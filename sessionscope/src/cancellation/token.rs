//! Cooperative cancellation for session waits and context teardown.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications, given the cancel reason.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Signals that pending session waits should give up.
///
/// Each execution context owns one token and cancels it on disposal; the
/// first reason given is the one reported. Tokens form a tree: cancelling a parent cancels every child created with
/// [`CancellationToken::child_token`], never the other way round.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    /// Drained by the first `cancel`.
    callbacks: RwLock<Vec<CancelCallback>>,
    /// Linked child tokens. Dropped and already-cancelled children are
    /// pruned whenever a new child is linked.
    children: Mutex<Vec<Weak<CancellationToken>>>,
    /// Wakes tasks suspended in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl CancellationToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever `self` is cancelled.
    ///
    /// The parent only keeps a weak reference to the child.
    #[must_use]
    pub fn child_token(&self) -> Arc<Self> {
        let child = Arc::new(Self::new());

        let mut children = self.children.lock();
        // Checked under the lock: `cancel` sets the flag before draining.
        if self.is_cancelled() {
            drop(children);
            child.cancel(self.reason().unwrap_or_default());
            return child;
        }
        children.retain(|c| c.upgrade().is_some_and(|c| !c.is_cancelled()));
        children.push(Arc::downgrade(&child));
        drop(children);

        child
    }

    /// Number of child tokens still linked to this one.
    #[must_use]
    pub fn linked_children(&self) -> usize {
        self.children.lock().len()
    }

    /// Fires the token, waking every waiter and running callbacks inline.
    ///
    /// Later calls are ignored. A panicking callback is logged and skipped.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut reason_slot = self.reason.write();
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            *reason_slot = Some(reason.clone());
            drop(reason_slot);
            self.notify.notify_waiters();

            let children = std::mem::take(&mut *self.children.lock());
            for child in children.iter().filter_map(Weak::upgrade) {
                child.cancel(reason.as_str());
            }

            let callbacks = std::mem::take(&mut *self.callbacks.write());
            for callback in &callbacks {
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(&reason);
                })) {
                    warn!(error = ?e, "Cancel callback panicked");
                }
            }
        }
    }

    /// Runs `callback` when the token fires, or right away if it already has.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(Box::new(move |_reason: &str| callback()));
    }

    fn register(&self, callback: CancelCallback) {
        let mut callbacks = self.callbacks.write();
        // Checked under the write lock so a concurrent `cancel` cannot drain
        // the list between the check and the push.
        if !self.is_cancelled() {
            callbacks.push(callback);
            return;
        }
        drop(callbacks);

        let reason = self.reason().unwrap_or_default();
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(&reason);
        })) {
            warn!(error = ?e, "Cancel callback panicked");
        }
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The reason passed to the first `cancel`.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Resolves when the token fires.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }

            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);

        token.cancel("suite 'checkout' disposed");
        token.cancel("global 'run' disposed");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("suite 'checkout' disposed"));
    }

    #[test]
    fn test_on_cancel_runs_once_or_immediately() {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let early = fired.clone();
        token.on_cancel(move || {
            early.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel("teardown");
        token.cancel("teardown again");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let late = fired.clone();
        token.on_cancel(move || {
            late.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let token = CancellationToken::new();
        let reached = Arc::new(AtomicUsize::new(0));
        token.on_cancel(|| panic!("callback failure"));
        let after = reached.clone();
        token.on_cancel(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("teardown");
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());

        parent.cancel("suite finished");
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel("test aborted");
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel("done");

        let child = parent.child_token();
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some("done".to_string()));
    }

    #[test]
    fn test_finished_children_are_unlinked() {
        let root = CancellationToken::new();
        for _ in 0..1000 {
            let child = root.child_token();
            child.cancel("test finished");
        }
        assert!(root.linked_children() <= 1);

        let dropped = root.child_token();
        drop(dropped);
        let live = root.child_token();
        assert_eq!(root.linked_children(), 1);

        root.cancel("run finished");
        assert!(live.is_cancelled());
        assert_eq!(root.linked_children(), 0);
    }

    #[test]
    fn test_cancelled_future_pending_until_cancel() {
        use tokio_test::{assert_pending, assert_ready, task};

        let token = CancellationToken::new();
        let mut waiter = task::spawn(token.cancelled());
        assert_pending!(waiter.poll());

        token.cancel("done");
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = Arc::new(CancellationToken::new());
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel("wake up");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
