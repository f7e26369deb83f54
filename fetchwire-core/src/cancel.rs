//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is threaded through every suspension point of a
//! request: pool acquisition, connect, write and each socket read. Each of
//! those races its work against [`CancellationToken::cancelled`] and aborts
//! with the token's reason as soon as it fires.
//!
//! Tokens compose. [`CancellationToken::linked`] builds a token that fires
//! when any of its parents fires, carrying that parent's reason, and
//! [`CancellationToken::derive`] adds a timer on top, which is how transfer
//! timeouts are expressed:
//!
//! ```ignore
//! let caller = CancellationToken::new();
//! let attempt = caller.derive(Some(Duration::from_secs(30)));
//!
//! tokio::select! {
//!     reason = attempt.cancelled() => return Err(reason),
//!     res = write_request(&mut socket) => res?,
//! }
//! ```
//!
//! The first cause wins: once a token has fired its reason never changes.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Error;

struct Inner {
    reason: watch::Sender<Option<Error>>,
    children: Mutex<Vec<(u64, Weak<Inner>)>>,
    next_link: AtomicU64,
}

impl Inner {
    fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            reason,
            children: Mutex::new(Vec::new()),
            next_link: AtomicU64::new(0),
        }
    }

    fn fire(&self, reason: Error) {
        let fired = self.reason.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.clone());
                true
            } else {
                false
            }
        });
        if !fired {
            return;
        }

        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(|e| e.into_inner()));
        for (_, child) in children {
            if let Some(child) = child.upgrade() {
                child.fire(reason.clone());
            }
        }
    }

    fn reason(&self) -> Option<Error> {
        self.reason.borrow().clone()
    }
}

/// A cloneable handle used to cancel in-flight work.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Fire the token with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.inner.fire(Error::Cancelled);
    }

    /// Fire the token with a specific reason. Has no effect if the token has
    /// already fired.
    pub fn cancel_with(&self, reason: Error) {
        self.inner.fire(reason);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.borrow().is_some()
    }

    /// The error the token fired with, if it has fired.
    pub fn reason(&self) -> Option<Error> {
        self.inner.reason()
    }

    /// Return the reason as an error if the token has fired.
    pub fn check(&self) -> Result<(), Error> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Wait until the token fires and return its reason.
    pub async fn cancelled(&self) -> Error {
        let mut rx = self.inner.reason.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.unwrap_or(Error::Cancelled)
    }

    /// Build a token that fires when any of `parents` fires.
    ///
    /// If a parent has already fired, the returned token starts out fired
    /// with that parent's reason.
    pub fn linked(parents: &[&CancellationToken]) -> LinkedToken {
        let token = CancellationToken::new();
        let mut links = Vec::with_capacity(parents.len());

        for parent in parents {
            let mut children = parent
                .inner
                .children
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(reason) = parent.inner.reason() {
                drop(children);
                token.inner.fire(reason);
                break;
            }
            let id = parent.inner.next_link.fetch_add(1, Ordering::Relaxed);
            children.push((id, Arc::downgrade(&token.inner)));
            links.push((Arc::downgrade(&parent.inner), id));
        }

        LinkedToken {
            token,
            links,
            timer: None,
        }
    }

    /// A child token that fires when this one fires.
    pub fn child(&self) -> LinkedToken {
        Self::linked(&[self])
    }

    /// A child token that additionally fires with [`Error::Timeout`] once
    /// `timeout` elapses.
    ///
    /// The timer runs on the current tokio runtime. Outside a runtime the
    /// timeout is not armed.
    pub fn derive(&self, timeout: Option<Duration>) -> LinkedToken {
        let mut linked = self.child();
        if let Some(timeout) = timeout {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let weak = Arc::downgrade(&linked.token.inner);
                linked.timer = Some(handle.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire(Error::Timeout(timeout));
                    }
                }));
            }
        }
        linked
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}

/// A token subscribed to one or more parents.
///
/// Dropping it unsubscribes from every parent and stops its timer, if any.
pub struct LinkedToken {
    token: CancellationToken,
    links: Vec<(Weak<Inner>, u64)>,
    timer: Option<JoinHandle<()>>,
}

impl LinkedToken {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Deref for LinkedToken {
    type Target = CancellationToken;

    fn deref(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for LinkedToken {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        for (parent, id) in self.links.drain(..) {
            if let Some(parent) = parent.upgrade() {
                parent
                    .children
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .retain(|(link, _)| *link != id);
            }
        }
    }
}

impl fmt::Debug for LinkedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedToken")
            .field("reason", &self.token.reason())
            .field("parents", &self.links.len())
            .field("timer", &self.timer.is_some())
            .finish()
    }
}
