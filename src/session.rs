//! Shared remote session slot
//!
//! Logging in to the groupware backend is slow, so test cases share one
//! session per process. The testkit only holds the slot; the session
//! type and its construction belong to the code under test.

use crate::error::Result;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A backend session that test cases can share.
pub trait RemoteSession: Any + Send + Sync {
    /// Expired sessions are discarded by the slot on next access.
    fn is_expired(&self) -> bool {
        false
    }
}

type SharedSession = Arc<dyn RemoteSession + Send + Sync>;

#[derive(Default)]
pub struct SessionSlot {
    inner: Mutex<Option<SharedSession>>,
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("occupied", &self.lock().is_some())
            .finish()
    }
}

impl SessionSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SharedSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session if it is live and of type `S`.
    #[must_use]
    pub fn get<S: RemoteSession>(&self) -> Option<Arc<S>> {
        let mut slot = self.lock();
        live(&mut slot).and_then(downcast::<S>)
    }

    /// Store `session`, returning the previous occupant.
    pub fn set<S: RemoteSession>(&self, session: Arc<S>) -> Option<SharedSession> {
        self.lock().replace(session)
    }

    /// Empty the slot.
    pub fn clear(&self) -> Option<SharedSession> {
        self.lock().take()
    }

    /// Return the live session of type `S`, or create one with `connect`.
    ///
    /// The slot stays locked while `connect` runs, so concurrent callers
    /// never open two sessions. A failed `connect` leaves the slot empty.
    ///
    /// # Errors
    ///
    /// Returns whatever `connect` fails with.
    pub fn get_or_try_connect<S, F>(&self, connect: F) -> Result<Arc<S>>
    where
        S: RemoteSession,
        F: FnOnce() -> Result<S>,
    {
        let mut slot = self.lock();
        if let Some(existing) = live(&mut slot).and_then(downcast::<S>) {
            debug!("Reusing shared remote session");
            return Ok(existing);
        }

        let session = Arc::new(connect()?);
        debug!("Opened shared remote session");
        *slot = Some(Arc::clone(&session) as SharedSession);
        Ok(session)
    }
}

fn live(slot: &mut Option<SharedSession>) -> Option<SharedSession> {
    if slot.as_ref().is_some_and(|s| s.is_expired()) {
        debug!("Dropping expired remote session");
        *slot = None;
    }
    slot.clone()
}

fn downcast<S: RemoteSession>(session: SharedSession) -> Option<Arc<S>> {
    let any: Arc<dyn Any + Send + Sync> = session;
    any.downcast::<S>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeSession {
        expired: AtomicBool,
    }

    impl RemoteSession for FakeSession {
        fn is_expired(&self) -> bool {
            self.expired.load(Ordering::SeqCst)
        }
    }

    struct OtherSession;
    impl RemoteSession for OtherSession {}

    #[test]
    fn empty_slot_has_no_session() {
        let slot = SessionSlot::new();
        assert!(slot.get::<FakeSession>().is_none());
    }

    #[test]
    fn connect_runs_once_while_session_is_live() {
        let slot = SessionSlot::new();
        let calls = AtomicUsize::new(0);
        let connect = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession::default())
        };

        let first = slot.get_or_try_connect(connect).unwrap();
        let second = slot.get_or_try_connect(connect).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_session_is_replaced() {
        let slot = SessionSlot::new();
        let first = slot
            .get_or_try_connect(|| Ok(FakeSession::default()))
            .unwrap();
        first.expired.store(true, Ordering::SeqCst);

        assert!(slot.get::<FakeSession>().is_none());
        let second = slot
            .get_or_try_connect(|| Ok(FakeSession::default()))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_connect_leaves_slot_empty() {
        let slot = SessionSlot::new();
        let err = slot
            .get_or_try_connect::<FakeSession, _>(|| Err(Error::Config("no backend".into())))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(slot.get::<FakeSession>().is_none());
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let slot = SessionSlot::new();
        slot.set(Arc::new(OtherSession));
        assert!(slot.get::<FakeSession>().is_none());
        assert!(slot.get::<OtherSession>().is_some());
    }

    #[test]
    fn clear_returns_previous() {
        let slot = SessionSlot::new();
        slot.set(Arc::new(OtherSession));
        assert!(slot.clear().is_some());
        assert!(slot.clear().is_none());
    }
}
