//! The server's registry of live sessions: a mutex-guarded map, mutated only
//! on accept (insert) and on session close (remove). Grounded in the
//! teacher's mutex-guarded pool maps (`POOLS: Lazy<ArcSwap<PoolMap>>`) and
//! the original source's `std::set<shared_ptr<ClientSession>>` registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::{Session, SessionId};

#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// A session is in the map iff it is not `CLOSED`; this is the only
    /// insertion point, and it always happens before `Session::run` starts
    /// reading from the socket.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.lock().insert(session.id, session);
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    /// Closes every currently registered session and clears the set.
    /// `Session::request_close` is idempotent, so this is safe to call even
    /// if some sessions are already mid-close from an unrelated path (e.g.
    /// their own idle timeout firing concurrently).
    pub fn close_all(&self) {
        let drained = std::mem::take(&mut *self.sessions.lock());
        for session in drained.into_values() {
            session.request_close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dummy_session() -> Arc<Session> {
        let (tx, _rx) = mpsc::channel(16);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        Arc::new(crate::session::Session::new_for_test(addr, tx, Duration::from_secs(60)))
    }

    #[test]
    fn insert_then_remove_is_idempotent_on_len() {
        let registry = Registry::new();
        let session = dummy_session();
        let id = session.id;
        registry.insert(session);
        assert_eq!(registry.len(), 1);
        registry.remove(id);
        assert_eq!(registry.len(), 0);
        // removing again is a harmless no-op
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn close_all_marks_every_session_closed() {
        let registry = Registry::new();
        let a = dummy_session();
        let b = dummy_session();
        registry.insert(a.clone());
        registry.insert(b.clone());
        registry.close_all();
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(registry.len(), 0);
    }
}
