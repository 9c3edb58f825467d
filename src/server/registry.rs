//! Concurrent `username -> Control` map with replace-and-evict-previous semantics.

use crate::server::control::Control;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lock-guarded map, not a lock-free one: install/takeover is inherently a
/// read-modify-write and P1 (at most one Control per identity) can't be
/// preserved without serializing writers (spec.md §9).
#[derive(Default)]
pub struct Registry {
    inner: RwLock<HashMap<String, Arc<Control>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(&self, username: &str) -> Option<Arc<Control>> {
        self.inner.read().await.get(username).cloned()
    }

    /// Returns the sole registered Control, if and only if exactly one
    /// identity is currently authenticated (spec.md §4.6 step 1). This is
    /// the reference routing rule for public traffic; a multi-identity
    /// deployment needs a different one (see spec.md §9).
    pub async fn sole(&self) -> Option<Arc<Control>> {
        let map = self.inner.read().await;
        let mut iter = map.values();
        let only = iter.next()?;
        if iter.next().is_some() {
            None
        } else {
            Some(only.clone())
        }
    }

    /// Atomically swap in `new`, returning whatever Control previously
    /// occupied `username`. Fires the previous Control's `shutdown` while
    /// still holding the write lock, so no reader can ever observe the new
    /// entry without the old one's shutdown having already fired
    /// (invariant I3).
    pub async fn install(&self, username: String, new: Arc<Control>) -> Option<Arc<Control>> {
        let mut map = self.inner.write().await;
        let previous = map.insert(username, new);
        if let Some(prev) = &previous {
            prev.shutdown.fire();
        }
        previous
    }

    /// Remove `username`'s entry, but only if it still points at `current`.
    ///
    /// A plain unconditional delete would let an old Control's teardown
    /// race a takeover and erase the *new* Control's entry if both happen
    /// to observe `shutdown` around the same moment — violating P1. Using
    /// `Arc::ptr_eq` as a compare-and-delete guard closes that window.
    pub async fn delete_if_current(&self, username: &str, current: &Arc<Control>) {
        let mut map = self.inner.write().await;
        if let Some(existing) = map.get(username) {
            if Arc::ptr_eq(existing, current) {
                map.remove(username);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn dummy_control(username: &str) -> Arc<Control> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        let (_server, _client) = (accept.unwrap().0, connect.unwrap());
        let (_read, write) = _server.into_split();
        Arc::new(Control::new(username.to_string(), 3, write))
    }

    #[tokio::test]
    async fn test_install_then_load() {
        let registry = Registry::new();
        let control = dummy_control("admin").await;
        let previous = registry.install("admin".to_string(), control.clone()).await;
        assert!(previous.is_none());
        let loaded = registry.load("admin").await;
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn test_takeover_fires_previous_shutdown() {
        let registry = Registry::new();
        let first = dummy_control("admin").await;
        registry.install("admin".to_string(), first.clone()).await;
        let second = dummy_control("admin").await;
        let previous = registry.install("admin".to_string(), second.clone()).await;
        assert!(previous.is_some());
        assert!(first.shutdown.is_fired());
        assert!(!second.shutdown.is_fired());
    }

    #[tokio::test]
    async fn test_delete_if_current_ignores_stale_handle() {
        let registry = Registry::new();
        let first = dummy_control("admin").await;
        registry.install("admin".to_string(), first.clone()).await;
        let second = dummy_control("admin").await;
        registry.install("admin".to_string(), second.clone()).await;

        // The old control's teardown path calls this with its own (now
        // stale) handle; it must not evict the new entry.
        registry.delete_if_current("admin", &first).await;
        let loaded = registry.load("admin").await;
        assert!(loaded.is_some());
        assert!(Arc::ptr_eq(&loaded.unwrap(), &second));
    }

    #[tokio::test]
    async fn test_delete_if_current_removes_matching_entry() {
        let registry = Registry::new();
        let control = dummy_control("admin").await;
        registry.install("admin".to_string(), control.clone()).await;
        registry.delete_if_current("admin", &control).await;
        assert!(registry.load("admin").await.is_none());
    }

    #[tokio::test]
    async fn test_sole_requires_exactly_one() {
        let registry = Registry::new();
        assert!(registry.sole().await.is_none());
        let a = dummy_control("a").await;
        registry.install("a".to_string(), a).await;
        assert!(registry.sole().await.is_some());
        let b = dummy_control("b").await;
        registry.install("b".to_string(), b).await;
        assert!(registry.sole().await.is_none());
    }
}
