//! Deduplicated handle storage: at most one live handle per
//! (kind, fingerprint). The three kind namespaces are independent, so a
//! counter and a timer may share a fingerprint without colliding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::connection::Connection;
use crate::handles::{CounterHandle, RecorderHandle, TimerHandle};

#[derive(Default)]
struct Maps {
    counters: HashMap<String, CounterHandle>,
    recorders: HashMap<String, RecorderHandle>,
    timers: HashMap<String, TimerHandle>,
}

/// One lock covers all three maps; lookup and insert are atomic as a unit,
/// so two concurrent makes for the same fingerprint cannot both insert.
pub(crate) struct Registry {
    maps: Mutex<Maps>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            maps: Mutex::new(Maps::default()),
        }
    }

    pub(crate) fn counter(
        &self,
        fingerprint: String,
        connection: &Arc<Connection>,
    ) -> CounterHandle {
        let mut maps = self.maps.lock().unwrap();
        maps.counters
            .entry(fingerprint)
            .or_insert_with_key(|fp| CounterHandle::new(fp.clone(), Arc::clone(connection)))
            .clone()
    }

    pub(crate) fn recorder(
        &self,
        fingerprint: String,
        connection: &Arc<Connection>,
        aggregate: bool,
    ) -> RecorderHandle {
        let mut maps = self.maps.lock().unwrap();
        maps.recorders
            .entry(fingerprint)
            .or_insert_with_key(|fp| RecorderHandle::new(fp.clone(), Arc::clone(connection), aggregate))
            .clone()
    }

    pub(crate) fn timer(&self, fingerprint: String, connection: &Arc<Connection>) -> TimerHandle {
        let mut maps = self.maps.lock().unwrap();
        maps.timers
            .entry(fingerprint)
            .or_insert_with_key(|fp| TimerHandle::new(fp.clone(), Arc::clone(connection)))
            .clone()
    }

    /// Removes the entry for the handle's fingerprint, but only when the
    /// stored handle is the same instance. Unknown or foreign handles are a
    /// silent no-op.
    pub(crate) fn destroy_counter(&self, handle: &CounterHandle) {
        let mut maps = self.maps.lock().unwrap();
        if maps
            .counters
            .get(handle.fingerprint())
            .is_some_and(|existing| existing.is_same(handle))
        {
            maps.counters.remove(handle.fingerprint());
        }
    }

    pub(crate) fn destroy_recorder(&self, handle: &RecorderHandle) {
        let mut maps = self.maps.lock().unwrap();
        if maps
            .recorders
            .get(handle.fingerprint())
            .is_some_and(|existing| existing.is_same(handle))
        {
            maps.recorders.remove(handle.fingerprint());
        }
    }

    pub(crate) fn destroy_timer(&self, handle: &TimerHandle) {
        let mut maps = self.maps.lock().unwrap();
        if maps
            .timers
            .get(handle.fingerprint())
            .is_some_and(|existing| existing.is_same(handle))
        {
            maps.timers.remove(handle.fingerprint());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::thread;

    fn connection() -> Arc<Connection> {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        Arc::new(Connection::new(addr).unwrap())
    }

    #[test]
    fn make_reuses_the_live_handle() {
        let conn = connection();
        let registry = Registry::new();
        let a = registry.counter("x".to_string(), &conn);
        let b = registry.counter("x".to_string(), &conn);
        assert!(a.is_same(&b));
    }

    #[test]
    fn kind_namespaces_are_independent() {
        let conn = connection();
        let registry = Registry::new();
        let counter = registry.counter("x".to_string(), &conn);
        let timer = registry.timer("x".to_string(), &conn);
        assert_eq!(counter.fingerprint(), timer.fingerprint());
    }

    #[test]
    fn destroy_then_make_yields_a_fresh_handle() {
        let conn = connection();
        let registry = Registry::new();
        let first = registry.counter("x".to_string(), &conn);
        first.increment(5);
        assert_eq!(first.value(), 5);

        registry.destroy_counter(&first);
        let second = registry.counter("x".to_string(), &conn);
        assert!(!first.is_same(&second));
        assert_eq!(second.value(), 0);
    }

    #[test]
    fn destroying_twice_is_a_silent_noop() {
        let conn = connection();
        let registry = Registry::new();
        let handle = registry.timer("t".to_string(), &conn);
        registry.destroy_timer(&handle);
        registry.destroy_timer(&handle);
    }

    #[test]
    fn stale_destroy_does_not_evict_the_replacement() {
        let conn = connection();
        let registry = Registry::new();
        let first = registry.recorder("r".to_string(), &conn, false);
        registry.destroy_recorder(&first);
        let second = registry.recorder("r".to_string(), &conn, false);

        // A second destroy through the stale handle must leave the new
        // instance in place.
        registry.destroy_recorder(&first);
        let third = registry.recorder("r".to_string(), &conn, false);
        assert!(second.is_same(&third));
    }

    #[test]
    fn concurrent_makes_agree_on_one_instance() {
        let conn = connection();
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let conn = Arc::clone(&conn);
                thread::spawn(move || registry.counter("shared".to_string(), &conn))
            })
            .collect();
        let handles: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
        for handle in &handles[1..] {
            assert!(handles[0].is_same(handle));
        }
    }
}
