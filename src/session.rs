//! Per-connection session state and the server-side state machine (spec
//! §4.8, §4.13).
//!
//! Grounded on the teacher's `archive::Archive` (owns its buffers
//! exclusively, one instance per pack/unpack operation) for the "session
//! owns everything it touches, nothing is shared" shape, and on
//! `MarkusSprunck-openethereum`'s use of `parking_lot::Mutex` for the
//! tenant-lock table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::Container;
use crate::crypto::IvCounter;
use crate::error::SessionError;
use crate::types::{ChunkFlag, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    SessionKey,
    Active(SessionMode),
    Closed,
}

/// Per-session scratch state, owned exclusively by one connection (spec
/// §4.13). Created on login, destroyed on disconnect.
pub struct ClientSession {
    pub client_id: u32,
    pub state: SessionState,
    pub master_key: [u8; 32],
    pub session_key: [u8; 16],
    pub iv_counter: IvCounter,
    pub current_container: Option<Container>,
    pub recv_buffer: Vec<u8>,
    pub local_batch_map: HashMap<Fingerprint, (usize, ChunkFlag)>,
}

impl ClientSession {
    pub fn new(client_id: u32, master_key: [u8; 32], session_key: [u8; 16]) -> Self {
        ClientSession {
            client_id,
            state: SessionState::Start,
            master_key,
            session_key,
            iv_counter: IvCounter::new(),
            current_container: None,
            recv_buffer: Vec::new(),
            local_batch_map: HashMap::new(),
        }
    }
}

/// Process-wide `client_id -> mutex` map granting one exclusive lease per
/// tenant for the duration of a session's post-login phase (spec §4.8 I5).
#[derive(Default)]
pub struct TenantLockTable {
    locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl TenantLockTable {
    pub fn new() -> Self {
        TenantLockTable::default()
    }

    fn lock_for(&self, client_id: u32) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        match locks.entry(client_id) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let lock = Arc::new(Mutex::new(()));
                e.insert(lock.clone());
                lock
            }
        }
    }

    /// Try to acquire the tenant's lease without blocking. Used only to
    /// detect and log contention; callers that need the actual exclusion
    /// guarantee must fall back to [`acquire`](Self::acquire).
    pub fn try_acquire(&self, client_id: u32) -> Result<TenantLease, SessionError> {
        let lock = self.lock_for(client_id);
        lock.try_lock_arc()
            .map(|guard| TenantLease { _guard: guard })
            .ok_or(SessionError::ConcurrencyError(client_id))
    }

    /// Acquire the tenant's lease, blocking until any other connection with
    /// the same `client_id` releases it (spec §4.8: "a second connection
    /// with the same id blocks until the first finishes"). The caller holds
    /// the returned guard for the whole post-login phase.
    pub fn acquire(&self, client_id: u32) -> TenantLease {
        let lock = self.lock_for(client_id);
        TenantLease { _guard: lock.lock_arc() }
    }
}

/// RAII guard releasing the tenant lock when the session ends.
pub struct TenantLease {
    _guard: parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn try_acquire_reports_contention_without_blocking() {
        let table = TenantLockTable::new();
        let first = table.try_acquire(42).unwrap();
        assert!(matches!(table.try_acquire(42), Err(SessionError::ConcurrencyError(42))));
        drop(first);
        assert!(table.try_acquire(42).is_ok());
    }

    #[test]
    fn second_connection_with_same_client_id_blocks_then_proceeds() {
        let table = StdArc::new(TenantLockTable::new());
        let first = table.acquire(7);
        let released = StdArc::new(AtomicBool::new(false));

        let waiter_table = StdArc::clone(&table);
        let waiter_released = StdArc::clone(&released);
        let waiter = thread::spawn(move || {
            let _second = waiter_table.acquire(7);
            assert!(waiter_released.load(Ordering::SeqCst), "acquire returned before the first lease was released");
        });

        thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(first);
        waiter.join().unwrap();
    }

    #[test]
    fn distinct_client_ids_do_not_contend() {
        let table = TenantLockTable::new();
        let _a = table.try_acquire(1).unwrap();
        let _b = table.try_acquire(2).unwrap();
    }
}
