//! Read-write lock coordinating index readers and writers
//!
//! Any number of concurrent readers or one exclusive writer, never both.
//! Readers do not queue on the writer's mutex: a queue of readers waking
//! one-by-one as the writer releases would serialize reads. Instead readers
//! poll with a fixed short delay until no writer is active; the first reader
//! through takes the underlying mutex on behalf of every concurrent reader,
//! and the last reader out releases it.
//!
//! Known limitation: a continuous stream of overlapping readers can starve
//! a waiting writer indefinitely. Builds are rare relative to queries, so
//! this is accepted.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Delay between reader polls while a writer holds the lock
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Invariants:
/// - if `readers > 0`, the mutex is held by the reader side (`guard` is Some)
/// - if `readers == 0` and the mutex is locked, a writer holds it
pub struct RwLock {
    mu: Arc<Mutex<()>>,
    read_state: StdMutex<ReadState>,
}

struct ReadState {
    readers: usize,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RwLock {
    pub fn new() -> Self {
        Self {
            mu: Arc::new(Mutex::new(())),
            read_state: StdMutex::new(ReadState {
                readers: 0,
                guard: None,
            }),
        }
    }

    /// Run `f` while holding the lock in read mode
    ///
    /// Concurrent `with_read` calls on the same lock proceed in parallel.
    pub async fn with_read<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            {
                // Intentional .unwrap() - poisoned mutex indicates serious bug
                let mut state = self.read_state.lock().unwrap();
                if state.readers > 0 {
                    // Reader side already holds the mutex, just join it
                    state.readers += 1;
                    break;
                }
                match Arc::clone(&self.mu).try_lock_owned() {
                    Ok(guard) => {
                        state.guard = Some(guard);
                        state.readers = 1;
                        break;
                    }
                    Err(_) => {
                        // A writer is active; fall through to the poll delay
                    }
                }
            }
            tokio::time::sleep(READ_POLL_INTERVAL).await;
        }

        let result = f().await;

        let mut state = self.read_state.lock().unwrap();
        state.readers -= 1;
        if state.readers == 0 {
            // Last reader out releases the mutex
            state.guard = None;
        }
        result
    }

    /// Run `f` while holding the lock exclusively
    pub async fn with_write<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.mu.lock().await;
        f().await
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
