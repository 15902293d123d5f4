//! Fair coordination slot for the single-writer discipline.
//!
//! One `WriteSlot` exists per document. Every engine transaction (read or
//! write) is opened while holding the slot, which serializes access the way
//! the engine demands. Contended acquisitions park in a single FIFO queue
//! that mixes two kinds of waiters: OS threads parked on a condition
//! variable, and cooperative tasks parked on a oneshot wakeup. Release hands
//! the slot to the longest-waiting live waiter, regardless of kind.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::TransactionError;

pub(crate) struct WriteSlot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    held: bool,
    /// Thread currently holding the slot; `None` when free or when the
    /// holder is a cooperative task.
    holder: Option<ThreadId>,
    /// Monotonic waiter tokens, used to remove abandoned entries.
    next_token: u64,
    queue: VecDeque<Waiter>,
}

struct Waiter {
    token: u64,
    kind: WaiterKind,
}

enum WaiterKind {
    Thread(Arc<ThreadWaiter>),
    Task(oneshot::Sender<()>),
}

struct ThreadWaiter {
    thread: ThreadId,
    grant: Mutex<Grant>,
    cv: Condvar,
}

#[derive(Debug, PartialEq, Eq)]
enum Grant {
    Waiting,
    Granted,
    Abandoned,
}

impl WriteSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(WriteSlot {
            state: Mutex::new(SlotState::default()),
        })
    }

    /// Acquire the slot if it is free, without waiting.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        let mut state = self.state.lock().unwrap();
        if state.held {
            return None;
        }
        state.held = true;
        state.holder = Some(thread::current().id());
        trace!("write slot acquired");
        Some(SlotPermit {
            slot: Arc::clone(self),
        })
    }

    /// Whether the calling thread currently holds the slot. Task holders are
    /// not attributed to any thread.
    pub(crate) fn held_by_current_thread(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.held && state.holder == Some(thread::current().id())
    }

    /// Park the calling thread until the slot is granted or `timeout`
    /// elapses. FIFO with respect to all other waiters.
    pub(crate) fn acquire_blocking(
        self: &Arc<Self>,
        timeout: Option<Duration>,
    ) -> Result<SlotPermit, TransactionError> {
        let (waiter, token) = {
            let mut state = self.state.lock().unwrap();
            if !state.held {
                state.held = true;
                state.holder = Some(thread::current().id());
                trace!("write slot acquired");
                return Ok(SlotPermit {
                    slot: Arc::clone(self),
                });
            }
            let waiter = Arc::new(ThreadWaiter {
                thread: thread::current().id(),
                grant: Mutex::new(Grant::Waiting),
                cv: Condvar::new(),
            });
            let token = state.enqueue(WaiterKind::Thread(Arc::clone(&waiter)));
            (waiter, token)
        };

        let start = Instant::now();
        let mut grant = waiter.grant.lock().unwrap();
        loop {
            if *grant == Grant::Granted {
                trace!("write slot granted after wait");
                return Ok(SlotPermit {
                    slot: Arc::clone(self),
                });
            }
            match timeout {
                None => grant = waiter.cv.wait(grant).unwrap(),
                Some(limit) => match limit.checked_sub(start.elapsed()) {
                    Some(remaining) => {
                        grant = waiter.cv.wait_timeout(grant, remaining).unwrap().0;
                    }
                    None => {
                        // Timed out. Re-check under the slot lock: the grant
                        // may have landed while we were giving up.
                        drop(grant);
                        let mut state = self.state.lock().unwrap();
                        let mut grant = waiter.grant.lock().unwrap();
                        if *grant == Grant::Granted {
                            trace!("write slot granted in timeout window");
                            return Ok(SlotPermit {
                                slot: Arc::clone(self),
                            });
                        }
                        *grant = Grant::Abandoned;
                        state.remove(token);
                        let waited_ms = start.elapsed().as_millis() as u64;
                        debug!(waited_ms, "write slot acquisition timed out");
                        return Err(TransactionError::Timeout { waited_ms });
                    }
                },
            }
        }
    }

    /// Suspend the calling task until the slot is granted or `timeout`
    /// elapses. Shares the FIFO queue with blocked threads.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        timeout: Option<Duration>,
    ) -> Result<SlotPermit, TransactionError> {
        let (mut rx, token) = {
            let mut state = self.state.lock().unwrap();
            if !state.held {
                state.held = true;
                state.holder = None;
                trace!("write slot acquired");
                return Ok(SlotPermit {
                    slot: Arc::clone(self),
                });
            }
            let (tx, rx) = oneshot::channel();
            let token = state.enqueue(WaiterKind::Task(tx));
            (rx, token)
        };

        let start = Instant::now();
        match timeout {
            None => match (&mut rx).await {
                Ok(()) => Ok(SlotPermit {
                    slot: Arc::clone(self),
                }),
                Err(_) => Err(TransactionError::Conflict {
                    reason: "coordination slot dropped while waiting".to_owned(),
                }),
            },
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(Ok(())) => Ok(SlotPermit {
                    slot: Arc::clone(self),
                }),
                Ok(Err(_)) => Err(TransactionError::Conflict {
                    reason: "coordination slot dropped while waiting".to_owned(),
                }),
                Err(_elapsed) => {
                    // The grant races with the timeout; settle it under the
                    // slot lock, where release() cannot run concurrently.
                    let mut state = self.state.lock().unwrap();
                    if rx.try_recv().is_ok() {
                        trace!("write slot granted in timeout window");
                        return Ok(SlotPermit {
                            slot: Arc::clone(self),
                        });
                    }
                    state.remove(token);
                    let waited_ms = start.elapsed().as_millis() as u64;
                    debug!(waited_ms, "write slot acquisition timed out");
                    Err(TransactionError::Timeout { waited_ms })
                }
            },
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        while let Some(waiter) = state.queue.pop_front() {
            match waiter.kind {
                WaiterKind::Thread(thread_waiter) => {
                    let mut grant = thread_waiter.grant.lock().unwrap();
                    if *grant == Grant::Abandoned {
                        continue;
                    }
                    *grant = Grant::Granted;
                    state.holder = Some(thread_waiter.thread);
                    thread_waiter.cv.notify_one();
                    trace!("write slot handed to waiting thread");
                    return;
                }
                WaiterKind::Task(tx) => {
                    if tx.send(()).is_ok() {
                        state.holder = None;
                        trace!("write slot handed to waiting task");
                        return;
                    }
                    // Receiver gone: the waiter abandoned the wait.
                }
            }
        }
        state.held = false;
        state.holder = None;
        trace!("write slot released");
    }
}

impl SlotState {
    fn enqueue(&mut self, kind: WaiterKind) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.queue.push_back(Waiter { token, kind });
        token
    }

    fn remove(&mut self, token: u64) {
        self.queue.retain(|waiter| waiter.token != token);
    }
}

/// Exclusive hold on a document's coordination slot.
///
/// Released exactly once, on drop, on every exit path.
pub(crate) struct SlotPermit {
    slot: Arc<WriteSlot>,
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit").finish_non_exhaustive()
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.slot.release();
    }
}
