//! Fixed-window permit pool used to gate outbound API calls.
//!
//! At most `capacity` permits are handed out per window. Once per window a
//! background task forces the available count back to `capacity`, so permits
//! still held across a boundary do not count against the next window. A burst
//! of `capacity` calls at the end of one window plus `capacity` more right
//! after the reset is admitted.
//!
//! Waiters are served strictly in arrival order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TimeUnit;
use crate::error::{AppError, Result};

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

struct PoolState {
    available: usize,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    closed: bool,
}

enum Admission {
    Granted,
    Queued { id: u64, rx: oneshot::Receiver<()> },
}

/// Counter plus FIFO wait queue. Every mutation goes through `state`.
struct PermitPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PermitPool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(PoolState {
                available: capacity,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                closed: false,
            }),
        }
    }

    fn admit(&self) -> Result<Admission> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AppError::LimiterClosed);
        }

        // Newcomers never overtake queued waiters.
        if state.waiters.is_empty() && state.available > 0 {
            state.available -= 1;
            return Ok(Admission::Granted);
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter { id, tx });
        Ok(Admission::Queued { id, rx })
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || !state.waiters.is_empty() || state.available == 0 {
            return false;
        }
        state.available -= 1;
        true
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if state.available >= self.capacity {
            // Normal for permits held across a window reset.
            debug!(capacity = self.capacity, "Release at full capacity ignored");
            return;
        }
        state.available += 1;
        Self::grant_waiters(&mut state);
    }

    /// Overwrites the counter with full capacity, then serves the queue.
    fn reset(&self) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        state.available = self.capacity;
        Self::grant_waiters(&mut state)
    }

    /// Removes a waiter whose acquire future was dropped. A permit is
    /// refunded only if the grant actually landed in `rx`; the receiver must
    /// still be alive so a concurrent grant cannot be lost in between.
    fn cancel(&self, id: u64, rx: &mut oneshot::Receiver<()>) {
        let mut state = self.state.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == id) {
            state.waiters.remove(pos);
            return;
        }
        if rx.try_recv().is_err() {
            // Woken by close, not by a grant.
            return;
        }
        if state.available < self.capacity {
            state.available += 1;
        }
        Self::grant_waiters(&mut state);
    }

    fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.waiters.len();
        // Dropping the senders wakes every waiter with an error.
        state.waiters.clear();
        dropped
    }

    fn grant_waiters(state: &mut PoolState) -> usize {
        let mut granted = 0;
        while state.available > 0 {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            if waiter.tx.send(()).is_ok() {
                state.available -= 1;
                granted += 1;
            }
        }
        granted
    }
}

/// A held permit. Dropping it releases the permit back to the pool.
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    pool: Arc<PermitPool>,
}

impl Permit {
    fn new(pool: Arc<PermitPool>) -> Self {
        Self { pool }
    }

    /// Explicit release; same as dropping the permit.
    pub fn release(self) {}
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

/// Pulls a queued waiter out of the pool if its acquire future is dropped
/// before it observed the grant (timeout, `select!`, task abort).
struct PendingAcquire<'a> {
    pool: &'a PermitPool,
    id: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        // Runs before `rx` is dropped.
        if !self.settled {
            self.pool.cancel(self.id, &mut self.rx);
        }
    }
}

struct Shared {
    pool: Arc<PermitPool>,
    window: Duration,
    shutdown_tx: broadcast::Sender<()>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.reset_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Admits at most `capacity` operations per fixed window, shared across
/// any number of concurrent callers. Cloning shares the same pool.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Creates the pool and spawns its reset task on the current tokio
    /// runtime. The first reset fires one full `window` after construction.
    pub fn new(capacity: usize, window: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::Init("Rate limiter capacity must be positive".into()));
        }
        if window.is_zero() {
            return Err(AppError::Init("Rate limiter window must be non-zero".into()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Init(format!("Rate limiter requires a tokio runtime: {}", e)))?;

        let pool = Arc::new(PermitPool::new(capacity));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reset_task = runtime.spawn(run_reset_loop(pool.clone(), window, shutdown_rx));

        debug!(capacity, window_ms = window.as_millis() as u64, "Rate limiter started");

        Ok(Self {
            shared: Arc::new(Shared {
                pool,
                window,
                shutdown_tx,
                reset_task: Mutex::new(Some(reset_task)),
            }),
        })
    }

    /// `capacity` requests per one `unit` of time.
    pub fn from_time_unit(unit: TimeUnit, capacity: usize) -> Result<Self> {
        Self::new(capacity, unit.duration())
    }

    /// Waits for a permit. Waiters are served in arrival order.
    ///
    /// Fails only once the limiter has been shut down.
    pub async fn acquire(&self) -> Result<Permit> {
        let pool = &self.shared.pool;
        let (id, rx) = match pool.admit()? {
            Admission::Granted => return Ok(Permit::new(pool.clone())),
            Admission::Queued { id, rx } => (id, rx),
        };

        let mut pending = PendingAcquire {
            pool,
            id,
            rx,
            settled: false,
        };
        let granted = (&mut pending.rx).await;
        pending.settled = true;

        match granted {
            Ok(()) => Ok(Permit::new(pool.clone())),
            Err(_) => Err(AppError::LimiterClosed),
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `deadline`.
    /// A timed-out caller leaves the queue without consuming a permit.
    pub async fn acquire_timeout(&self, deadline: Duration) -> Result<Permit> {
        match tokio::time::timeout(deadline, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(deadline)),
        }
    }

    /// Takes a permit only if one is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<Permit> {
        let pool = &self.shared.pool;
        pool.try_take().then(|| Permit::new(pool.clone()))
    }

    /// Returns one permit to the pool, never exceeding capacity.
    ///
    /// For callers that track permits manually; a [`Permit`] guard already
    /// releases itself on drop.
    pub fn release(&self) {
        self.shared.pool.release();
    }

    pub fn capacity(&self) -> usize {
        self.shared.pool.capacity
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn available(&self) -> usize {
        self.shared.pool.state.lock().available
    }

    pub fn waiting(&self) -> usize {
        self.shared.pool.state.lock().waiters.len()
    }

    /// Stops the reset task and fails every queued waiter with
    /// [`AppError::LimiterClosed`].
    pub async fn shutdown(&self) {
        // Err only means the reset task already exited.
        let _ = self.shared.shutdown_tx.send(());

        let handle = self.shared.reset_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Reset task ended abnormally: {}", e);
                }
            }
        }

        let dropped = self.shared.pool.close();
        info!(dropped_waiters = dropped, "Rate limiter shut down");
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity())
            .field("window", &self.window())
            .field("available", &self.available())
            .field("waiting", &self.waiting())
            .finish()
    }
}

async fn run_reset_loop(
    pool: Arc<PermitPool>,
    window: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let granted = pool.reset();
                debug!(granted, "Permit window reset");
            }
            _ = shutdown.recv() => {
                debug!("Reset task shutting down");
                break;
            }
        }
    }
}
