//! Fixed arena of connection managers shared by the workers of one client
//! instance.

use crate::connection::{ConnectionManager, ConnectionState, ManagerId, StateCell};
use crate::error::PoolError;
use loadgen_core::{ConnectionConfig, Connector};
use loadgen_metrics::MetricsSink;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long `close` waits for a slot still held by a detached worker.
const CLOSE_SLOT_WAIT: Duration = Duration::from_secs(1);

/// Count of managers per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolHealth {
    pub disconnected: usize,
    pub connecting: usize,
    pub connected: usize,
    pub degraded: usize,
    pub closed: usize,
    pub checked_out: usize,
}

impl PoolHealth {
    pub fn total(&self) -> usize {
        self.disconnected + self.connecting + self.connected + self.degraded + self.closed
    }
}

pub struct ConnectionPool<C: Connector> {
    index: usize,
    slots: Box<[Mutex<ConnectionManager<C>>]>,
    states: Box<[Arc<StateCell>]>,
    available: Mutex<VecDeque<usize>>,
    returned: Condvar,
    checked_out: AtomicUsize,
    closed: AtomicBool,
    acquire_timeout: Duration,
}

impl<C: Connector> ConnectionPool<C> {
    /// Build `size` managers. Connections open lazily on first use.
    ///
    /// Managers are spread over the connector's nodes by their global
    /// position, so consecutive pools do not all start on node 0.
    pub fn new(
        index: usize,
        size: usize,
        connector: Arc<C>,
        config: &ConnectionConfig,
        sink: Arc<dyn MetricsSink>,
        acquire_timeout: Duration,
    ) -> Self {
        let node_count = connector.node_count().max(1);
        let managers: Vec<ConnectionManager<C>> = (0..size)
            .map(|slot| {
                let id = ManagerId { pool: index, index: slot };
                let node = (index * size + slot) % node_count;
                ConnectionManager::new(id, Arc::clone(&connector), node, config, Arc::clone(&sink))
            })
            .collect();
        let states = managers.iter().map(|m| m.state_cell()).collect();
        let slots = managers.into_iter().map(Mutex::new).collect();

        Self {
            index,
            slots,
            states,
            available: Mutex::new((0..size).collect()),
            returned: Condvar::new(),
            checked_out: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            acquire_timeout,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Check out a manager, waiting up to the acquire timeout.
    ///
    /// Connected managers are preferred. A degraded manager may be handed
    /// out; executing on it fails fast until its backoff elapses.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>, PoolError> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut available = self.available.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::Closed);
            }
            if self.all_closed() {
                return Err(PoolError::AllConnectionsClosed);
            }
            if let Some(slot) = self.take_best(&mut available) {
                drop(available);
                self.checked_out.fetch_add(1, Ordering::AcqRel);
                return Ok(PooledConnection {
                    pool: self,
                    slot,
                    manager: self.slots[slot].lock(),
                });
            }
            if Instant::now() >= deadline {
                return Err(PoolError::Exhausted(self.acquire_timeout));
            }
            self.returned.wait_until(&mut available, deadline);
        }
    }

    /// Return a connection. Dropping the guard does the same.
    pub fn release(&self, connection: PooledConnection<'_, C>) {
        drop(connection);
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True when every manager gave up (or the pool was closed).
    pub fn all_closed(&self) -> bool {
        self.states
            .iter()
            .all(|s| s.get() == ConnectionState::Closed)
    }

    pub fn health(&self) -> PoolHealth {
        let mut health = PoolHealth {
            checked_out: self.checked_out(),
            ..Default::default()
        };
        for state in self.states.iter() {
            match state.get() {
                ConnectionState::Disconnected => health.disconnected += 1,
                ConnectionState::Connecting => health.connecting += 1,
                ConnectionState::Connected => health.connected += 1,
                ConnectionState::Degraded => health.degraded += 1,
                ConnectionState::Closed => health.closed += 1,
            }
        }
        health
    }

    /// Close every manager. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.returned.notify_all();
        for (slot, manager) in self.slots.iter().enumerate() {
            match manager.try_lock_for(CLOSE_SLOT_WAIT) {
                Some(mut manager) => manager.close(),
                None => tracing::warn!(
                    "pool{}-conn{slot} still checked out at close; leaving it to its worker",
                    self.index
                ),
            }
        }
        tracing::debug!("pool{} closed", self.index);
    }

    fn take_best(&self, available: &mut VecDeque<usize>) -> Option<usize> {
        let position = available
            .iter()
            .position(|&slot| self.states[slot].get() == ConnectionState::Connected)
            .or_else(|| {
                available
                    .iter()
                    .position(|&slot| self.states[slot].get() != ConnectionState::Closed)
            })?;
        available.remove(position)
    }

    fn give_back(&self, slot: usize) {
        self.available.lock().push_back(slot);
        self.checked_out.fetch_sub(1, Ordering::AcqRel);
        if self.states[slot].get() == ConnectionState::Closed {
            // Waiters may need to observe that the whole pool is closed.
            self.returned.notify_all();
        } else {
            self.returned.notify_one();
        }
    }
}

/// A checked-out manager. Returned to the pool on drop.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    slot: usize,
    manager: MutexGuard<'a, ConnectionManager<C>>,
}

impl<C: Connector> PooledConnection<'_, C> {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = ConnectionManager<C>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        // The slot lock is released right after this, when `manager` drops.
        // A waiter that wins the slot in between blocks on that lock only
        // briefly.
        self.pool.give_back(self.slot);
    }
}
