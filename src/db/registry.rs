//! Process-wide registry of engine pools.
//!
//! # Design Decisions
//!
//! - **One slot per pool key**: a `OnceCell` holding the pool plus an async
//!   creation lock, so a burst of first requests for one key builds exactly
//!   one native pool
//! - **`AtomicUsize` for lease tracking**: Lock-free accounting of handles
//!   currently checked out of each pool
//! - **`AtomicBool` closed flag**: Once shutdown drains the map, new pools are
//!   refused instead of being created behind the drain
//!
//! # Concurrency Safety
//!
//! - All map locks are released before async operations (await points)
//! - A slot is only removed by the caller holding its creation lock, and only
//!   if the map still points at that slot (`Arc::ptr_eq`)
//! - Waiters re-check that their slot is still registered once they get the
//!   lock; a slot discarded after a failure is abandoned for a fresh one
//! - Pools are never evicted; they live until [`PoolRegistry::drain`]

use crate::config::PoolOptions;
use crate::db::pool::NativePool;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Engine, PoolKey};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex as TokioMutex, OnceCell, RwLock as TokioRwLock};
use tracing::{debug, info, warn};

/// A native pool owned by the registry.
pub struct RegisteredPool {
    pub key: PoolKey,
    pub engine: Engine,
    pub pool: NativePool,
    pub created_at: Instant,
    /// Count of handles currently leased from this pool.
    leases: AtomicUsize,
}

impl RegisteredPool {
    fn new(key: PoolKey, engine: Engine, pool: NativePool) -> Self {
        Self {
            key,
            engine,
            pool,
            created_at: Instant::now(),
            leases: AtomicUsize::new(0),
        }
    }

    /// Record a new lease. Call when a handle is handed out.
    pub fn increment_leases(&self) {
        self.leases.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a returned lease.
    /// Saturates at 0 to prevent underflow from extra release calls.
    pub fn decrement_leases(&self) {
        let result = self
            .leases
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            });

        if let Ok(0) = result {
            warn!(
                engine = %self.engine,
                pool_key = %self.key,
                "Lease count underflow detected - extra release call"
            );
        }
    }

    /// Get current lease count.
    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RegisteredPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPool")
            .field("key", &self.key)
            .field("engine", &self.engine)
            .field("created_at", &self.created_at)
            .field("leases", &self.leases.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Aggregate statistics for one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnginePoolStats {
    pub pools: usize,
    pub connections: u32,
    pub idle_connections: usize,
    pub active_leases: usize,
}

/// Registry entry for one pool key.
#[derive(Default)]
struct PoolSlot {
    pool: OnceCell<Arc<RegisteredPool>>,
    /// Held while the pool is being built, and while a failed slot is removed.
    creating: TokioMutex<()>,
}

type SlotRef = Arc<PoolSlot>;

/// Map from pool key to lazily created native pool.
pub struct PoolRegistry {
    options: PoolOptions,
    pools: TokioRwLock<HashMap<PoolKey, SlotRef>>,
    closed: AtomicBool,
}

impl PoolRegistry {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            pools: TokioRwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get or create the pool for `(engine, config)`.
    ///
    /// Concurrent callers with the same pool key wait for a single creation
    /// attempt. If that attempt fails, each waiter either retries on a fresh
    /// slot or gets its own error; no caller ever keeps a pool the registry
    /// does not know about.
    pub async fn get_or_create(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
    ) -> DbResult<Arc<RegisteredPool>> {
        let key = PoolKey::derive(engine, config);

        loop {
            if self.is_closed() {
                return Err(DbError::ShuttingDown);
            }
            let slot = self.slot_for(&key).await;
            if let Some(entry) = self.fill_slot(&key, &slot, engine, config).await? {
                debug!(engine = %engine, pool_key = %key, "Returning pool");
                return Ok(entry);
            }
        }
    }

    /// Return the slot's pool, building it under the slot's creation lock.
    ///
    /// `Ok(None)` means the slot was discarded by a failed attempt while this
    /// caller waited; the caller should start over with a fresh slot.
    async fn fill_slot(
        &self,
        key: &PoolKey,
        slot: &SlotRef,
        engine: Engine,
        config: &ConnectionConfig,
    ) -> DbResult<Option<Arc<RegisteredPool>>> {
        if let Some(entry) = slot.pool.get() {
            return Ok(Some(Arc::clone(entry)));
        }

        let guard = slot.creating.lock().await;
        if let Some(entry) = slot.pool.get() {
            return Ok(Some(Arc::clone(entry)));
        }
        if !self.is_registered(key, slot).await {
            debug!(pool_key = %key, "Pool slot was discarded, retrying");
            return Ok(None);
        }

        info!(engine = %engine, pool_key = %key, "Creating connection pool");
        let pool = match NativePool::connect(engine, config, &self.options).await {
            Ok(pool) => pool,
            Err(e) => {
                self.remove_slot(key, slot).await;
                return Err(e);
            }
        };
        let entry = Arc::new(RegisteredPool::new(key.clone(), engine, pool));
        // Only the lock holder sets the cell, so it is still empty here.
        let _ = slot.pool.set(Arc::clone(&entry));
        drop(guard);

        // Shutdown may have drained the map while this pool was being built.
        if self.is_closed() {
            entry.pool.close().await;
            self.remove_slot(key, slot).await;
            return Err(DbError::ShuttingDown);
        }

        Ok(Some(entry))
    }

    async fn slot_for(&self, key: &PoolKey) -> SlotRef {
        {
            let pools = self.pools.read().await;
            if let Some(slot) = pools.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut pools = self.pools.write().await;
        // Double-check after acquiring write lock
        Arc::clone(pools.entry(key.clone()).or_default())
    }

    async fn is_registered(&self, key: &PoolKey, slot: &SlotRef) -> bool {
        let pools = self.pools.read().await;
        pools.get(key).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    async fn remove_slot(&self, key: &PoolKey, slot: &SlotRef) {
        let mut pools = self.pools.write().await;
        if pools.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            pools.remove(key);
            debug!(pool_key = %key, "Removed pool slot");
        }
    }

    /// Get the number of live pools (filled slots).
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|slot| slot.pool.get().is_some()).count()
    }

    /// Snapshot of every live pool.
    pub async fn pools(&self) -> Vec<Arc<RegisteredPool>> {
        let pools = self.pools.read().await;
        pools
            .values()
            .filter_map(|slot| slot.pool.get().cloned())
            .collect()
    }

    /// Per-engine pool statistics for live pools.
    pub async fn stats(&self) -> HashMap<Engine, EnginePoolStats> {
        let mut stats: HashMap<Engine, EnginePoolStats> = HashMap::new();
        for entry in self.pools().await {
            let s = stats.entry(entry.engine).or_default();
            s.pools += 1;
            s.connections += entry.pool.size();
            s.idle_connections += entry.pool.num_idle();
            s.active_leases += entry.active_leases();
        }
        stats
    }

    /// Mark the registry closed and take every live pool out of it.
    ///
    /// Only the first call returns pools; later calls return an empty list.
    pub async fn drain(&self) -> Vec<Arc<RegisteredPool>> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        // Drain pools under lock, close outside lock
        let slots: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().map(|(_, slot)| slot).collect()
        };

        slots
            .into_iter()
            .filter_map(|slot| slot.pool.get().cloned())
            .collect()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
