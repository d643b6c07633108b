//! Bounded, self-healing pool of network resources
//!
//! Keeps a warm reserve of expensive, externally-provisioned resources
//! (veth pairs in this daemon) so pods can acquire one instantly instead of
//! paying the provisioning cost on the hot path. Total outstanding
//! resources are capped, and a background reconciler keeps the idle
//! reserve between its configured bounds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::resource::NetworkResource;
use crate::{Error, Result};

/// Default interval between periodic reconciler passes
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Provider of the underlying network resource.
///
/// Both operations may block for a while and may fail. Implementations must
/// tolerate concurrent calls from multiple tasks.
#[async_trait]
pub trait ResourceFactory<T>: Send + Sync {
    /// Provision one new resource. On error no side effects may be visible
    /// to the pool.
    async fn create(&self) -> Result<T>;

    /// Tear one resource down. Failure is logged by the pool but the
    /// resource is considered gone either way.
    async fn dispose(&self, resource: &T) -> Result<()>;
}

/// Collector handed to the initializer so it can report resources that
/// survived a previous run of the process.
pub struct ResourceHolder<T> {
    idle: Vec<T>,
    inuse: Vec<T>,
}

impl<T> ResourceHolder<T> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            inuse: Vec::new(),
        }
    }

    /// Report a recovered resource that is free for acquisition
    pub fn add_idle(&mut self, resource: T) {
        self.idle.push(resource);
    }

    /// Report a recovered resource that is already handed out
    pub fn add_inuse(&mut self, resource: T) {
        self.inuse.push(resource);
    }
}

/// One-shot callback that repopulates the pool from external truth at
/// startup (e.g. by listing interfaces that are still on the host).
pub type Initializer<T> = Box<dyn FnOnce(&mut ResourceHolder<T>) -> Result<()> + Send>;

/// Pool configuration
pub struct PoolConfig<T> {
    /// Lower bound on the idle reserve, maintained by the reconciler
    pub min_idle: usize,
    /// Upper bound on the idle reserve; surplus is disposed
    pub max_idle: usize,
    /// Hard cap on total resources: idle + in-use + in-flight creations
    pub capacity: usize,
    /// Interval between periodic reconciler passes
    pub reconcile_interval: Duration,
    factory: Arc<dyn ResourceFactory<T>>,
    initializer: Option<Initializer<T>>,
}

impl<T> PoolConfig<T> {
    pub fn new(factory: Arc<dyn ResourceFactory<T>>) -> Self {
        Self {
            min_idle: 0,
            max_idle: 5,
            capacity: 10,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            factory,
            initializer: None,
        }
    }

    pub fn min_idle(mut self, n: usize) -> Self {
        self.min_idle = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = n;
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn initializer(
        mut self,
        f: impl FnOnce(&mut ResourceHolder<T>) -> Result<()> + Send + 'static,
    ) -> Self {
        self.initializer = Some(Box::new(f));
        self
    }
}

/// Read-only snapshot of pool occupancy
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolStat {
    pub idle: usize,
    pub inuse: usize,
    pub capacity: usize,
}

/// Index of every resource the pool knows about, partitioned by state.
///
/// Not internally locked; all access goes through the pool mutex so that
/// "check size, then mutate" stays a single atomic decision.
struct Registry<T> {
    idle: HashMap<String, Arc<T>>,
    inuse: HashMap<String, Arc<T>>,
}

impl<T: NetworkResource> Registry<T> {
    fn new() -> Self {
        Self {
            idle: HashMap::new(),
            inuse: HashMap::new(),
        }
    }

    fn add_idle(&mut self, resource: Arc<T>) {
        self.idle.insert(resource.resource_id().to_string(), resource);
    }

    fn add_inuse(&mut self, resource: Arc<T>) {
        self.inuse.insert(resource.resource_id().to_string(), resource);
    }

    fn take_idle_any(&mut self) -> Option<Arc<T>> {
        let id = self.idle.keys().next()?.clone();
        self.idle.remove(&id)
    }

    fn take_idle_by_id(&mut self, id: &str) -> Option<Arc<T>> {
        self.idle.remove(id)
    }

    fn remove_inuse(&mut self, id: &str) -> Option<Arc<T>> {
        self.inuse.remove(id)
    }

    fn drain_idle(&mut self) -> Vec<Arc<T>> {
        self.idle.drain().map(|(_, r)| r).collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.idle.contains_key(id) || self.inuse.contains_key(id)
    }

    fn is_inuse(&self, id: &str) -> bool {
        self.inuse.contains_key(id)
    }

    fn idle_len(&self) -> usize {
        self.idle.len()
    }

    fn inuse_len(&self) -> usize {
        self.inuse.len()
    }

    fn len(&self) -> usize {
        self.idle.len() + self.inuse.len()
    }
}

struct PoolState<T> {
    registry: Registry<T>,
    closed: bool,
    /// In-flight create/dispose tasks, counted so close() can drain them
    inflight: usize,
    reconciler: Option<JoinHandle<()>>,
}

struct PoolInner<T> {
    min_idle: usize,
    max_idle: usize,
    capacity: usize,
    reconcile_interval: Duration,
    factory: Arc<dyn ResourceFactory<T>>,
    state: Mutex<PoolState<T>>,
    /// Admission tokens: one per resource that exists or is being created
    tokens: Arc<Semaphore>,
    /// Reconciler wake signal; notifications coalesce
    wake: Notify,
    drained: Notify,
}

/// Warm pool of network resources.
///
/// Cheap to clone; all clones share the same pool. The pool must be closed
/// with [`Pool::close`] to stop the reconciler and tear down the idle
/// reserve.
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: NetworkResource + 'static> Pool<T> {
    /// Build a pool, run the initializer, and start the reconciler.
    ///
    /// Must be called within a tokio runtime. The pool is usable as soon as
    /// this returns; surplus resources reported by the initializer are
    /// disposed in the background.
    pub fn new(mut config: PoolConfig<T>) -> Result<Self> {
        if config.min_idle > config.max_idle || config.max_idle > config.capacity {
            return Err(Error::Config(format!(
                "pool bounds must satisfy min_idle <= max_idle <= capacity, got {}/{}/{}",
                config.min_idle, config.max_idle, config.capacity
            )));
        }

        let mut holder = ResourceHolder::new();
        if let Some(init) = config.initializer.take() {
            init(&mut holder)?;
        }

        let mut registry = Registry::new();
        for resource in holder.inuse {
            if registry.contains(resource.resource_id()) {
                tracing::warn!(id = resource.resource_id(), "duplicate resource id from initializer, ignoring");
                continue;
            }
            registry.add_inuse(Arc::new(resource));
        }
        for resource in holder.idle {
            if registry.contains(resource.resource_id()) {
                tracing::warn!(id = resource.resource_id(), "duplicate resource id from initializer, ignoring");
                continue;
            }
            registry.add_idle(Arc::new(resource));
        }

        // Shed what the initializer over-reported: first anything beyond
        // capacity, then idle beyond max_idle. Only idle entries can be
        // shed; an over-capacity in-use set is a caller bug.
        let mut surplus = Vec::new();
        while registry.len() > config.capacity {
            match registry.take_idle_any() {
                Some(r) => surplus.push(r),
                None => break,
            }
        }
        if registry.len() > config.capacity {
            tracing::warn!(
                inuse = registry.inuse_len(),
                capacity = config.capacity,
                "initializer reported more in-use resources than capacity"
            );
        }
        while registry.idle_len() > config.max_idle {
            match registry.take_idle_any() {
                Some(r) => surplus.push(r),
                None => break,
            }
        }

        // Every surviving resource holds one admission token. Trimmed
        // surplus never held one, so its disposal releases none.
        let tokens = Arc::new(Semaphore::new(config.capacity));
        tokens.forget_permits(registry.len().min(config.capacity));

        let inner = Arc::new(PoolInner {
            min_idle: config.min_idle,
            max_idle: config.max_idle,
            capacity: config.capacity,
            reconcile_interval: config.reconcile_interval,
            factory: config.factory,
            state: Mutex::new(PoolState {
                registry,
                closed: false,
                inflight: 0,
                reconciler: None,
            }),
            tokens,
            wake: Notify::new(),
            drained: Notify::new(),
        });

        for resource in surplus {
            tracing::info!(id = resource.resource_id(), "disposing surplus resource from initializer");
            inner.spawn_dispose(resource, false);
        }

        let handle = tokio::spawn(reconcile_loop(inner.clone()));
        inner.state.lock().reconciler = Some(handle);
        inner.wake.notify_one();

        Ok(Self { inner })
    }

    /// Acquire a resource, waiting for capacity as long as it takes.
    ///
    /// With a preferred id the pool hands back that exact resource if it is
    /// idle, fails with [`Error::ResourceBusy`] if it is handed out, and
    /// otherwise falls back to any idle resource. Use
    /// [`Pool::acquire_timeout`] to bound the wait.
    pub async fn acquire(&self, preferred: Option<&str>) -> Result<Arc<T>> {
        {
            let mut st = self.inner.state.lock();
            if st.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(id) = preferred {
                if let Some(resource) = st.registry.take_idle_by_id(id) {
                    st.registry.add_inuse(resource.clone());
                    return Ok(resource);
                }
                if st.registry.is_inuse(id) {
                    return Err(Error::ResourceBusy(id.to_string()));
                }
                // The preferred id may name a resource this pool never
                // learned about; serve any idle one instead.
            }
            if let Some(resource) = st.registry.take_idle_any() {
                st.registry.add_inuse(resource.clone());
                return Ok(resource);
            }
        }

        // Nothing idle: reserve an admission token, then materialize. The
        // token is reserved before the factory call so in-flight creations
        // count against capacity.
        let permit = match self.inner.tokens.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(Error::PoolClosed),
            Err(TryAcquireError::NoPermits) => self
                .inner
                .tokens
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::PoolClosed)?,
        };
        // Closed-check and in-flight registration are one atomic step so
        // close() either rejects this caller or waits for its create.
        {
            let mut st = self.inner.state.lock();
            if st.closed {
                return Err(Error::PoolClosed);
            }
            st.inflight += 1;
        }

        let (tx, rx) = oneshot::channel();
        self.inner.spawn_create(permit, tx);
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Runtime("resource creation task failed".into())),
        }
    }

    /// Acquire with a deadline. On expiry the caller gets
    /// [`Error::AcquireTimeout`]; a creation already in flight keeps
    /// running and its result is parked in the idle reserve.
    pub async fn acquire_timeout(
        &self,
        preferred: Option<&str>,
        timeout: Duration,
    ) -> Result<Arc<T>> {
        match tokio::time::timeout(timeout, self.acquire(preferred)).await {
            Ok(result) => result,
            Err(_) => Err(Error::AcquireTimeout(timeout)),
        }
    }

    /// Return a previously acquired resource.
    ///
    /// Non-blocking: if the idle reserve is full the resource is disposed
    /// on a background task. Releasing an id that is not in use is a
    /// caller bug and yields [`Error::InvalidState`].
    pub fn release(&self, id: &str) -> Result<()> {
        let mut st = self.inner.state.lock();
        if st.closed {
            return Err(Error::PoolClosed);
        }
        let Some(resource) = st.registry.remove_inuse(id) else {
            return Err(Error::InvalidState(id.to_string()));
        };
        if st.registry.idle_len() < self.inner.max_idle {
            st.registry.add_idle(resource);
            drop(st);
        } else {
            drop(st);
            tracing::debug!(id, "idle reserve full, disposing released resource");
            self.inner.spawn_dispose(resource, true);
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Occupancy snapshot. Usable before and after close.
    pub fn stat(&self) -> PoolStat {
        let st = self.inner.state.lock();
        PoolStat {
            idle: st.registry.idle_len(),
            inuse: st.registry.inuse_len(),
            capacity: self.inner.capacity,
        }
    }

    /// Stop the reconciler, dispose the idle reserve, and wait for
    /// in-flight factory calls to finish.
    ///
    /// Resources still handed out stay with their callers; the pool only
    /// drops its metadata for them.
    pub async fn close(&self) -> Result<()> {
        let reconciler = {
            let mut st = self.inner.state.lock();
            if st.closed {
                return Err(Error::PoolClosed);
            }
            st.closed = true;
            st.reconciler.take()
        };
        // Kick out acquirers blocked on admission, then let the reconciler
        // observe the flag and exit.
        self.inner.tokens.close();
        self.inner.wake.notify_one();
        if let Some(handle) = reconciler {
            let _ = handle.await;
        }

        let idle = self.inner.state.lock().registry.drain_idle();
        for resource in idle {
            self.inner.spawn_dispose(resource, true);
        }
        self.inner.wait_drained().await;

        let leaked = self.inner.state.lock().registry.inuse_len();
        if leaked > 0 {
            tracing::warn!(count = leaked, "pool closed with resources still in use");
        }
        Ok(())
    }
}

impl<T: NetworkResource + 'static> PoolInner<T> {
    /// Run the factory on its own task so caller cancellation cannot abort
    /// a creation mid-flight. The permit is forgotten on success (the
    /// resource now owns the token) and dropped on failure (next waiter
    /// gets it). The caller has already registered this task in-flight.
    fn spawn_create(self: &Arc<Self>, permit: OwnedSemaphorePermit, tx: oneshot::Sender<Result<Arc<T>>>) {
        let inner = self.clone();
        tokio::spawn(async move {
            match inner.factory.create().await {
                Err(e) => {
                    drop(permit);
                    let _ = tx.send(Err(e));
                }
                Ok(resource) => {
                    let resource = Arc::new(resource);
                    permit.forget();
                    let mut st = inner.state.lock();
                    if tx.is_closed() {
                        drop(st);
                        inner.deposit(resource);
                    } else {
                        st.registry.add_inuse(resource.clone());
                        drop(st);
                        if tx.send(Ok(resource.clone())).is_err() {
                            // Lost the race with caller cancellation
                            let orphan = inner.state.lock().registry.remove_inuse(resource.resource_id());
                            if let Some(resource) = orphan {
                                inner.deposit(resource);
                            }
                        }
                    }
                }
            }
            inner.end_task();
        });
    }

    /// Park a finished resource nobody is waiting for
    fn deposit(self: &Arc<Self>, resource: Arc<T>) {
        let mut st = self.state.lock();
        if !st.closed && st.registry.idle_len() < self.max_idle {
            tracing::debug!(id = resource.resource_id(), "caller gone, parking resource as idle");
            st.registry.add_idle(resource);
            drop(st);
            self.wake.notify_one();
        } else {
            drop(st);
            self.spawn_dispose(resource, true);
        }
    }

    fn spawn_dispose(self: &Arc<Self>, resource: Arc<T>, release_token: bool) {
        self.begin_task();
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.factory.dispose(&resource).await {
                tracing::warn!(id = resource.resource_id(), error = %e, "failed to dispose resource");
            }
            if release_token {
                inner.tokens.add_permits(1);
            }
            inner.end_task();
        });
    }

    /// One reconciler pass: plan under the lock, execute without it.
    async fn reconcile_once(self: &Arc<Self>) {
        let (surplus, shortfall) = {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            let idle = st.registry.idle_len();
            if idle > self.max_idle {
                let mut out = Vec::with_capacity(idle - self.max_idle);
                for _ in 0..idle - self.max_idle {
                    if let Some(resource) = st.registry.take_idle_any() {
                        out.push(resource);
                    }
                }
                (out, 0)
            } else {
                (Vec::new(), self.min_idle.saturating_sub(idle))
            }
        };

        for resource in surplus {
            tracing::info!(id = resource.resource_id(), "disposing surplus idle resource");
            self.spawn_dispose(resource, true);
        }

        for _ in 0..shortfall {
            // Each creation reserves a token first; stop when capacity is
            // spoken for.
            let Ok(permit) = self.tokens.clone().try_acquire_owned() else {
                break;
            };
            match self.factory.create().await {
                Ok(resource) => {
                    permit.forget();
                    let resource = Arc::new(resource);
                    tracing::debug!(id = resource.resource_id(), "topped up idle reserve");
                    let mut st = self.state.lock();
                    if st.closed {
                        drop(st);
                        self.spawn_dispose(resource, true);
                        break;
                    }
                    st.registry.add_idle(resource);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "factory create failed, retrying on next reconcile");
                    drop(permit);
                    break;
                }
            }
        }
    }

    fn begin_task(&self) {
        self.state.lock().inflight += 1;
    }

    fn end_task(&self) {
        let mut st = self.state.lock();
        st.inflight -= 1;
        if st.inflight == 0 {
            drop(st);
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.state.lock().inflight == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Single long-lived reconciler task. Wakes on the notify signal (startup,
/// every release) and on a periodic tick; one pass per wake.
async fn reconcile_loop<T: NetworkResource + 'static>(inner: Arc<PoolInner<T>>) {
    let mut tick = tokio::time::interval(inner.reconcile_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.wake.notified() => {}
            _ = tick.tick() => {}
        }
        if inner.state.lock().closed {
            break;
        }
        inner.reconcile_once().await;
    }
    tracing::debug!("reconciler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Veth;

    #[test]
    fn test_registry_partitions() {
        let mut reg: Registry<Veth> = Registry::new();
        reg.add_idle(Arc::new(Veth::new("veth1", "eth0")));
        reg.add_idle(Arc::new(Veth::new("veth2", "eth0")));
        assert_eq!(reg.idle_len(), 2);
        assert_eq!(reg.inuse_len(), 0);

        let r = reg.take_idle_by_id("veth1").unwrap();
        reg.add_inuse(r);
        assert_eq!(reg.idle_len(), 1);
        assert!(reg.is_inuse("veth1"));
        assert!(reg.contains("veth2"));

        assert!(reg.take_idle_by_id("veth1").is_none());
        assert!(reg.remove_inuse("veth1").is_some());
        assert!(!reg.contains("veth1"));
    }

    #[test]
    fn test_registry_take_any_empties() {
        let mut reg: Registry<Veth> = Registry::new();
        reg.add_idle(Arc::new(Veth::new("veth1", "eth0")));
        assert!(reg.take_idle_any().is_some());
        assert!(reg.take_idle_any().is_none());
    }
}
