use std::sync::{Arc, Mutex};

use crate::backend::KvBackend;
use crate::error::ConstructionError;
use crate::factory::HandleFactory;
use crate::kind::HandleKind;

/// One lazily filled handle slot.
///
/// The check/construct/store sequence runs under the slot's lock, so
/// concurrent cold reads of the same kind serialize behind one construction
/// and all observe the same instance. A failed construction leaves the slot
/// absent, so the next read retries.
struct Slot<T> {
    cell: Mutex<Option<Arc<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }
}

impl<T> Slot<T> {
    fn get_or_try_init(
        &self,
        kind: HandleKind,
        init: impl FnOnce() -> Result<T, String>,
    ) -> Result<Arc<T>, ConstructionError> {
        let mut slot = self.cell.lock().expect("poisoned slot lock");
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(init().map_err(|message| ConstructionError::new(kind, message))?);
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn is_cached(&self) -> bool {
        self.cell.lock().expect("poisoned slot lock").is_some()
    }
}

/// Per-owner registry of lazily constructed service handles.
///
/// Each of the nine slots is filled by the factory at most once over the
/// owner's lifetime; once present, every read returns the same instance.
/// There is no eviction and no cross-owner sharing. The owner may be shared
/// across threads; first writes serialize per slot, unrelated slots never
/// contend.
pub struct ServiceHandles<F: HandleFactory> {
    factory: F,
    kv_backend: KvBackend,
    object_client: Slot<F::ObjectClient>,
    object_store: Slot<F::ObjectStore>,
    identity_client: Slot<F::IdentityClient>,
    function_client: Slot<F::FunctionClient>,
    function_deployer: Slot<F::FunctionDeployer>,
    vm_client: Slot<F::VmClient>,
    vm_fleet: Slot<F::VmFleet>,
    kv_client: Slot<F::KvClient>,
    kv_store: Slot<F::KvStore>,
}

impl<F: HandleFactory> ServiceHandles<F> {
    /// Create an owner with every slot absent. No handle is constructed until
    /// its first read.
    pub fn new(factory: F, kv_backend: KvBackend) -> Self {
        Self {
            factory,
            kv_backend,
            object_client: Slot::default(),
            object_store: Slot::default(),
            identity_client: Slot::default(),
            function_client: Slot::default(),
            function_deployer: Slot::default(),
            vm_client: Slot::default(),
            vm_fleet: Slot::default(),
            kv_client: Slot::default(),
            kv_store: Slot::default(),
        }
    }

    pub fn kv_backend(&self) -> &KvBackend {
        &self.kv_backend
    }

    pub fn object_client(&self) -> Result<Arc<F::ObjectClient>, ConstructionError> {
        self.object_client
            .get_or_try_init(HandleKind::ObjectClient, || self.factory.object_client())
    }

    pub fn object_store(&self) -> Result<Arc<F::ObjectStore>, ConstructionError> {
        self.object_store
            .get_or_try_init(HandleKind::ObjectStore, || self.factory.object_store())
    }

    pub fn identity_client(&self) -> Result<Arc<F::IdentityClient>, ConstructionError> {
        self.identity_client
            .get_or_try_init(HandleKind::IdentityClient, || {
                self.factory.identity_client()
            })
    }

    pub fn function_client(&self) -> Result<Arc<F::FunctionClient>, ConstructionError> {
        self.function_client
            .get_or_try_init(HandleKind::FunctionClient, || {
                self.factory.function_client()
            })
    }

    pub fn function_deployer(&self) -> Result<Arc<F::FunctionDeployer>, ConstructionError> {
        self.function_deployer
            .get_or_try_init(HandleKind::FunctionDeployer, || {
                self.factory.function_deployer()
            })
    }

    pub fn vm_client(&self) -> Result<Arc<F::VmClient>, ConstructionError> {
        self.vm_client
            .get_or_try_init(HandleKind::VmClient, || self.factory.vm_client())
    }

    pub fn vm_fleet(&self) -> Result<Arc<F::VmFleet>, ConstructionError> {
        self.vm_fleet
            .get_or_try_init(HandleKind::VmFleet, || self.factory.vm_fleet())
    }

    pub fn kv_client(&self) -> Result<Arc<F::KvClient>, ConstructionError> {
        self.kv_client.get_or_try_init(HandleKind::KvClient, || {
            self.factory.kv_client(&self.kv_backend)
        })
    }

    pub fn kv_store(&self) -> Result<Arc<F::KvStore>, ConstructionError> {
        self.kv_store.get_or_try_init(HandleKind::KvStore, || {
            self.factory.kv_store(&self.kv_backend)
        })
    }

    /// Construct the handle for `kind` if it is still absent, discarding the
    /// instance. Useful for pre-warming a slot before handing the owner to
    /// latency-sensitive callers.
    pub fn warm(&self, kind: HandleKind) -> Result<(), ConstructionError> {
        match kind {
            HandleKind::ObjectClient => self.object_client().map(drop),
            HandleKind::ObjectStore => self.object_store().map(drop),
            HandleKind::IdentityClient => self.identity_client().map(drop),
            HandleKind::FunctionClient => self.function_client().map(drop),
            HandleKind::FunctionDeployer => self.function_deployer().map(drop),
            HandleKind::VmClient => self.vm_client().map(drop),
            HandleKind::VmFleet => self.vm_fleet().map(drop),
            HandleKind::KvClient => self.kv_client().map(drop),
            HandleKind::KvStore => self.kv_store().map(drop),
        }
    }

    /// Warm every slot, stopping at the first construction failure.
    pub fn warm_all(&self) -> Result<(), ConstructionError> {
        for kind in HandleKind::ALL {
            self.warm(kind)?;
        }
        Ok(())
    }

    pub fn is_cached(&self, kind: HandleKind) -> bool {
        match kind {
            HandleKind::ObjectClient => self.object_client.is_cached(),
            HandleKind::ObjectStore => self.object_store.is_cached(),
            HandleKind::IdentityClient => self.identity_client.is_cached(),
            HandleKind::FunctionClient => self.function_client.is_cached(),
            HandleKind::FunctionDeployer => self.function_deployer.is_cached(),
            HandleKind::VmClient => self.vm_client.is_cached(),
            HandleKind::VmFleet => self.vm_fleet.is_cached(),
            HandleKind::KvClient => self.kv_client.is_cached(),
            HandleKind::KvStore => self.kv_store.is_cached(),
        }
    }

    /// Kinds whose slots are currently filled, in slot order.
    pub fn cached_kinds(&self) -> Vec<HandleKind> {
        HandleKind::ALL
            .into_iter()
            .filter(|kind| self.is_cached(*kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct MockHandle {
        kind: HandleKind,
        serial: usize,
    }

    /// Counts factory invocations per kind and records the backend the
    /// key-value methods were given. Shared across owners via `Arc` so
    /// cross-owner tests can observe total invocation counts.
    #[derive(Default)]
    struct CountingFactory {
        counts: Arc<Mutex<HashMap<HandleKind, usize>>>,
        seen_backends: Arc<Mutex<Vec<KvBackend>>>,
        failures_remaining: Arc<Mutex<HashMap<HandleKind, usize>>>,
        serial: Arc<AtomicUsize>,
        build_delay: Option<Duration>,
    }

    impl CountingFactory {
        fn count(&self, kind: HandleKind) -> usize {
            self.counts
                .lock()
                .expect("poisoned mutex")
                .get(&kind)
                .copied()
                .unwrap_or(0)
        }

        fn total_count(&self) -> usize {
            self.counts.lock().expect("poisoned mutex").values().sum()
        }

        fn fail_next(&self, kind: HandleKind, times: usize) {
            self.failures_remaining
                .lock()
                .expect("poisoned mutex")
                .insert(kind, times);
        }

        fn share_counters(&self) -> Self {
            Self {
                counts: Arc::clone(&self.counts),
                seen_backends: Arc::clone(&self.seen_backends),
                failures_remaining: Arc::clone(&self.failures_remaining),
                serial: Arc::clone(&self.serial),
                build_delay: self.build_delay,
            }
        }

        fn build(&self, kind: HandleKind) -> Result<MockHandle, String> {
            if let Some(delay) = self.build_delay {
                std::thread::sleep(delay);
            }

            *self
                .counts
                .lock()
                .expect("poisoned mutex")
                .entry(kind)
                .or_insert(0) += 1;

            let mut failures = self.failures_remaining.lock().expect("poisoned mutex");
            if let Some(remaining) = failures.get_mut(&kind) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(format!("injected construction failure for {kind}"));
                }
            }

            Ok(MockHandle {
                kind,
                serial: self.serial.fetch_add(1, Ordering::SeqCst),
            })
        }

        fn build_kv(&self, kind: HandleKind, backend: &KvBackend) -> Result<MockHandle, String> {
            self.seen_backends
                .lock()
                .expect("poisoned mutex")
                .push(backend.clone());
            self.build(kind)
        }
    }

    impl HandleFactory for CountingFactory {
        type ObjectClient = MockHandle;
        type ObjectStore = MockHandle;
        type IdentityClient = MockHandle;
        type FunctionClient = MockHandle;
        type FunctionDeployer = MockHandle;
        type VmClient = MockHandle;
        type VmFleet = MockHandle;
        type KvClient = MockHandle;
        type KvStore = MockHandle;

        fn object_client(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::ObjectClient)
        }

        fn object_store(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::ObjectStore)
        }

        fn identity_client(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::IdentityClient)
        }

        fn function_client(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::FunctionClient)
        }

        fn function_deployer(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::FunctionDeployer)
        }

        fn vm_client(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::VmClient)
        }

        fn vm_fleet(&self) -> Result<MockHandle, String> {
            self.build(HandleKind::VmFleet)
        }

        fn kv_client(&self, backend: &KvBackend) -> Result<MockHandle, String> {
            self.build_kv(HandleKind::KvClient, backend)
        }

        fn kv_store(&self, backend: &KvBackend) -> Result<MockHandle, String> {
            self.build_kv(HandleKind::KvStore, backend)
        }
    }

    #[test]
    fn second_read_returns_the_cached_instance() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::default());

        let first = owner.object_client().expect("first read should build");
        let second = owner.object_client().expect("second read should hit cache");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counters.count(HandleKind::ObjectClient), 1);
    }

    #[test]
    fn slots_fill_independently() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::default());

        owner.kv_client().expect("kv client should build");

        assert_eq!(counters.count(HandleKind::KvClient), 1);
        assert_eq!(counters.total_count(), 1);
        assert_eq!(owner.cached_kinds(), vec![HandleKind::KvClient]);
        assert!(!owner.is_cached(HandleKind::KvStore));
    }

    #[test]
    fn failed_construction_is_not_cached_and_retries() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        factory.fail_next(HandleKind::FunctionClient, 1);
        let owner = ServiceHandles::new(factory, KvBackend::default());

        let error = owner
            .function_client()
            .expect_err("first read should surface the factory failure");
        assert_eq!(error.kind(), HandleKind::FunctionClient);
        assert!(error.message().contains("injected construction failure"));
        assert!(!owner.is_cached(HandleKind::FunctionClient));

        owner
            .function_client()
            .expect("second read should retry and succeed");
        assert_eq!(counters.count(HandleKind::FunctionClient), 2);
        assert!(owner.is_cached(HandleKind::FunctionClient));
    }

    #[test]
    fn kv_slots_receive_the_owner_backend() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::local());

        owner.kv_client().expect("kv client should build");
        owner.kv_store().expect("kv store should build");

        let seen = counters.seen_backends.lock().expect("poisoned mutex");
        assert_eq!(
            seen.as_slice(),
            &[KvBackend::local(), KvBackend::local()],
            "both kv kinds should see the local backend"
        );
    }

    #[test]
    fn remote_backend_reaches_the_factory_unchanged() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::Remote);

        owner.kv_store().expect("kv store should build");

        let seen = counters.seen_backends.lock().expect("poisoned mutex");
        assert_eq!(seen.as_slice(), &[KvBackend::Remote]);
    }

    #[test]
    fn owners_never_share_handles() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let first_owner = ServiceHandles::new(factory.share_counters(), KvBackend::default());
        let second_owner = ServiceHandles::new(factory, KvBackend::default());

        let first = first_owner.vm_client().expect("first owner should build");
        let second = second_owner.vm_client().expect("second owner should build");

        assert_ne!(first.serial, second.serial);
        assert_eq!(counters.count(HandleKind::VmClient), 2);
    }

    #[test]
    fn concurrent_cold_reads_construct_exactly_once() {
        let factory = CountingFactory {
            build_delay: Some(Duration::from_millis(25)),
            ..CountingFactory::default()
        };
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::default());

        let handles: Vec<Arc<MockHandle>> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| owner.vm_fleet().expect("read should succeed")))
                .collect();
            readers
                .into_iter()
                .map(|reader| reader.join().expect("reader thread should not panic"))
                .collect()
        });

        assert_eq!(counters.count(HandleKind::VmFleet), 1);
        let first = &handles[0];
        assert!(handles.iter().all(|handle| Arc::ptr_eq(first, handle)));
    }

    #[test]
    fn warm_all_fills_every_slot_once() {
        let factory = CountingFactory::default();
        let counters = factory.share_counters();
        let owner = ServiceHandles::new(factory, KvBackend::default());

        owner.warm_all().expect("warm_all should succeed");
        owner.warm_all().expect("second warm_all should be a no-op");

        assert_eq!(owner.cached_kinds(), HandleKind::ALL.to_vec());
        for kind in HandleKind::ALL {
            assert_eq!(counters.count(kind), 1, "kind {kind} should build once");
        }
    }
}
