//! Native object proxies and their reference lifecycle.
//!
//! Every native handle seen by managed code is represented by at most one
//! live [`NativeObject`] proxy. A proxy is either owning (it holds exactly one
//! native reference) or borrowing. Owning proxies give their reference back
//! exactly once: on explicit [`LifecycleManager::release`], or after the last
//! clone is dropped and the manager next drains its release queue.
//!
//! Dropping a proxy never calls into the native runtime. The drop path only
//! enqueues the handle; all native releases happen on the manager's single
//! serialized release path.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::runtime::NativeRuntime;

type ReleaseQueue = Arc<Mutex<Vec<Handle>>>;

struct ProxyInner {
    handle: Handle,
    owning: AtomicBool,
    released: AtomicBool,
    queue: ReleaseQueue,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        if *self.owning.get_mut() && !*self.released.get_mut() {
            self.queue.lock().push(self.handle);
        }
    }
}

/// Managed-side proxy for a native object.
///
/// Clones share one proxy; identity is per native handle.
#[derive(Clone)]
pub struct NativeObject {
    inner: Arc<ProxyInner>,
}

impl NativeObject {
    /// The native handle, or [`BridgeError::StaleHandle`] once the proxy's
    /// reference has been released.
    pub fn handle(&self) -> Result<Handle> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(BridgeError::StaleHandle {
                handle: self.inner.handle.addr(),
            });
        }
        Ok(self.inner.handle)
    }

    /// The handle regardless of state, for diagnostics.
    pub fn raw_handle(&self) -> Handle {
        self.inner.handle
    }

    pub fn is_owning(&self) -> bool {
        self.inner.owning.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Whether two proxies are the same proxy.
    pub fn same_proxy(&self, other: &NativeObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("handle", &self.inner.handle)
            .field("owning", &self.is_owning())
            .field("released", &self.is_released())
            .finish()
    }
}

impl PartialEq for NativeObject {
    fn eq(&self, other: &Self) -> bool {
        self.same_proxy(other)
    }
}

/// Tracks proxies by handle and owns the reference-count path.
///
/// Lock order is `refcount_path` then `proxies`. `proxies` is never held
/// across a call into the native runtime; `refcount_path` serializes every
/// retain and release the manager issues and is reentrant so a runtime may
/// call back into the bridge from inside one.
pub struct LifecycleManager {
    runtime: Arc<dyn NativeRuntime>,
    proxies: Mutex<HashMap<Handle, Weak<ProxyInner>>>,
    queue: ReleaseQueue,
    refcount_path: ReentrantMutex<()>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            proxies: Mutex::new(HashMap::new()),
            queue: Arc::new(Mutex::new(Vec::new())),
            refcount_path: ReentrantMutex::new(()),
        }
    }

    /// Produce the proxy for a handle the caller does not already own.
    ///
    /// A null handle yields `None`. An existing live proxy is returned as is;
    /// asking for ownership of a borrowing proxy promotes it with one retain.
    /// A proxy that has been released is never handed out again: the handle
    /// gets a fresh proxy.
    pub fn wrap(&self, handle: impl Into<Option<Handle>>, owning: bool) -> Option<NativeObject> {
        let handle = handle.into()?;
        let _serial = self.refcount_path.lock();
        let (object, retain) = {
            let mut proxies = self.proxies.lock();
            match live_proxy(&proxies, handle) {
                Some(inner) => {
                    let promoted = owning && promote(&inner);
                    (NativeObject { inner }, promoted)
                }
                None => {
                    let object = self.new_proxy(handle, owning);
                    proxies.insert(handle, Arc::downgrade(&object.inner));
                    (object, owning)
                }
            }
        };
        if retain {
            self.runtime.retain(handle);
            log::trace!("retained {handle}");
        }
        Some(object)
    }

    /// Produce an owning proxy for a handle whose +1 reference has already
    /// been handed to the caller.
    ///
    /// If an owning proxy already exists, the extra reference is given back.
    pub fn adopt(&self, handle: Handle) -> NativeObject {
        let _serial = self.refcount_path.lock();
        let (object, surplus) = {
            let mut proxies = self.proxies.lock();
            match live_proxy(&proxies, handle) {
                Some(inner) => {
                    let surplus = !promote(&inner);
                    (NativeObject { inner }, surplus)
                }
                None => {
                    let object = self.new_proxy(handle, true);
                    proxies.insert(handle, Arc::downgrade(&object.inner));
                    (object, false)
                }
            }
        };
        if surplus {
            self.runtime.release(handle);
            log::trace!("returned surplus reference for {handle}");
        }
        object
    }

    /// Give back the proxy's native reference.
    ///
    /// Idempotent. Borrowing proxies own nothing, so releasing one is a no-op.
    pub fn release(&self, object: &NativeObject) {
        let _serial = self.refcount_path.lock();
        if !object.is_owning() {
            return;
        }
        let handle = object.inner.handle;
        {
            // Marking and unmapping happen together so no lookup can observe
            // a released proxy still in the map.
            let mut proxies = self.proxies.lock();
            if object.inner.released.swap(true, Ordering::AcqRel) {
                return;
            }
            if proxies
                .get(&handle)
                .is_some_and(|weak| Weak::ptr_eq(weak, &Arc::downgrade(&object.inner)))
            {
                proxies.remove(&handle);
            }
        }
        self.runtime.release(handle);
        log::trace!("released {handle}");
    }

    /// Release every reference whose proxy has been dropped. Returns how many
    /// were released.
    pub fn collect(&self) -> usize {
        let _serial = self.refcount_path.lock();
        let drained: Vec<Handle> = std::mem::take(&mut *self.queue.lock());
        if drained.is_empty() {
            return 0;
        }
        for &handle in &drained {
            self.runtime.release(handle);
        }
        let mut proxies = self.proxies.lock();
        for handle in &drained {
            if proxies.get(handle).is_some_and(|weak| weak.strong_count() == 0) {
                proxies.remove(handle);
            }
        }
        log::debug!("collected {} dropped native reference(s)", drained.len());
        drained.len()
    }

    /// Number of handles released by drops but not yet collected.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of live proxies.
    pub fn live(&self) -> usize {
        self.proxies
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn new_proxy(&self, handle: Handle, owning: bool) -> NativeObject {
        NativeObject {
            inner: Arc::new(ProxyInner {
                handle,
                owning: AtomicBool::new(owning),
                released: AtomicBool::new(false),
                queue: self.queue.clone(),
            }),
        }
    }
}

fn live_proxy(proxies: &HashMap<Handle, Weak<ProxyInner>>, handle: Handle) -> Option<Arc<ProxyInner>> {
    proxies
        .get(&handle)
        .and_then(Weak::upgrade)
        .filter(|inner| !inner.released.load(Ordering::Acquire))
}

/// Flip a borrowing proxy to owning. False if it already owned.
fn promote(inner: &ProxyInner) -> bool {
    inner
        .owning
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{ClassHandle, EntryPoint, TrampolineId};
    use crate::runtime::NativeValue;
    use crate::trampoline::Trampolines;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        retains: AtomicUsize,
        releases: AtomicUsize,
        release_delay: Option<Duration>,
        in_release: AtomicBool,
    }

    impl NativeRuntime for Counting {
        fn lookup_class(&self, _: &str) -> Option<ClassHandle> {
            None
        }
        fn class_of(&self, _: Handle) -> Option<ClassHandle> {
            None
        }
        fn resolve_method(&self, _: ClassHandle, _: &str) -> Option<EntryPoint> {
            None
        }
        fn resolve_symbol(&self, _: Option<&str>, _: &str) -> Option<EntryPoint> {
            None
        }
        fn call(
            &self,
            _: EntryPoint,
            _: Option<Handle>,
            _: &[NativeValue],
            _: &Trampolines,
        ) -> Result<NativeValue> {
            Ok(NativeValue::Void)
        }
        fn register_callback(
            &self,
            _: ClassHandle,
            _: &str,
            _: TrampolineId,
            _: Trampolines,
        ) -> Result<()> {
            Ok(())
        }
        fn retain(&self, _: Handle) {
            self.retains.fetch_add(1, Ordering::SeqCst);
        }
        fn release(&self, _: Handle) {
            self.in_release.store(true, Ordering::SeqCst);
            if let Some(delay) = self.release_delay {
                thread::sleep(delay);
            }
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (Arc<Counting>, LifecycleManager) {
        let runtime = Arc::new(Counting::default());
        let manager = LifecycleManager::new(runtime.clone());
        (runtime, manager)
    }

    fn h(addr: usize) -> Handle {
        Handle::from_raw(addr).unwrap()
    }

    #[test]
    fn null_wraps_to_none() {
        let (_, manager) = setup();
        assert!(manager.wrap(None, true).is_none());
        assert!(manager.wrap(Handle::from_raw(0), false).is_none());
    }

    #[test]
    fn same_handle_same_proxy() {
        let (rt, manager) = setup();
        let a = manager.wrap(h(0x10), true).unwrap();
        let b = manager.wrap(h(0x10), true).unwrap();
        assert!(a.same_proxy(&b));
        assert_eq!(rt.retains.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowing_proxy_is_promoted_once() {
        let (rt, manager) = setup();
        let borrowed = manager.wrap(h(0x20), false).unwrap();
        assert!(!borrowed.is_owning());
        assert_eq!(rt.retains.load(Ordering::SeqCst), 0);

        let owned = manager.wrap(h(0x20), true).unwrap();
        assert!(owned.same_proxy(&borrowed));
        assert!(borrowed.is_owning());
        manager.wrap(h(0x20), true).unwrap();
        assert_eq!(rt.retains.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let (rt, manager) = setup();
        let obj = manager.wrap(h(0x30), true).unwrap();
        manager.release(&obj);
        manager.release(&obj);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);
        assert!(matches!(obj.handle(), Err(BridgeError::StaleHandle { handle: 0x30 })));
        drop(obj);
        assert_eq!(manager.collect(), 0);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn releasing_a_borrowing_proxy_does_nothing() {
        let (rt, manager) = setup();
        let obj = manager.wrap(h(0x40), false).unwrap();
        manager.release(&obj);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 0);
        assert!(obj.handle().is_ok());
    }

    #[test]
    fn drop_defers_release_to_collect() {
        let (rt, manager) = setup();
        let obj = manager.wrap(h(0x50), true).unwrap();
        let clone = obj.clone();
        drop(obj);
        assert_eq!(manager.pending(), 0);
        drop(clone);
        assert_eq!(manager.pending(), 1);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 0);

        assert_eq!(manager.collect(), 1);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);
        assert_eq!(manager.live(), 0);
    }

    #[test]
    fn adopt_takes_over_without_retain() {
        let (rt, manager) = setup();
        let obj = manager.adopt(h(0x60));
        assert!(obj.is_owning());
        assert_eq!(rt.retains.load(Ordering::SeqCst), 0);

        // Second transfer of the same object: the proxy already owns one.
        let again = manager.adopt(h(0x60));
        assert!(again.same_proxy(&obj));
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);

        manager.release(&obj);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrap_during_release_gets_a_fresh_proxy() {
        let rt = Arc::new(Counting {
            release_delay: Some(Duration::from_millis(100)),
            ..Counting::default()
        });
        let manager = Arc::new(LifecycleManager::new(rt.clone()));
        let old = manager.wrap(h(0x70), true).unwrap();

        let releasing = {
            let manager = manager.clone();
            let old = old.clone();
            thread::spawn(move || manager.release(&old))
        };
        while !rt.in_release.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        let fresh = manager.wrap(h(0x70), true).unwrap();
        releasing.join().unwrap();

        assert!(fresh.handle().is_ok());
        assert!(!fresh.same_proxy(&old));
        assert!(old.handle().is_err());
        assert_eq!(rt.retains.load(Ordering::SeqCst), 2);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_proxy_is_not_reused() {
        let (rt, manager) = setup();
        let old = manager.wrap(h(0x80), false).unwrap();
        let owned = manager.wrap(h(0x80), true).unwrap();
        manager.release(&owned);

        let again = manager.adopt(h(0x80));
        assert!(!again.same_proxy(&old));
        assert!(again.handle().is_ok());
        assert_eq!(rt.retains.load(Ordering::SeqCst), 1);
        assert_eq!(rt.releases.load(Ordering::SeqCst), 1);
    }
}
