//! Trampolines: managed closures the native side can call.
//!
//! A closure passed to native code is registered under a [`TrampolineId`].
//! When the native runtime calls the id, arguments are marshaled back into
//! managed values, the closure runs synchronously on the calling thread, and
//! its result is marshaled out again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{BridgeError, Result};
use crate::handle::TrampolineId;
use crate::lifecycle::LifecycleManager;
use crate::marshal::{self, ClosureSignature, ManagedClosure};
use crate::runtime::NativeValue;

struct Entry {
    signature: Arc<ClosureSignature>,
    closure: ManagedClosure,
}

struct Table {
    next: AtomicU64,
    entries: RwLock<HashMap<TrampolineId, Arc<Entry>>>,
    // The native runtime keeps tables alive for exported callbacks, and the
    // manager keeps the runtime alive.
    lifecycle: Weak<LifecycleManager>,
}

/// Shared trampoline table. Cloning shares the table.
#[derive(Clone)]
pub struct Trampolines {
    table: Arc<Table>,
}

impl Trampolines {
    pub fn new(lifecycle: &Arc<LifecycleManager>) -> Self {
        Self {
            table: Arc::new(Table {
                next: AtomicU64::new(1),
                entries: RwLock::new(HashMap::new()),
                lifecycle: Arc::downgrade(lifecycle),
            }),
        }
    }

    /// Register a closure and return the id the native side calls it by.
    pub fn register(&self, signature: Arc<ClosureSignature>, closure: ManagedClosure) -> TrampolineId {
        let id = TrampolineId(self.table.next.fetch_add(1, Ordering::Relaxed));
        log::trace!("registered trampoline {id} for {}", signature.name);
        self.table
            .entries
            .write()
            .insert(id, Arc::new(Entry { signature, closure }));
        id
    }

    /// Call a registered closure with native arguments.
    ///
    /// Fails with [`BridgeError::BridgeDropped`] once the owning bridge is gone.
    pub fn invoke(&self, id: TrampolineId, args: &[NativeValue]) -> Result<NativeValue> {
        let lifecycle = self.table.lifecycle.upgrade().ok_or(BridgeError::BridgeDropped)?;
        let entry = self
            .table
            .entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(BridgeError::UnknownTrampoline { id: id.0 })?;
        let sig = &entry.signature;
        if args.len() != sig.args.len() {
            return Err(BridgeError::ArgumentCount {
                operation: sig.name.clone(),
                expected: sig.args.len(),
                actual: args.len(),
            });
        }

        let values = args
            .iter()
            .zip(&sig.args)
            .map(|(arg, m)| marshal::from_native(arg.clone(), m, &lifecycle))
            .collect::<Result<Vec<_>>>()?;
        let result = entry.closure.call(&values)?;

        let mut scope = CallScope::new(self);
        marshal::to_native(&result, &sig.ret, &mut scope)
    }

    /// Unregister a closure. Returns whether it was registered.
    pub fn remove(&self, id: TrampolineId) -> bool {
        self.table.entries.write().remove(&id).is_some()
    }

    pub fn contains(&self, id: TrampolineId) -> bool {
        self.table.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.table.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trampolines registered for one outbound call.
///
/// Scoped (non-escaping) trampolines are unregistered when the scope ends;
/// escaping ones stay until removed explicitly.
pub struct CallScope<'t> {
    trampolines: &'t Trampolines,
    scoped: Vec<TrampolineId>,
}

impl<'t> CallScope<'t> {
    pub fn new(trampolines: &'t Trampolines) -> Self {
        Self {
            trampolines,
            scoped: Vec::new(),
        }
    }

    pub fn register(&mut self, signature: Arc<ClosureSignature>, closure: ManagedClosure) -> TrampolineId {
        let escaping = signature.escaping;
        let id = self.trampolines.register(signature, closure);
        if !escaping {
            self.scoped.push(id);
        }
        id
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        for id in self.scoped.drain(..) {
            self.trampolines.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{Marshal, Primitive, Value};
    use crate::runtime::NativeRuntime;

    struct Inert;

    impl NativeRuntime for Inert {
        fn lookup_class(&self, _: &str) -> Option<crate::handle::ClassHandle> {
            None
        }
        fn class_of(&self, _: crate::handle::Handle) -> Option<crate::handle::ClassHandle> {
            None
        }
        fn resolve_method(
            &self,
            _: crate::handle::ClassHandle,
            _: &str,
        ) -> Option<crate::handle::EntryPoint> {
            None
        }
        fn resolve_symbol(&self, _: Option<&str>, _: &str) -> Option<crate::handle::EntryPoint> {
            None
        }
        fn call(
            &self,
            _: crate::handle::EntryPoint,
            _: Option<crate::handle::Handle>,
            _: &[NativeValue],
            _: &Trampolines,
        ) -> Result<NativeValue> {
            Ok(NativeValue::Void)
        }
        fn register_callback(
            &self,
            _: crate::handle::ClassHandle,
            _: &str,
            _: TrampolineId,
            _: Trampolines,
        ) -> Result<()> {
            Ok(())
        }
        fn retain(&self, _: crate::handle::Handle) {}
        fn release(&self, _: crate::handle::Handle) {}
    }

    fn table() -> (Arc<LifecycleManager>, Trampolines) {
        let lifecycle = Arc::new(LifecycleManager::new(Arc::new(Inert)));
        let trampolines = Trampolines::new(&lifecycle);
        (lifecycle, trampolines)
    }

    fn adder(escaping: bool) -> Arc<ClosureSignature> {
        Arc::new(ClosureSignature {
            name: "Adder".into(),
            args: vec![Marshal::Primitive(Primitive::I32), Marshal::Primitive(Primitive::I32)],
            ret: Marshal::Primitive(Primitive::I64),
            escaping,
        })
    }

    fn sum() -> ManagedClosure {
        ManagedClosure::new(|args| {
            let total: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(Value::Int(total))
        })
    }

    #[test]
    fn invoke_marshals_both_ways() {
        let (_lifecycle, t) = table();
        let id = t.register(adder(true), sum());
        let out = t
            .invoke(id, &[NativeValue::I32(40), NativeValue::I32(2)])
            .unwrap();
        assert_eq!(out, NativeValue::I64(42));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let (_lifecycle, t) = table();
        let id = t.register(adder(true), sum());
        assert!(matches!(
            t.invoke(id, &[NativeValue::I32(1)]),
            Err(BridgeError::ArgumentCount { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn scope_removes_only_scoped_trampolines() {
        let (_lifecycle, t) = table();
        let (scoped, escaping) = {
            let mut scope = CallScope::new(&t);
            let a = scope.register(adder(false), sum());
            let b = scope.register(adder(true), sum());
            assert_eq!(t.len(), 2);
            (a, b)
        };
        assert!(!t.contains(scoped));
        assert!(t.contains(escaping));
        assert!(matches!(
            t.invoke(scoped, &[NativeValue::I32(1), NativeValue::I32(1)]),
            Err(BridgeError::UnknownTrampoline { .. })
        ));
        assert!(t.remove(escaping));
        assert!(t.is_empty());
    }

    #[test]
    fn invoke_fails_once_the_manager_is_gone() {
        let (lifecycle, t) = table();
        let id = t.register(adder(true), sum());
        drop(lifecycle);
        assert!(t.contains(id));
        assert!(matches!(
            t.invoke(id, &[NativeValue::I32(1), NativeValue::I32(1)]),
            Err(BridgeError::BridgeDropped)
        ));
    }
}
