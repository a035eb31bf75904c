//! The bridge facade.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tether_targets::Arch;

use crate::bindings::{BindingSet, BoundOperation, ClassBinding};
use crate::declaration::BindingFile;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::handle::{ClassHandle, Handle, TrampolineId};
use crate::lifecycle::{LifecycleManager, NativeObject};
use crate::marshal::{ManagedClosure, Value};
use crate::runtime::NativeRuntime;
use crate::trampoline::Trampolines;

static GLOBAL: OnceCell<Bridge> = OnceCell::new();

/// Managed code's view of the native object runtime: bound classes, their
/// operations, and the proxies for native objects.
pub struct Bridge {
    arch: Arch,
    bindings: RwLock<BindingSet>,
    dispatcher: Dispatcher,
}

impl Bridge {
    pub fn new(runtime: Arc<dyn NativeRuntime>, arch: Arch) -> Self {
        Self {
            arch,
            bindings: RwLock::new(BindingSet::default()),
            dispatcher: Dispatcher::new(runtime),
        }
    }

    /// Install `bridge` as the process-wide instance.
    pub fn install(bridge: Bridge) -> Result<&'static Bridge> {
        GLOBAL
            .set(bridge)
            .map_err(|_| BridgeError::AlreadyInstalled)?;
        GLOBAL.get().ok_or(BridgeError::AlreadyInstalled)
    }

    /// The process-wide instance, if one was installed.
    pub fn global() -> Option<&'static Bridge> {
        GLOBAL.get()
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Compile a declaration file and add its bindings. Returns the number of
    /// operations added.
    pub fn load_bindings(&self, file: &BindingFile) -> Result<usize> {
        let compiled = BindingSet::compile(file, self.arch)?;
        let added = compiled.operations().count();
        self.bindings.write().merge(compiled)?;
        Ok(added)
    }

    /// Resolve a bound managed type to its native class. Memoized: the
    /// runtime is asked once per type, and a miss fails every later call.
    pub fn bind(&self, managed_type: &str) -> Result<ClassHandle> {
        let class = self.class(managed_type)?;
        self.dispatcher.registry().resolve(&class)
    }

    pub fn class(&self, managed_type: &str) -> Result<Arc<ClassBinding>> {
        self.bindings.read().class(managed_type)
    }

    pub fn operation(&self, managed_type: &str, name: &str) -> Result<Arc<BoundOperation>> {
        self.bindings.read().operation(managed_type, name)
    }

    /// Invoke `managed_type.name` on `receiver`.
    pub fn invoke(
        &self,
        managed_type: &str,
        name: &str,
        receiver: Option<&NativeObject>,
        args: &[Value],
    ) -> Result<Value> {
        let op = self.operation(managed_type, name)?;
        self.dispatcher.invoke(&op, receiver, args)
    }

    /// Invoke an operation already looked up.
    pub fn invoke_operation(
        &self,
        op: &BoundOperation,
        receiver: Option<&NativeObject>,
        args: &[Value],
    ) -> Result<Value> {
        self.dispatcher.invoke(op, receiver, args)
    }

    /// Register `closure` as the implementation of an inbound callback.
    pub fn export(&self, managed_type: &str, name: &str, closure: ManagedClosure) -> Result<TrampolineId> {
        let op = self.operation(managed_type, name)?;
        self.dispatcher.export(&op, closure)
    }

    /// Proxy for a handle; `None` for null.
    pub fn wrap(&self, handle: impl Into<Option<Handle>>, owning: bool) -> Option<NativeObject> {
        self.dispatcher.lifecycle().wrap(handle, owning)
    }

    pub fn release(&self, object: &NativeObject) {
        self.dispatcher.lifecycle().release(object)
    }

    /// Release references held by dropped proxies.
    pub fn collect(&self) -> usize {
        self.dispatcher.lifecycle().collect()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        self.dispatcher.lifecycle()
    }

    pub fn trampolines(&self) -> &Trampolines {
        self.dispatcher.trampolines()
    }
}
