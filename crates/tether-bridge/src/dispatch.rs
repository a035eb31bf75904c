//! Bound operation dispatch.

use std::sync::Arc;

use crate::bindings::BoundOperation;
use crate::declaration::{OperationKind, ThreadAffinity};
use crate::error::{BridgeError, Result};
use crate::handle::{ClassHandle, EntryPoint, Handle, TrampolineId};
use crate::lifecycle::{LifecycleManager, NativeObject};
use crate::marshal::{self, ClosureSignature, ManagedClosure, Value};
use crate::once_map::OnceMap;
use crate::registry::ClassRegistry;
use crate::runtime::NativeRuntime;
use crate::trampoline::{CallScope, Trampolines};

/// Resolves bound operations to native entry points and calls them.
///
/// Selector lookups are cached per (actual class, selector), so a subclass
/// overriding a method gets its own entry. Raw symbols are cached per
/// (library, symbol). No lock is held while native code runs.
pub struct Dispatcher {
    runtime: Arc<dyn NativeRuntime>,
    registry: ClassRegistry,
    lifecycle: Arc<LifecycleManager>,
    trampolines: Trampolines,
    methods: OnceMap<(ClassHandle, String), Option<EntryPoint>>,
    symbols: OnceMap<(String, String), Option<EntryPoint>>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new(runtime.clone()));
        Self {
            registry: ClassRegistry::new(runtime.clone()),
            trampolines: Trampolines::new(&lifecycle),
            lifecycle,
            runtime,
            methods: OnceMap::new(),
            symbols: OnceMap::new(),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn trampolines(&self) -> &Trampolines {
        &self.trampolines
    }

    /// Invoke a bound operation.
    pub fn invoke(
        &self,
        op: &BoundOperation,
        receiver: Option<&NativeObject>,
        args: &[Value],
    ) -> Result<Value> {
        self.lifecycle.collect();

        if args.len() != op.plan.args.len() {
            return Err(BridgeError::ArgumentCount {
                operation: op.qualified_name(),
                expected: op.plan.args.len(),
                actual: args.len(),
            });
        }

        // Class resolution happens before any dispatch on the type.
        self.registry.resolve(&op.class)?;

        if op.thread_affinity() == ThreadAffinity::Main {
            log::trace!("{} is documented main-thread only", op.qualified_name());
        }

        let (entry, receiver) = match op.kind {
            OperationKind::InstanceMethod | OperationKind::PropertyGet | OperationKind::PropertySet => {
                let receiver = receiver.ok_or_else(|| BridgeError::NotInvokable {
                    operation: op.qualified_name(),
                    kind: op.kind,
                    detail: "a receiver is required".into(),
                })?;
                let handle = receiver.handle()?;
                (self.resolve_selector(op, handle)?, Some(handle))
            }
            OperationKind::RawSymbol => {
                let handle = receiver.map(NativeObject::handle).transpose()?;
                (self.resolve_symbol(op)?, handle)
            }
            OperationKind::InboundCallback => {
                return Err(BridgeError::NotInvokable {
                    operation: op.qualified_name(),
                    kind: op.kind,
                    detail: "inbound callbacks are called by the native runtime".into(),
                })
            }
        };

        let mut scope = CallScope::new(&self.trampolines);
        let native_args = args
            .iter()
            .zip(&op.plan.args)
            .map(|(value, m)| marshal::to_native(value, m, &mut scope))
            .collect::<Result<Vec<_>>>()?;

        log::trace!("calling {} at {entry}", op.qualified_name());
        let raw = self
            .runtime
            .call(entry, receiver, &native_args, &self.trampolines)?;
        marshal::from_native(raw, &op.plan.ret, &self.lifecycle)
    }

    /// Register a managed closure as the implementation of an inbound
    /// callback binding.
    pub fn export(&self, op: &BoundOperation, closure: ManagedClosure) -> Result<TrampolineId> {
        if op.kind != OperationKind::InboundCallback {
            return Err(BridgeError::NotInvokable {
                operation: op.qualified_name(),
                kind: op.kind,
                detail: "only inbound callbacks can be exported".into(),
            });
        }
        let class = self.registry.resolve(&op.class)?;
        let signature = Arc::new(ClosureSignature {
            name: op.qualified_name(),
            args: op.plan.args.clone(),
            ret: op.plan.ret.clone(),
            escaping: true,
        });
        let id = self.trampolines.register(signature, closure);
        if let Err(e) =
            self.runtime
                .register_callback(class, &op.native_name, id, self.trampolines.clone())
        {
            self.trampolines.remove(id);
            return Err(e);
        }
        log::debug!("exported {} as {id}", op.qualified_name());
        Ok(id)
    }

    fn resolve_selector(&self, op: &BoundOperation, receiver: Handle) -> Result<EntryPoint> {
        let class = self
            .runtime
            .class_of(receiver)
            .ok_or(BridgeError::StaleHandle {
                handle: receiver.addr(),
            })?;
        let selector = &op.native_name;
        self.methods
            .get_or_resolve(&(class, selector.clone()), || {
                self.runtime.resolve_method(class, selector)
            })
            .ok_or_else(|| BridgeError::SelectorNotFound {
                class: self.runtime.class_name(class),
                selector: selector.clone(),
            })
    }

    fn resolve_symbol(&self, op: &BoundOperation) -> Result<EntryPoint> {
        let library = op.class.symbol_library();
        let symbol = &op.native_name;
        self.symbols
            .get_or_resolve(&(library.to_string(), symbol.clone()), || {
                self.runtime.resolve_symbol(Some(library), symbol)
            })
            .ok_or_else(|| BridgeError::SymbolNotFound {
                library: library.to_string(),
                symbol: symbol.clone(),
            })
    }
}
