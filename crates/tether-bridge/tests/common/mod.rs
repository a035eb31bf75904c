//! In-process stand-in for a native object runtime, with call-count probes.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_bridge::error::Result;
use tether_bridge::{
    BridgeError, ClassHandle, EntryPoint, Handle, NativeRuntime, NativeValue, TrampolineId,
    Trampolines,
};

/// Arguments of one native call as seen by a fake implementation.
pub struct Call<'a> {
    pub runtime: &'a FakeRuntime,
    pub receiver: Option<Handle>,
    pub args: &'a [NativeValue],
    pub trampolines: &'a Trampolines,
}

type Impl = Arc<dyn Fn(&Call<'_>) -> Result<NativeValue> + Send + Sync>;

#[derive(Default)]
struct State {
    next: usize,
    classes: HashMap<String, ClassHandle>,
    class_names: HashMap<ClassHandle, String>,
    superclass: HashMap<ClassHandle, ClassHandle>,
    methods: HashMap<(ClassHandle, String), EntryPoint>,
    symbols: HashMap<String, EntryPoint>,
    impls: HashMap<EntryPoint, Impl>,
    objects: HashMap<Handle, ClassHandle>,
    refs: HashMap<Handle, i64>,
    callbacks: HashMap<(ClassHandle, String), (TrampolineId, Trampolines)>,
}

impl State {
    fn fresh(&mut self) -> usize {
        self.next += 0x10;
        0x1000 + self.next
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    class_lookups: Mutex<HashMap<String, usize>>,
    symbol_libraries: Mutex<Vec<Option<String>>>,
    pub method_resolutions: AtomicUsize,
    pub symbol_resolutions: AtomicUsize,
    pub retains: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn define_class(&self, name: &str, superclass: Option<ClassHandle>) -> ClassHandle {
        let mut state = self.state.lock();
        let class = ClassHandle::from_raw(state.fresh()).unwrap();
        state.classes.insert(name.to_string(), class);
        state.class_names.insert(class, name.to_string());
        if let Some(parent) = superclass {
            state.superclass.insert(class, parent);
        }
        class
    }

    pub fn define_method(
        &self,
        class: ClassHandle,
        selector: &str,
        f: impl Fn(&Call<'_>) -> Result<NativeValue> + Send + Sync + 'static,
    ) -> EntryPoint {
        let mut state = self.state.lock();
        let entry = EntryPoint::from_raw(state.fresh()).unwrap();
        state.methods.insert((class, selector.to_string()), entry);
        state.impls.insert(entry, Arc::new(f));
        entry
    }

    pub fn define_symbol(
        &self,
        symbol: &str,
        f: impl Fn(&Call<'_>) -> Result<NativeValue> + Send + Sync + 'static,
    ) -> EntryPoint {
        let mut state = self.state.lock();
        let entry = EntryPoint::from_raw(state.fresh()).unwrap();
        state.symbols.insert(symbol.to_string(), entry);
        state.impls.insert(entry, Arc::new(f));
        entry
    }

    /// Allocate an object. `initial_refs` is the reference count already
    /// handed to managed code (1 for transferred results).
    pub fn new_object(&self, class: ClassHandle, initial_refs: i64) -> Handle {
        let mut state = self.state.lock();
        let handle = Handle::from_raw(state.fresh()).unwrap();
        state.objects.insert(handle, class);
        state.refs.insert(handle, initial_refs);
        handle
    }

    /// Destroy an object out from under its proxies.
    pub fn delete_object(&self, handle: Handle) {
        self.state.lock().objects.remove(&handle);
    }

    /// References managed code currently holds on `handle`.
    pub fn refs(&self, handle: Handle) -> i64 {
        self.state.lock().refs.get(&handle).copied().unwrap_or(0)
    }

    pub fn class_lookups(&self, name: &str) -> usize {
        self.class_lookups.lock().get(name).copied().unwrap_or(0)
    }

    /// The library argument of every symbol resolution, in order.
    pub fn symbol_libraries(&self) -> Vec<Option<String>> {
        self.symbol_libraries.lock().clone()
    }

    /// Call a managed implementation registered through `register_callback`,
    /// the way the native runtime would.
    pub fn fire_callback(
        &self,
        class: ClassHandle,
        selector: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue> {
        let registered = self
            .state
            .lock()
            .callbacks
            .get(&(class, selector.to_string()))
            .cloned();
        let (id, trampolines) = registered.ok_or_else(|| BridgeError::Native {
            detail: format!("no callback for {selector}"),
        })?;
        trampolines.invoke(id, args)
    }
}

impl NativeRuntime for FakeRuntime {
    fn lookup_class(&self, name: &str) -> Option<ClassHandle> {
        *self.class_lookups.lock().entry(name.to_string()).or_default() += 1;
        self.state.lock().classes.get(name).copied()
    }

    fn class_of(&self, object: Handle) -> Option<ClassHandle> {
        self.state.lock().objects.get(&object).copied()
    }

    fn class_name(&self, class: ClassHandle) -> String {
        self.state
            .lock()
            .class_names
            .get(&class)
            .cloned()
            .unwrap_or_else(|| class.to_string())
    }

    fn resolve_method(&self, class: ClassHandle, selector: &str) -> Option<EntryPoint> {
        self.method_resolutions.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(entry) = state.methods.get(&(c, selector.to_string())) {
                return Some(*entry);
            }
            current = state.superclass.get(&c).copied();
        }
        None
    }

    fn resolve_symbol(&self, library: Option<&str>, symbol: &str) -> Option<EntryPoint> {
        self.symbol_resolutions.fetch_add(1, Ordering::SeqCst);
        self.symbol_libraries.lock().push(library.map(str::to_string));
        self.state.lock().symbols.get(symbol).copied()
    }

    fn call(
        &self,
        entry: EntryPoint,
        receiver: Option<Handle>,
        args: &[NativeValue],
        trampolines: &Trampolines,
    ) -> Result<NativeValue> {
        let f = self
            .state
            .lock()
            .impls
            .get(&entry)
            .cloned()
            .ok_or_else(|| BridgeError::Native {
                detail: format!("no implementation at {entry}"),
            })?;
        f(&Call {
            runtime: self,
            receiver,
            args,
            trampolines,
        })
    }

    fn register_callback(
        &self,
        class: ClassHandle,
        selector: &str,
        trampoline: TrampolineId,
        trampolines: Trampolines,
    ) -> Result<()> {
        self.state
            .lock()
            .callbacks
            .insert((class, selector.to_string()), (trampoline, trampolines));
        Ok(())
    }

    fn retain(&self, object: Handle) {
        self.retains.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().refs.entry(object).or_default() += 1;
    }

    fn release(&self, object: Handle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().refs.entry(object).or_default() -= 1;
    }
}
