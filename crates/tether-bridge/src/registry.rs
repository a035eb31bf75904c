//! Class binding registry.
//!
//! Resolves each bound managed type to its native class exactly once per
//! process. Misses are cached too: a class that was not found is reported as
//! not found on every later use without asking the runtime again.

use std::sync::Arc;

use crate::bindings::ClassBinding;
use crate::error::{BridgeError, Result};
use crate::handle::ClassHandle;
use crate::once_map::OnceMap;
use crate::runtime::NativeRuntime;

pub struct ClassRegistry {
    runtime: Arc<dyn NativeRuntime>,
    classes: OnceMap<String, Option<ClassHandle>>,
}

impl ClassRegistry {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            classes: OnceMap::new(),
        }
    }

    /// The native class for a binding.
    pub fn resolve(&self, binding: &ClassBinding) -> Result<ClassHandle> {
        let found = self.classes.get_or_resolve(&binding.managed_type, || {
            let class = self.runtime.lookup_class(&binding.native_name);
            match class {
                Some(c) => log::debug!("bound {} to native class {c}", binding.managed_type),
                None => log::warn!(
                    "native class '{}' for {} not found",
                    binding.native_name,
                    binding.managed_type
                ),
            }
            class
        });
        found.ok_or_else(|| BridgeError::NativeClassNotFound {
            name: binding.native_name.clone(),
        })
    }

    /// The cached outcome for a managed type, if it has been resolved.
    pub fn cached(&self, managed_type: &str) -> Option<Option<ClassHandle>> {
        self.classes.get(&managed_type.to_string())
    }

    /// Number of managed types resolved so far, found or not.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
