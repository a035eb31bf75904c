//! Dynamic library symbol loading.
//!
//! Backs raw-symbol resolution for runtimes that load exported functions
//! from shared libraries. Targets without a dynamic loader (Horizon) report
//! every open as unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::handle::EntryPoint;

pub use imp::DlLibrary;

#[cfg(not(target_os = "horizon"))]
mod imp {
    use std::ffi::c_void;

    use crate::error::{BridgeError, Result};
    use crate::handle::EntryPoint;

    /// An open shared library.
    pub struct DlLibrary {
        name: String,
        library: libloading::Library,
    }

    impl DlLibrary {
        /// Open a library by path, or the running process image for `None`.
        pub fn open(path: Option<&str>) -> Result<Self> {
            let (name, library) = match path {
                Some(p) => {
                    // SAFETY: loading runs the library's initializers; callers
                    // only name libraries their bindings were declared against.
                    let library = unsafe { libloading::Library::new(p) }.map_err(library_error)?;
                    (p.to_string(), library)
                }
                None => ("the process image".to_string(), this()?),
            };
            Ok(Self { name, library })
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        /// Address of an exported symbol.
        pub fn resolve(&self, symbol: &str) -> Result<EntryPoint> {
            // SAFETY: the symbol is read as an untyped address and never
            // called or dereferenced here.
            let sym = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) }
                .map_err(library_error)?;
            let addr = *sym as usize;
            EntryPoint::from_raw(addr).ok_or_else(|| BridgeError::Library {
                detail: format!("symbol '{symbol}' in {} resolved to null", self.name),
            })
        }

        pub fn close(self) -> Result<()> {
            self.library.close().map_err(library_error)
        }
    }

    #[cfg(unix)]
    fn this() -> Result<libloading::Library> {
        Ok(libloading::os::unix::Library::this().into())
    }

    #[cfg(windows)]
    fn this() -> Result<libloading::Library> {
        libloading::os::windows::Library::this()
            .map(Into::into)
            .map_err(library_error)
    }

    fn library_error(e: libloading::Error) -> BridgeError {
        BridgeError::Library {
            detail: e.to_string(),
        }
    }
}

#[cfg(target_os = "horizon")]
mod imp {
    use crate::error::{BridgeError, Result};
    use crate::handle::EntryPoint;

    /// Placeholder: Horizon has no dynamic loader.
    pub struct DlLibrary {
        _private: (),
    }

    impl DlLibrary {
        pub fn open(path: Option<&str>) -> Result<Self> {
            Err(BridgeError::Library {
                detail: format!(
                    "cannot open {}: dynamic loading is unavailable on this platform",
                    path.unwrap_or("the process image")
                ),
            })
        }

        pub fn name(&self) -> &str {
            ""
        }

        pub fn resolve(&self, symbol: &str) -> Result<EntryPoint> {
            Err(BridgeError::Library {
                detail: format!("cannot resolve '{symbol}': dynamic loading is unavailable"),
            })
        }

        pub fn close(self) -> Result<()> {
            Ok(())
        }
    }
}

/// Open libraries keyed by path, with the last failure kept for reporting.
#[derive(Default)]
pub struct SymbolTable {
    libraries: Mutex<HashMap<Option<String>, Arc<DlLibrary>>>,
    last_error: Mutex<Option<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `symbol` in `library`, opening the library on first use.
    /// Failures yield `None` and are kept for [`SymbolTable::last_error`].
    pub fn lookup(&self, library: Option<&str>, symbol: &str) -> Option<EntryPoint> {
        match self.try_lookup(library, symbol) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("symbol lookup failed: {e}");
                *self.last_error.lock() = Some(e.to_string());
                None
            }
        }
    }

    /// The most recent failure, cleared on read.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    /// Drop and close a cached library. Symbols resolved from it must no
    /// longer be called.
    pub fn close(&self, library: Option<&str>) -> Result<()> {
        let removed = self.libraries.lock().remove(&library.map(str::to_string));
        match removed.map(Arc::try_unwrap) {
            Some(Ok(lib)) => lib.close(),
            Some(Err(_)) => Err(BridgeError::Library {
                detail: format!("{} is still in use", library.unwrap_or("the process image")),
            }),
            None => Ok(()),
        }
    }

    fn try_lookup(&self, library: Option<&str>, symbol: &str) -> Result<EntryPoint> {
        let lib = {
            let mut libraries = self.libraries.lock();
            let key = library.map(str::to_string);
            match libraries.get(&key) {
                Some(lib) => lib.clone(),
                None => {
                    let lib = Arc::new(DlLibrary::open(library)?);
                    libraries.insert(key, lib.clone());
                    lib
                }
            }
        };
        lib.resolve(symbol)
    }
}
