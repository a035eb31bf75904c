//! Native object bridge for Tether.
//!
//! Lets managed code bind to classes of a dynamic native object runtime,
//! call their operations, and manage the lifetime of native objects:
//!
//! - **Declarations** ([`declaration`]): `*.bindings.toml` files naming the
//!   classes, operations, structures and closures a library exposes
//! - **Bindings** ([`bindings`]): declarations compiled into marshaling plans
//!   for one architecture
//! - **Dispatch** ([`dispatch`]): selector and raw-symbol resolution, cached
//!   per class and per symbol
//! - **Lifecycle** ([`lifecycle`]): one proxy per native handle, at most one
//!   owner, releases serialized off the drop path
//! - **Trampolines** ([`trampoline`]): managed closures callable from native
//!   code
//!
//! The native runtime itself sits behind the [`runtime::NativeRuntime`]
//! trait.

pub mod bindings;
pub mod bridge;
pub mod declaration;
pub mod dispatch;
pub mod dl;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod marshal;
pub mod once_map;
pub mod registry;
pub mod runtime;
pub mod trampoline;
pub mod transaction;

pub use bindings::{BindingSet, BoundOperation, ClassBinding};
pub use bridge::Bridge;
pub use declaration::{BindingFile, OperationKind, Ownership, ThreadAffinity};
pub use error::BridgeError;
pub use handle::{ClassHandle, EntryPoint, Handle, TrampolineId};
pub use lifecycle::{LifecycleManager, NativeObject};
pub use marshal::{ManagedClosure, Marshal, MarshalPlan, StructValue, Value};
pub use runtime::{NativeRuntime, NativeValue};
pub use trampoline::Trampolines;
pub use transaction::TransactionalObject;
