//! Target resolution and native build orchestration for Tether.
//!
//! Maps an (operating system, architecture) pair onto a concrete linker
//! invocation, a default architecture set, and platform packaging rules:
//!
//! - **Platform descriptors** ([`os`]): one static descriptor per OS
//! - **Architecture descriptors** ([`arch`]): word size, byte order, ABI
//! - **Targets** ([`target`]): the closed set of build variants and their
//!   `initialize -> build -> archive -> launch` lifecycle
//! - **Orchestration** ([`orchestrator`]): resolve a target and drive it

pub mod arch;
pub mod config;
pub mod error;
pub mod link;
pub mod orchestrator;
pub mod os;
pub mod target;
pub mod triple;

pub use arch::{Arch, ArchDescriptor, Endianness};
pub use config::BuildConfig;
pub use error::TargetError;
pub use link::LinkInvocation;
pub use orchestrator::{plan_architectures, resolve_target_kind, BuildReport, BuildRequest};
pub use os::{Os, OsFamily, PlatformDescriptor};
pub use target::{ArchiveOutcome, LaunchOutcome, Packaging, Target, TargetKind, TargetState};
pub use triple::{host_triple, target_triple};
