//! Error types for target resolution and build orchestration.

use std::path::PathBuf;

/// Errors that can occur while resolving a target or running a build.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The host toolchain triple does not name any known platform family.
    #[error("unrecognized OS in host triple: {triple}")]
    UnsupportedHost {
        /// The triple reported by the host toolchain.
        triple: String,
    },

    /// The linker exited with a non-zero status.
    #[error("linker failed{}: {output}", exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Link {
        /// Exit code of the linker, `None` if it was terminated by a signal.
        exit_code: Option<i32>,
        /// Captured stdout followed by stderr.
        output: String,
    },

    /// A target was driven out of order (e.g. `build` before `initialize`).
    #[error("contract violation: cannot {operation} a target in state {state}")]
    ContractViolation {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the target was in.
        state: &'static str,
    },

    /// No target type is registered under this id.
    #[error("unknown target type: '{id}'")]
    UnknownTarget { id: String },

    /// No platform descriptor exists for this id.
    #[error("unknown platform: '{id}'")]
    UnknownPlatform { id: String },

    /// No architecture descriptor exists for this id.
    #[error("unknown architecture: '{id}'")]
    UnknownArch { id: String },

    /// The configured platform belongs to a family the target cannot build.
    #[error("target '{target}' cannot build for platform '{platform}'")]
    PlatformMismatch {
        target: &'static str,
        platform: &'static str,
    },

    /// The configured architecture is not supported by the target.
    #[error("target '{target}' does not support architecture '{arch}' on '{platform}'")]
    UnsupportedArch {
        target: &'static str,
        platform: &'static str,
        arch: &'static str,
    },

    /// The toolchain executable could not be started.
    #[error("failed to invoke {}: {source}", program.display())]
    ToolchainSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error reading configuration or writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or artifact file not found.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;
