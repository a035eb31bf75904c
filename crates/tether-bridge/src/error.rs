//! Bridge error types.

use crate::declaration::OperationKind;

/// Errors that can occur while binding to or calling into the native runtime.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The native runtime has no class with this name. Cached per type.
    #[error("native class not found: {name}")]
    NativeClassNotFound { name: String },

    /// The receiver's class does not respond to the selector.
    #[error("class '{class}' does not respond to selector '{selector}'")]
    SelectorNotFound { class: String, selector: String },

    /// An exported symbol could not be resolved.
    #[error("symbol '{symbol}' not found in {library}")]
    SymbolNotFound { library: String, symbol: String },

    /// The native object behind a handle no longer exists.
    #[error("stale native handle 0x{handle:x}")]
    StaleHandle { handle: usize },

    /// A binding declaration is malformed.
    #[error("invalid binding declaration: {detail}")]
    InvalidDeclaration { detail: String },

    /// A value could not be converted across the boundary.
    #[error("marshaling failed: {detail}")]
    Marshal { detail: String },

    /// Wrong number of arguments for a bound operation.
    #[error("'{operation}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    /// The operation cannot be called from managed code in this way.
    #[error("'{operation}' ({kind}) cannot be invoked: {detail}")]
    NotInvokable {
        operation: String,
        kind: OperationKind,
        detail: String,
    },

    /// The managed type has no class binding.
    #[error("managed type '{managed_type}' is not bound")]
    UnboundType { managed_type: String },

    /// No bound operation under this name.
    #[error("no operation '{name}' bound on '{managed_type}'")]
    UnknownOperation { managed_type: String, name: String },

    /// A trampoline id that is not (or no longer) registered.
    #[error("unknown trampoline #{id}")]
    UnknownTrampoline { id: u64 },

    /// The bridge that registered a trampoline has been dropped.
    #[error("the bridge that registered this closure has been dropped")]
    BridgeDropped,

    /// A process-wide bridge has already been installed.
    #[error("a bridge is already installed for this process")]
    AlreadyInstalled,

    /// Fault reported by the native runtime itself.
    #[error("native runtime error: {detail}")]
    Native { detail: String },

    /// Dynamic library loading or symbol lookup failed.
    #[error("dynamic library error: {detail}")]
    Library { detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
