//! Binding declaration files (`*.bindings.toml`).
//!
//! A declaration file lists the native classes a library exposes to managed
//! code, the operations bound on each class, and the by-value structures and
//! closure signatures those operations use. Declarations are data only; they
//! are compiled into marshaling plans by [`crate::bindings`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A complete binding declaration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BindingFile {
    /// The native library the bindings belong to.
    pub library: LibraryDecl,
    /// By-value structures, in dependency order.
    #[serde(default)]
    pub structs: Vec<StructDecl>,
    /// Closure signatures used by closure-typed arguments.
    #[serde(default)]
    pub closures: Vec<ClosureDecl>,
    /// Bound native classes and protocols.
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

/// The native library or framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LibraryDecl {
    /// Library name (e.g., "EventKit").
    pub name: String,
    /// Explicit path to load raw symbols from.
    #[serde(default)]
    pub path: Option<String>,
}

/// A by-value structure: field types in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<String>,
}

/// A closure signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureDecl {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_void")]
    pub returns: String,
    /// Whether the native side may keep the closure after the call returns.
    #[serde(default)]
    pub escaping: bool,
}

fn default_void() -> String {
    "void".to_string()
}

/// Whether a binding names a class or a protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Class,
    Protocol,
}

/// Thread constraint the native class documents.
///
/// Recorded and surfaced on every bound operation; not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadAffinity {
    #[default]
    Any,
    Main,
}

/// A bound native class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassDecl {
    /// Fully qualified managed type name.
    pub managed_type: String,
    /// Name of the class in the native runtime's class table.
    pub native_name: String,
    #[serde(default)]
    pub kind: ClassKind,
    /// Library the class lives in, if different from the file's library.
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub thread_affinity: ThreadAffinity,
    #[serde(default)]
    pub operations: Vec<OperationDecl>,
}

/// The kind of a bound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Instance method, dispatched dynamically by selector.
    InstanceMethod,
    /// Property getter, dispatched by selector.
    PropertyGet,
    /// Property setter, dispatched by selector.
    PropertySet,
    /// Fixed exported function, resolved once and called directly.
    RawSymbol,
    /// Managed implementation the native runtime calls into.
    InboundCallback,
}

impl OperationKind {
    /// Whether the operation goes through selector dispatch.
    pub fn uses_selector(self) -> bool {
        matches!(
            self,
            Self::InstanceMethod | Self::PropertyGet | Self::PropertySet | Self::InboundCallback
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InstanceMethod => "instance-method",
            Self::PropertyGet => "property-get",
            Self::PropertySet => "property-set",
            Self::RawSymbol => "raw-symbol",
            Self::InboundCallback => "inbound-callback",
        };
        f.pad(s)
    }
}

/// Who owns the native reference returned by an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// The caller must retain to keep the object.
    #[default]
    Borrowed,
    /// The native side already retained the object on the caller's behalf.
    Transferred,
}

/// A single bound operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperationDecl {
    /// Managed-side name.
    pub name: String,
    pub kind: OperationKind,
    /// Native selector; defaults to `name`.
    #[serde(default)]
    pub selector: Option<String>,
    /// Exported symbol for raw-symbol bindings; defaults to `name`.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_void")]
    pub returns: String,
    #[serde(default)]
    pub ownership: Ownership,
}

impl OperationDecl {
    /// The native name this operation resolves: selector or symbol.
    pub fn native_name(&self) -> &str {
        let explicit = match self.kind {
            OperationKind::RawSymbol => self.symbol.as_deref(),
            _ => self.selector.as_deref(),
        };
        explicit.unwrap_or(&self.name)
    }
}

impl BindingFile {
    /// Parse and validate a declaration from a TOML string.
    pub fn parse(input: &str) -> Result<Self> {
        let file: BindingFile = toml::from_str(input)?;
        file.validate()?;
        Ok(file)
    }

    /// Parse a declaration from a file path.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.library.name.is_empty() {
            return Err(invalid("library.name is required".into()));
        }

        let mut types = HashSet::new();
        for class in &self.classes {
            if class.native_name.is_empty() {
                return Err(invalid(format!(
                    "class '{}' has an empty native-name",
                    class.managed_type
                )));
            }
            if !types.insert(class.managed_type.as_str()) {
                return Err(invalid(format!(
                    "managed type '{}' is bound more than once",
                    class.managed_type
                )));
            }

            let mut names = HashSet::new();
            for op in &class.operations {
                if !names.insert(op.name.as_str()) {
                    return Err(invalid(format!(
                        "operation '{}' is declared twice on '{}'",
                        op.name, class.managed_type
                    )));
                }
                validate_shape(&class.managed_type, op)?;
            }
        }
        Ok(())
    }

    /// Look up a class declaration by managed type.
    pub fn class(&self, managed_type: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.managed_type == managed_type)
    }
}

fn validate_shape(owner: &str, op: &OperationDecl) -> Result<()> {
    let returns_void = op.returns == "void";
    match op.kind {
        OperationKind::PropertyGet if !op.args.is_empty() || returns_void => Err(invalid(format!(
            "property getter '{owner}.{}' must take no arguments and return a value",
            op.name
        ))),
        OperationKind::PropertySet if op.args.len() != 1 || !returns_void => Err(invalid(format!(
            "property setter '{owner}.{}' must take one argument and return void",
            op.name
        ))),
        _ => Ok(()),
    }
}

fn invalid(detail: String) -> BridgeError {
    BridgeError::InvalidDeclaration { detail }
}
