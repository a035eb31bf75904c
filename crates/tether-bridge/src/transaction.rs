//! Transactional native objects.
//!
//! Some native frameworks expose persisted objects with a common change
//! tracking surface: `hasChanges`, `isNew`, `reset`, `rollback` and
//! `refresh`. [`TransactionalObject`] drives that surface through ordinary
//! bound operations on the object's managed type.

use crate::bridge::Bridge;
use crate::declaration::{ClassDecl, OperationDecl, OperationKind, Ownership};
use crate::error::{BridgeError, Result};
use crate::lifecycle::NativeObject;
use crate::marshal::Value;

pub const HAS_CHANGES: &str = "hasChanges";
pub const IS_NEW: &str = "isNew";
pub const RESET: &str = "reset";
pub const ROLLBACK: &str = "rollback";
pub const REFRESH: &str = "refresh";

/// Class declaration carrying the five change-tracking operations.
pub fn transactional_class(managed_type: &str, native_name: &str) -> ClassDecl {
    let op = |name: &str, kind, returns: &str| OperationDecl {
        name: name.to_string(),
        kind,
        selector: None,
        symbol: None,
        args: Vec::new(),
        returns: returns.to_string(),
        ownership: Ownership::Borrowed,
    };
    ClassDecl {
        managed_type: managed_type.to_string(),
        native_name: native_name.to_string(),
        kind: Default::default(),
        library: None,
        thread_affinity: Default::default(),
        operations: vec![
            op(HAS_CHANGES, OperationKind::PropertyGet, "bool"),
            op(IS_NEW, OperationKind::PropertyGet, "bool"),
            op(RESET, OperationKind::InstanceMethod, "void"),
            op(ROLLBACK, OperationKind::InstanceMethod, "void"),
            op(REFRESH, OperationKind::InstanceMethod, "bool"),
        ],
    }
}

/// A native object with change tracking.
pub struct TransactionalObject<'b> {
    bridge: &'b Bridge,
    managed_type: String,
    object: NativeObject,
}

impl<'b> TransactionalObject<'b> {
    pub fn new(bridge: &'b Bridge, managed_type: impl Into<String>, object: NativeObject) -> Self {
        Self {
            bridge,
            managed_type: managed_type.into(),
            object,
        }
    }

    pub fn object(&self) -> &NativeObject {
        &self.object
    }

    /// Whether the object has unsaved changes.
    pub fn has_changes(&self) -> Result<bool> {
        self.query(HAS_CHANGES)
    }

    /// Whether the object has never been saved.
    pub fn is_new(&self) -> Result<bool> {
        self.query(IS_NEW)
    }

    /// Discard in-memory state; the object reloads lazily.
    pub fn reset(&self) -> Result<()> {
        self.call(RESET).map(drop)
    }

    /// Discard unsaved changes.
    pub fn rollback(&self) -> Result<()> {
        self.call(ROLLBACK).map(drop)
    }

    /// Reload from the store. `false` when the object no longer exists,
    /// including when its handle has gone stale.
    pub fn refresh(&self) -> Result<bool> {
        match self.query(REFRESH) {
            Err(BridgeError::StaleHandle { handle }) => {
                log::debug!("refresh on stale handle 0x{handle:x}");
                Ok(false)
            }
            other => other,
        }
    }

    fn call(&self, name: &str) -> Result<Value> {
        self.bridge
            .invoke(&self.managed_type, name, Some(&self.object), &[])
    }

    fn query(&self, name: &str) -> Result<bool> {
        let value = self.call(name)?;
        value.as_bool().ok_or_else(|| BridgeError::Marshal {
            detail: format!("{name} returned {} instead of bool", value.kind()),
        })
    }
}
