//! Compiled bindings.
//!
//! A [`BindingFile`] is compiled once per architecture into an immutable
//! table of [`ClassBinding`]s and [`BoundOperation`]s, each operation carrying
//! its precomputed [`MarshalPlan`].

use std::collections::HashMap;
use std::sync::Arc;

use tether_targets::Arch;

use crate::declaration::{
    BindingFile, ClassKind, ClosureDecl, OperationDecl, OperationKind, Ownership, ThreadAffinity,
};
use crate::error::{BridgeError, Result};
use crate::marshal::{ClosureSignature, Marshal, MarshalPlan, StructLayout, TypeRef};

/// A managed type bound to a native class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBinding {
    pub managed_type: String,
    pub native_name: String,
    pub kind: ClassKind,
    /// Name of the library the class lives in.
    pub library: String,
    /// Explicit path to load `library` from, if the declaration gives one.
    pub library_path: Option<String>,
    pub thread_affinity: ThreadAffinity,
}

impl ClassBinding {
    /// What raw symbols are resolved against: the library path when one is
    /// declared, otherwise the library name.
    pub fn symbol_library(&self) -> &str {
        self.library_path.as_deref().unwrap_or(&self.library)
    }
}

/// One operation, ready to dispatch.
#[derive(Debug, Clone)]
pub struct BoundOperation {
    pub name: String,
    pub kind: OperationKind,
    /// Selector or exported symbol.
    pub native_name: String,
    pub ownership: Ownership,
    pub plan: MarshalPlan,
    pub class: Arc<ClassBinding>,
}

impl BoundOperation {
    pub fn managed_type(&self) -> &str {
        &self.class.managed_type
    }

    pub fn thread_affinity(&self) -> ThreadAffinity {
        self.class.thread_affinity
    }

    /// `Type.name`, for diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class.managed_type, self.name)
    }
}

/// Struct layouts and closure signatures declared in one file.
struct TypeTable {
    arch: Arch,
    structs: HashMap<String, Arc<StructLayout>>,
    closures: HashMap<String, Arc<ClosureSignature>>,
}

impl TypeTable {
    fn build(file: &BindingFile, arch: Arch) -> Result<Self> {
        let mut table = Self {
            arch,
            structs: HashMap::new(),
            closures: HashMap::new(),
        };

        for decl in &file.structs {
            let fields = decl
                .fields
                .iter()
                .map(|f| {
                    TypeRef::parse(f)?.scalar(arch).ok_or_else(|| invalid(format!(
                        "struct {} field '{f}' must be a scalar",
                        decl.name
                    )))
                })
                .collect::<Result<Vec<_>>>()?;
            let layout = StructLayout::compute(&decl.name, &fields, arch);
            if table.structs.insert(decl.name.clone(), Arc::new(layout)).is_some() {
                return Err(invalid(format!("struct {} is declared twice", decl.name)));
            }
        }

        for decl in &file.closures {
            let signature = table.closure_signature(decl)?;
            if table.closures.insert(decl.name.clone(), Arc::new(signature)).is_some() {
                return Err(invalid(format!("closure {} is declared twice", decl.name)));
            }
        }
        Ok(table)
    }

    fn closure_signature(&self, decl: &ClosureDecl) -> Result<ClosureSignature> {
        let context = format!("closure {}", decl.name);
        let args = decl
            .args
            .iter()
            .map(|a| self.resolve_arg(a, Ownership::Borrowed, &context))
            .collect::<Result<Vec<_>>>()?;
        let ret = self.resolve_return(&decl.returns, Ownership::Borrowed, &context)?;
        if args.iter().any(|m| matches!(m, Marshal::Closure(_))) {
            return Err(invalid(format!("{context} cannot take a closure argument")));
        }
        Ok(ClosureSignature {
            name: decl.name.clone(),
            args,
            ret,
            escaping: decl.escaping,
        })
    }

    fn resolve(&self, ty: &str, ownership: Ownership, context: &str) -> Result<Marshal> {
        let marshal = match TypeRef::parse(ty)? {
            TypeRef::Void => Marshal::Void,
            TypeRef::Object => Marshal::Object(ownership),
            TypeRef::Struct(name) => Marshal::Struct(
                self.structs
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| invalid(format!("{context}: unknown struct {name}")))?,
            ),
            TypeRef::Closure(name) => Marshal::Closure(
                self.closures
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| invalid(format!("{context}: unknown closure {name}")))?,
            ),
            scalar => match scalar.scalar(self.arch) {
                Some(p) => Marshal::Primitive(p),
                None => return Err(invalid(format!("{context}: unsupported type '{ty}'"))),
            },
        };
        Ok(marshal)
    }

    fn resolve_arg(&self, ty: &str, ownership: Ownership, context: &str) -> Result<Marshal> {
        let m = self.resolve(ty, ownership, context)?;
        if m == Marshal::Void {
            return Err(invalid(format!("{context}: void is not an argument type")));
        }
        Ok(m)
    }

    fn resolve_return(&self, ty: &str, ownership: Ownership, context: &str) -> Result<Marshal> {
        let m = self.resolve(ty, ownership, context)?;
        if matches!(m, Marshal::Closure(_)) {
            return Err(invalid(format!("{context}: closures cannot be returned")));
        }
        Ok(m)
    }

    fn plan(&self, op: &OperationDecl, context: &str) -> Result<MarshalPlan> {
        // Arguments are always borrowed; ownership applies to the result.
        let args = op
            .args
            .iter()
            .map(|a| self.resolve_arg(a, Ownership::Borrowed, context))
            .collect::<Result<Vec<_>>>()?;
        let ret = self.resolve_return(&op.returns, op.ownership, context)?;
        Ok(MarshalPlan { args, ret })
    }
}

/// The immutable operation table for a set of declaration files.
#[derive(Debug, Default)]
pub struct BindingSet {
    classes: HashMap<String, Arc<ClassBinding>>,
    operations: HashMap<(String, String), Arc<BoundOperation>>,
    order: Vec<Arc<BoundOperation>>,
}

impl BindingSet {
    /// Compile a declaration file for `arch`.
    pub fn compile(file: &BindingFile, arch: Arch) -> Result<Self> {
        let types = TypeTable::build(file, arch)?;
        let mut set = BindingSet::default();

        for decl in &file.classes {
            // The file's path belongs to the file's library only.
            let (library, library_path) = match &decl.library {
                Some(name) if *name != file.library.name => (name.clone(), None),
                _ => (file.library.name.clone(), file.library.path.clone()),
            };
            let class = Arc::new(ClassBinding {
                managed_type: decl.managed_type.clone(),
                native_name: decl.native_name.clone(),
                kind: decl.kind,
                library,
                library_path,
                thread_affinity: decl.thread_affinity,
            });

            for op in &decl.operations {
                let context = format!("{}.{}", decl.managed_type, op.name);
                let bound = Arc::new(BoundOperation {
                    name: op.name.clone(),
                    kind: op.kind,
                    native_name: op.native_name().to_string(),
                    ownership: op.ownership,
                    plan: types.plan(op, &context)?,
                    class: class.clone(),
                });
                set.operations
                    .insert((decl.managed_type.clone(), op.name.clone()), bound.clone());
                set.order.push(bound);
            }
            set.classes.insert(decl.managed_type.clone(), class);
        }

        log::debug!(
            "compiled {} binding(s) with {} operation(s) from {} for {arch}",
            set.classes.len(),
            set.order.len(),
            file.library.name
        );
        Ok(set)
    }

    /// Fold another compiled set into this one. Managed types must not
    /// overlap.
    pub fn merge(&mut self, other: BindingSet) -> Result<()> {
        if let Some(dup) = other.classes.keys().find(|k| self.classes.contains_key(*k)) {
            return Err(invalid(format!("managed type '{dup}' is bound more than once")));
        }
        self.classes.extend(other.classes);
        self.operations.extend(other.operations);
        self.order.extend(other.order);
        Ok(())
    }

    pub fn class(&self, managed_type: &str) -> Result<Arc<ClassBinding>> {
        self.classes
            .get(managed_type)
            .cloned()
            .ok_or_else(|| BridgeError::UnboundType {
                managed_type: managed_type.to_string(),
            })
    }

    pub fn operation(&self, managed_type: &str, name: &str) -> Result<Arc<BoundOperation>> {
        self.operations
            .get(&(managed_type.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| BridgeError::UnknownOperation {
                managed_type: managed_type.to_string(),
                name: name.to_string(),
            })
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<BoundOperation>> {
        self.order.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassBinding>> {
        self.classes.values()
    }
}

fn invalid(detail: String) -> BridgeError {
    BridgeError::InvalidDeclaration { detail }
}
