//! `tether bindings check`: validate a declaration and show its plans.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tether_bridge::dl::SymbolTable;
use tether_bridge::{BindingFile, BindingSet, OperationKind};
use tether_targets::Arch;

/// Outcome of checking one declaration file.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub classes: usize,
    pub operations: usize,
    /// Raw symbols that could not be resolved, when resolution was requested.
    pub unresolved: Vec<String>,
}

/// Compile `file` for `arch` (default: host) and print every operation's
/// marshaling plan.
pub fn check(file: &Path, arch: Option<&str>, resolve: bool) -> Result<()> {
    let summary = check_file(file, arch, resolve, true)?;
    println!();
    println!(
        "{} class(es), {} operation(s)",
        summary.classes, summary.operations
    );
    if !summary.unresolved.is_empty() {
        bail!(
            "{} raw symbol(s) not found: {}",
            summary.unresolved.len(),
            summary.unresolved.join(", ")
        );
    }
    Ok(())
}

pub fn check_file(file: &Path, arch: Option<&str>, resolve: bool, print: bool) -> Result<CheckSummary> {
    if !file.is_file() {
        bail!("binding declaration not found: {}", file.display());
    }
    let arch = match arch {
        Some(id) => Arch::from_id(id)?,
        None => Arch::host().context("host architecture is not supported; pass --arch")?,
    };

    let decl = BindingFile::load(file).with_context(|| format!("loading {}", file.display()))?;
    let set = BindingSet::compile(&decl, arch)
        .with_context(|| format!("compiling {} for {arch}", file.display()))?;

    let symbols = SymbolTable::new();
    let mut summary = CheckSummary {
        classes: set.classes().count(),
        ..Default::default()
    };
    if print {
        println!("Library: {} ({arch})", decl.library.name);
    }

    for op in set.operations() {
        summary.operations += 1;
        let mut note = String::new();
        if resolve && op.kind == OperationKind::RawSymbol {
            match symbols.lookup(Some(op.class.symbol_library()), &op.native_name) {
                Some(entry) => note = format!("  [{entry}]"),
                None => {
                    let reason = symbols.last_error().unwrap_or_default();
                    note = format!("  [unresolved: {reason}]");
                    summary.unresolved.push(op.native_name.clone());
                }
            }
        }
        if print {
            println!(
                "  {:<40} {:<16} {} {}{note}",
                op.qualified_name(),
                op.kind,
                op.native_name,
                op.plan
            );
        }
    }
    Ok(summary)
}
