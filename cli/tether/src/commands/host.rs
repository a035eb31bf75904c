//! `tether host`: host toolchain diagnostics.

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tether_targets::{host_triple, Arch, Os, TargetKind};

/// Print the host triple, the platform it selects, and toolchain status.
pub fn run(cc: Option<&Path>) -> Result<()> {
    let cc = cc.unwrap_or_else(|| Path::new("cc"));
    let triple = host_triple(cc);

    println!("=== Tether Host ===");
    println!();
    println!("Tether version: {}", env!("CARGO_PKG_VERSION"));
    println!("Host triple:    {triple}");
    match Os::resolve_default(&triple) {
        Ok(os) => {
            println!("Default platform: {os}");
            println!("Default target:   {}", TargetKind::for_family(os.family()));
        }
        Err(e) => println!("Default platform: none ({e})"),
    }
    match Arch::host() {
        Some(arch) => println!("Host arch:        {arch}"),
        None => println!("Host arch:        unsupported"),
    }
    println!();

    println!("--- Toolchain ---");
    print_tool_status(&cc.display().to_string(), &["--version"]);
    Ok(())
}

fn print_tool_status(name: &str, args: &[&str]) {
    match Command::new(name).args(args).output() {
        Ok(output) => {
            let version = String::from_utf8_lossy(&output.stdout);
            let first_line = version.lines().next().unwrap_or("(unknown version)");
            println!("  {name}: {first_line}");
        }
        Err(_) => {
            println!("  {name}: not found");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn host_runs_without_a_compiler() {
        super::run(Some(std::path::Path::new("/nonexistent/cc"))).unwrap();
    }
}
