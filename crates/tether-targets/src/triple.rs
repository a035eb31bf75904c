//! Target triples and host toolchain queries.

use std::path::Path;
use std::process::Command;

use crate::arch::Arch;
use crate::os::Os;

/// The native toolchain triple for an (architecture, platform) pair,
/// e.g. `arm64-unknown-ios7.0.0`.
pub fn target_triple(arch: Arch, os: Os) -> String {
    format!("{}-unknown-{}", arch.toolchain_name(), os.toolchain_name())
}

/// Ask the host toolchain which target it generates code for by default.
///
/// With the `llvm` feature the answer comes from LLVM itself. Otherwise the
/// C compiler driver is asked (`<cc> -dumpmachine`), and if that fails a
/// triple is assembled from the properties of the running process.
pub fn host_triple(cc: &Path) -> String {
    #[cfg(feature = "llvm")]
    {
        let triple = inkwell::targets::TargetMachine::get_default_triple();
        let triple = triple.as_str().to_string_lossy().into_owned();
        if !triple.is_empty() {
            return triple;
        }
    }

    match Command::new(cc).arg("-dumpmachine").output() {
        Ok(output) if output.status.success() => {
            let triple = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !triple.is_empty() {
                log::debug!("host triple from {}: {triple}", cc.display());
                return triple;
            }
        }
        Ok(output) => {
            log::debug!(
                "{} -dumpmachine exited with {}",
                cc.display(),
                output.status
            );
        }
        Err(e) => {
            log::debug!("could not run {} -dumpmachine: {e}", cc.display());
        }
    }

    fallback_host_triple()
}

/// The platform this process is running on, if it is one we can build for.
pub fn running_os() -> Option<Os> {
    match std::env::consts::OS {
        "linux" => Some(Os::Linux),
        "macos" => Some(Os::MacOsX),
        "ios" => Some(Os::Ios),
        "horizon" => Some(Os::Horizon),
        _ => None,
    }
}

fn fallback_host_triple() -> String {
    let vendor = match std::env::consts::OS {
        "macos" | "ios" => "apple",
        _ => "unknown",
    };
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{vendor}-{os}", std::env::consts::ARCH)
}
