//! Shared linking step.
//!
//! Every target variant ends up here after adding its own flags and search
//! paths. The linker driver is invoked exactly once per build; a failing
//! link is reported with the tool's output and never retried.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, TargetError};

/// A fully assembled linker command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInvocation {
    /// Linker driver executable.
    pub program: PathBuf,
    /// Arguments, in the order they are passed.
    pub args: Vec<String>,
}

/// Inputs to the shared linking step, after target-specific augmentation.
#[derive(Debug, Clone, Default)]
pub struct LinkInputs<'a> {
    pub platform_flags: Vec<String>,
    pub cc_args: &'a [String],
    pub objects: &'a [PathBuf],
    pub library_paths: Vec<PathBuf>,
    pub libraries: Vec<String>,
}

impl LinkInvocation {
    /// Assemble `cc -o <out> <platform flags> <cc args> <objects> <-L...> <libs>`.
    pub fn assemble(cc: &Path, output: &Path, inputs: LinkInputs<'_>) -> Self {
        let mut args = vec!["-o".to_string(), output.display().to_string()];
        args.extend(inputs.platform_flags);
        args.extend(inputs.cc_args.iter().cloned());
        args.extend(inputs.objects.iter().map(|o| o.display().to_string()));
        args.extend(
            inputs
                .library_paths
                .iter()
                .map(|p| format!("-L{}", p.display())),
        );
        args.extend(inputs.libraries.iter().map(|l| library_arg(l)));
        Self {
            program: cc.to_path_buf(),
            args,
        }
    }

    /// Run the linker, blocking until it exits.
    pub fn run(&self) -> Result<()> {
        log::info!("linking: {} {}", self.program.display(), self.args.join(" "));
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| TargetError::ToolchainSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            log::error!("linker exited with {}", output.status);
            return Err(TargetError::Link {
                exit_code: output.status.code(),
                output: text,
            });
        }

        Ok(())
    }
}

/// Turn a library reference into a linker argument.
///
/// Flags and paths to archives, shared objects, and object files are passed
/// through; bare names become `-l<name>`.
pub fn library_arg(lib: &str) -> String {
    const PASSTHROUGH_SUFFIXES: [&str; 4] = [".a", ".so", ".dylib", ".o"];
    if lib.starts_with('-') || PASSTHROUGH_SUFFIXES.iter().any(|s| lib.ends_with(s)) {
        lib.to_string()
    } else {
        format!("-l{lib}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_names_become_flags() {
        assert_eq!(library_arg("m"), "-lm");
        assert_eq!(library_arg("-framework"), "-framework");
        assert_eq!(library_arg("/usr/lib/libfoo.a"), "/usr/lib/libfoo.a");
        assert_eq!(library_arg("libbar.dylib"), "libbar.dylib");
    }

    #[test]
    fn assemble_orders_arguments() {
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let cc_args = vec!["-g".to_string()];
        let inv = LinkInvocation::assemble(
            Path::new("cc"),
            Path::new("out/app"),
            LinkInputs {
                platform_flags: vec!["-m64".into()],
                cc_args: &cc_args,
                objects: &objects,
                library_paths: vec![PathBuf::from("/opt/lib")],
                libraries: vec!["m".into()],
            },
        );
        assert_eq!(inv.program, PathBuf::from("cc"));
        assert_eq!(
            inv.args,
            vec!["-o", "out/app", "-m64", "-g", "a.o", "b.o", "-L/opt/lib", "-lm"]
        );
    }

    #[test]
    fn missing_linker_is_a_spawn_error() {
        let inv = LinkInvocation {
            program: PathBuf::from("/nonexistent/linker-for-tests"),
            args: vec![],
        };
        assert!(matches!(
            inv.run(),
            Err(TargetError::ToolchainSpawn { .. })
        ));
    }
}
