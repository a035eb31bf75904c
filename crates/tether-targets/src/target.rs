//! Build targets.
//!
//! A target is one of a closed set of variants. Each variant decides its own
//! platform and architecture defaults, adds its own linker flags and search
//! paths, and then hands off to the shared link, archive, and launch steps.
//!
//! A [`Target`] instance lives for one build and moves strictly through
//! `Uninitialized -> Initialized -> Built -> Archived -> Launched | NotLaunched`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::arch::Arch;
use crate::config::BuildConfig;
use crate::error::{Result, TargetError};
use crate::link::{LinkInputs, LinkInvocation};
use crate::os::{Os, OsFamily};
use crate::triple::{running_os, target_triple};

/// The closed set of target variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Command-line executables for Linux.
    Linux,
    /// Executables for macOS and iOS.
    Darwin,
    /// Homebrew builds for the Horizon game console.
    Console,
}

/// Packaging capability of a target.
///
/// `Placeholder` marks a platform whose container format has no packaging
/// tool yet: archiving still runs the shared step but the result is flagged
/// as incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum Packaging {
    Complete { format: &'static str },
    Placeholder { intended_format: &'static str },
}

impl TargetKind {
    pub const ALL: [TargetKind; 3] = [TargetKind::Linux, TargetKind::Darwin, TargetKind::Console];

    pub fn id(self) -> &'static str {
        match self {
            TargetKind::Linux => "linux",
            TargetKind::Darwin => "darwin",
            TargetKind::Console => "console",
        }
    }

    /// One-line description for listings.
    pub fn description(self) -> &'static str {
        match self {
            TargetKind::Linux => "Linux command-line executable (x86_64, arm64)",
            TargetKind::Darwin => "macOS / iOS executable (Mach-O)",
            TargetKind::Console => "Horizon console homebrew (devkitPro, arm64)",
        }
    }

    /// Look up a target type by id. `switch` is accepted for `console`.
    ///
    /// Platform ids such as `ios` are not target ids: a Darwin platform is
    /// chosen with `platform`, never inferred from the target name.
    pub fn from_id(id: &str) -> Result<Self> {
        match id {
            "linux" => Ok(TargetKind::Linux),
            "darwin" => Ok(TargetKind::Darwin),
            "console" | "switch" => Ok(TargetKind::Console),
            other => Err(TargetError::UnknownTarget { id: other.into() }),
        }
    }

    /// The target that builds for a platform family.
    pub fn for_family(family: OsFamily) -> Self {
        match family {
            OsFamily::Linux => TargetKind::Linux,
            OsFamily::Darwin => TargetKind::Darwin,
            OsFamily::Horizon => TargetKind::Console,
        }
    }

    /// Whether this target can build for `os`.
    pub fn supports(self, os: Os) -> bool {
        TargetKind::for_family(os.family()) == self
    }

    /// Platform used when the configuration does not name one.
    pub fn default_os(self) -> Os {
        match self {
            TargetKind::Linux => Os::Linux,
            TargetKind::Darwin => Os::MacOsX,
            TargetKind::Console => Os::Horizon,
        }
    }

    /// Architectures built when none is pinned, first entry preferred.
    pub fn default_archs(self, os: Os) -> Vec<Arch> {
        match (self, os) {
            (TargetKind::Darwin, Os::Ios) => vec![Arch::Arm64, Arch::Thumbv7],
            (TargetKind::Linux, _) | (TargetKind::Darwin, _) => vec![Arch::X86_64, Arch::Arm64],
            (TargetKind::Console, _) => vec![Arch::Arm64],
        }
    }

    /// Every architecture the target accepts for `os`.
    pub fn supported_archs(self, os: Os) -> Vec<Arch> {
        match (self, os) {
            (TargetKind::Linux, _) => vec![Arch::X86, Arch::X86_64, Arch::Thumbv7, Arch::Arm64],
            (TargetKind::Darwin, Os::Ios) => vec![Arch::Arm64, Arch::Thumbv7, Arch::X86_64, Arch::X86],
            (TargetKind::Darwin, _) => vec![Arch::X86_64, Arch::Arm64, Arch::X86],
            (TargetKind::Console, _) => vec![Arch::Arm64],
        }
    }

    pub fn can_launch(self, os: Os) -> bool {
        match self {
            TargetKind::Linux => true,
            TargetKind::Darwin => os == Os::MacOsX,
            TargetKind::Console => false,
        }
    }

    pub fn can_launch_in_place(self, os: Os) -> bool {
        self.can_launch(os)
    }

    pub fn packaging(self) -> Packaging {
        match self {
            TargetKind::Linux | TargetKind::Darwin => Packaging::Complete {
                format: "directory",
            },
            // TODO: produce .nro images once the vendor packer is wired in
            TargetKind::Console => Packaging::Placeholder {
                intended_format: "nro",
            },
        }
    }

    fn platform_flags(self, os: Os, arch: Arch, sdk: &Path) -> Vec<String> {
        match self {
            TargetKind::Linux => match arch {
                Arch::X86 => vec!["-m32".into()],
                Arch::X86_64 => vec!["-m64".into()],
                Arch::Thumbv7 | Arch::Arm64 => Vec::new(),
            },
            TargetKind::Darwin => {
                let min_flag = match os {
                    Os::Ios => "iphoneos",
                    _ => "macosx",
                };
                vec![
                    "-arch".into(),
                    arch.clang_arch().into(),
                    format!("-m{min_flag}-version-min={}", os.minimum_version()),
                ]
            }
            TargetKind::Console => vec![
                "-target".into(),
                "aarch64-none-elf".into(),
                format!("-specs={}", sdk.join("libnx").join("switch.specs").display()),
            ],
        }
    }

    /// Search paths the variant places ahead of the configured ones.
    pub fn vendor_library_paths(self, sdk: &Path) -> Vec<PathBuf> {
        match self {
            TargetKind::Console => vec![
                sdk.join("libnx").join("lib"),
                sdk.join("portlibs").join("switch").join("lib"),
            ],
            TargetKind::Linux | TargetKind::Darwin => Vec::new(),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Lifecycle state of a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Uninitialized,
    Initialized,
    Built,
    Archived,
    Launched,
    NotLaunched,
}

impl TargetState {
    fn name(self) -> &'static str {
        match self {
            TargetState::Uninitialized => "uninitialized",
            TargetState::Initialized => "initialized",
            TargetState::Built => "built",
            TargetState::Archived => "archived",
            TargetState::Launched => "launched",
            TargetState::NotLaunched => "not-launched",
        }
    }
}

/// Result of the archive step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    /// Location of the archived artifact.
    pub path: PathBuf,
    /// Container format that was produced.
    pub format: &'static str,
    /// False when the platform's real container format is still missing.
    pub complete: bool,
    /// The container format still to be produced, if any.
    pub pending_format: Option<&'static str>,
}

/// Result of the launch step. Not launching is informational, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum LaunchOutcome {
    Exited { code: Option<i32> },
    NotLaunched { reason: String },
}

/// One build's worth of target state.
#[derive(Debug)]
pub struct Target {
    kind: TargetKind,
    state: TargetState,
    os: Option<Os>,
    arch: Option<Arch>,
    config: BuildConfig,
    artifact: Option<PathBuf>,
    archived: Option<PathBuf>,
}

impl Target {
    pub fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            state: TargetState::Uninitialized,
            os: None,
            arch: None,
            config: BuildConfig::default(),
            artifact: None,
            archived: None,
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Resolved platform; `None` before `initialize`.
    pub fn os(&self) -> Option<Os> {
        self.os
    }

    /// Resolved architecture; `None` before `initialize`.
    pub fn arch(&self) -> Option<Arch> {
        self.arch
    }

    /// Location of the linked artifact once built.
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Resolve platform and architecture from `config`, filling in this
    /// target's own defaults for whatever is missing.
    pub fn initialize(&mut self, config: &BuildConfig) -> Result<()> {
        self.expect_state("initialize", TargetState::Uninitialized)?;

        let os = match config.platform {
            Some(os) if !self.kind.supports(os) => {
                return Err(TargetError::PlatformMismatch {
                    target: self.kind.id(),
                    platform: os.id(),
                });
            }
            Some(os) => os,
            None => self.kind.default_os(),
        };

        let arch = match config.arch {
            Some(arch) if !self.kind.supported_archs(os).contains(&arch) => {
                return Err(TargetError::UnsupportedArch {
                    target: self.kind.id(),
                    platform: os.id(),
                    arch: arch.id(),
                });
            }
            Some(arch) => arch,
            None => self.kind.default_archs(os)[0],
        };

        log::debug!("initialized {} target for {os}/{arch}", self.kind);
        self.os = Some(os);
        self.arch = Some(arch);
        self.config = config.clone();
        self.state = TargetState::Initialized;
        Ok(())
    }

    /// Architectures to build when the caller does not pin one.
    pub fn default_archs(&self) -> Vec<Arch> {
        self.kind
            .default_archs(self.os.unwrap_or_else(|| self.kind.default_os()))
    }

    pub fn can_launch(&self) -> bool {
        self.kind
            .can_launch(self.os.unwrap_or_else(|| self.kind.default_os()))
    }

    pub fn can_launch_in_place(&self) -> bool {
        self.kind
            .can_launch_in_place(self.os.unwrap_or_else(|| self.kind.default_os()))
    }

    pub fn packaging(&self) -> Packaging {
        self.kind.packaging()
    }

    /// Native triple of the resolved platform/architecture.
    pub fn triple(&self) -> Option<String> {
        Some(target_triple(self.arch?, self.os?))
    }

    /// The linker command `build` would run.
    pub fn link_invocation(
        &self,
        output: &Path,
        cc_args: &[String],
        objects: &[PathBuf],
        libraries: &[String],
    ) -> Result<LinkInvocation> {
        let (os, arch) = self.resolved("link")?;
        let sdk = self.config.vendor_sdk_root();

        let mut library_paths = self.kind.vendor_library_paths(&sdk);
        library_paths.extend(self.config.library_paths.iter().cloned());

        let mut libs = libraries.to_vec();
        libs.extend(self.config.libraries.iter().cloned());

        let mut all_cc_args = self.config.cc_args.clone();
        all_cc_args.extend(cc_args.iter().cloned());

        Ok(LinkInvocation::assemble(
            &self.config.cc,
            output,
            LinkInputs {
                platform_flags: self.kind.platform_flags(os, arch, &sdk),
                cc_args: &all_cc_args,
                objects,
                library_paths,
                libraries: libs,
            },
        ))
    }

    /// Link `objects` and `libraries` into `output`.
    pub fn build(
        &mut self,
        output: &Path,
        cc_args: &[String],
        objects: &[PathBuf],
        libraries: &[String],
    ) -> Result<()> {
        self.expect_state("build", TargetState::Initialized)?;
        let invocation = self.link_invocation(output, cc_args, objects, libraries)?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        invocation.run()?;
        self.artifact = Some(output.to_path_buf());
        self.state = TargetState::Built;
        Ok(())
    }

    /// Package the linked artifact into the platform's container.
    pub fn archive(&mut self) -> Result<ArchiveOutcome> {
        self.expect_state("archive", TargetState::Built)?;
        let path = self.install_artifact()?;

        let outcome = match self.kind.packaging() {
            Packaging::Complete { format } => ArchiveOutcome {
                path: path.clone(),
                format,
                complete: true,
                pending_format: None,
            },
            Packaging::Placeholder { intended_format } => {
                log::warn!(
                    "{} target has no {intended_format} packer yet; archived the raw executable at {}",
                    self.kind,
                    path.display()
                );
                ArchiveOutcome {
                    path: path.clone(),
                    format: "directory",
                    complete: false,
                    pending_format: Some(intended_format),
                }
            }
        };

        self.archived = Some(path);
        self.state = TargetState::Archived;
        Ok(outcome)
    }

    /// Shared archiving: copy the artifact into the install directory.
    fn install_artifact(&self) -> Result<PathBuf> {
        let artifact = self
            .artifact
            .as_deref()
            .ok_or(TargetError::ContractViolation {
                operation: "archive",
                state: self.state.name(),
            })?;
        let file_name = artifact
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&self.config.executable_name));

        std::fs::create_dir_all(&self.config.install_dir)?;
        let dest = self.config.install_dir.join(file_name);
        std::fs::copy(artifact, &dest)?;
        log::info!("archived {} -> {}", artifact.display(), dest.display());
        Ok(dest)
    }

    /// Run the archived artifact on this machine if the target allows it.
    pub fn launch(&mut self, args: &[String]) -> Result<LaunchOutcome> {
        self.expect_state("launch", TargetState::Archived)?;
        let (os, arch) = self.resolved("launch")?;

        let refusal = if !self.can_launch() {
            Some(format!("{} target cannot launch {os} executables", self.kind))
        } else if running_os() != Some(os) || Arch::host() != Some(arch) {
            Some(format!("host cannot execute {os}/{arch} binaries"))
        } else {
            None
        };
        if let Some(reason) = refusal {
            log::info!("not launching: {reason}");
            self.state = TargetState::NotLaunched;
            return Ok(LaunchOutcome::NotLaunched { reason });
        }

        let candidate = if self.can_launch_in_place() {
            self.artifact.clone()
        } else {
            self.archived.clone()
        };
        let program = candidate.ok_or(TargetError::ContractViolation {
            operation: "launch",
            state: self.state.name(),
        })?;

        log::info!("launching {}", program.display());
        let status = Command::new(&program)
            .args(args)
            .status()
            .map_err(|source| TargetError::ToolchainSpawn { program, source })?;
        self.state = TargetState::Launched;
        Ok(LaunchOutcome::Exited {
            code: status.code(),
        })
    }

    fn expect_state(&self, operation: &'static str, expected: TargetState) -> Result<()> {
        if self.state != expected {
            return Err(TargetError::ContractViolation {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn resolved(&self, operation: &'static str) -> Result<(Os, Arch)> {
        match (self.os, self.arch) {
            (Some(os), Some(arch)) => Ok((os, arch)),
            _ => Err(TargetError::ContractViolation {
                operation,
                state: self.state.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(kind: TargetKind, config: &BuildConfig) -> Target {
        let mut t = Target::new(kind);
        t.initialize(config).unwrap();
        t
    }

    #[test]
    fn targets_default_to_their_own_platform() {
        let config = BuildConfig::default();
        let cases = [
            (TargetKind::Linux, Os::Linux, Arch::X86_64),
            (TargetKind::Darwin, Os::MacOsX, Arch::X86_64),
            (TargetKind::Console, Os::Horizon, Arch::Arm64),
        ];
        for (kind, os, arch) in cases {
            let t = initialized(kind, &config);
            assert_eq!(t.os(), Some(os), "{kind}");
            assert_eq!(t.arch(), Some(arch), "{kind}");
            assert!(!t.default_archs().is_empty());
        }
    }

    #[test]
    fn ios_defaults_to_first_ios_arch() {
        let config = BuildConfig {
            platform: Some(Os::Ios),
            ..Default::default()
        };
        let t = initialized(TargetKind::Darwin, &config);
        assert_eq!(t.arch(), Some(Arch::Arm64));
        assert_eq!(t.default_archs(), vec![Arch::Arm64, Arch::Thumbv7]);
        assert!(!t.can_launch());
    }

    #[test]
    fn platform_of_another_family_is_rejected() {
        let config = BuildConfig {
            platform: Some(Os::Linux),
            ..Default::default()
        };
        let mut t = Target::new(TargetKind::Console);
        let err = t.initialize(&config).unwrap_err();
        assert!(matches!(err, TargetError::PlatformMismatch { .. }));
        assert_eq!(t.state(), TargetState::Uninitialized);
    }

    #[test]
    fn unsupported_arch_is_rejected() {
        let config = BuildConfig {
            arch: Some(Arch::X86_64),
            ..Default::default()
        };
        let mut t = Target::new(TargetKind::Console);
        assert!(matches!(
            t.initialize(&config),
            Err(TargetError::UnsupportedArch { .. })
        ));
    }

    #[test]
    fn build_before_initialize_is_a_contract_violation() {
        let mut t = Target::new(TargetKind::Linux);
        let err = t
            .build(Path::new("out"), &[], &[], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            TargetError::ContractViolation {
                operation: "build",
                state: "uninitialized"
            }
        ));
    }

    #[test]
    fn archive_before_build_is_a_contract_violation() {
        let mut t = initialized(TargetKind::Linux, &BuildConfig::default());
        assert!(matches!(
            t.archive(),
            Err(TargetError::ContractViolation {
                operation: "archive",
                ..
            })
        ));
    }

    #[test]
    fn initialize_twice_is_a_contract_violation() {
        let config = BuildConfig::default();
        let mut t = initialized(TargetKind::Linux, &config);
        assert!(t.initialize(&config).is_err());
    }

    #[test]
    fn console_prepends_vendor_paths() {
        let config = BuildConfig {
            library_paths: vec![PathBuf::from("/usr/local/mylibs")],
            vendor_sdk: Some(PathBuf::from("/opt/devkitpro")),
            ..Default::default()
        };
        let t = initialized(TargetKind::Console, &config);
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let inv = t
            .link_invocation(Path::new("game.elf"), &[], &objects, &["nx".into()])
            .unwrap();
        let search: Vec<&str> = inv
            .args
            .iter()
            .filter(|a| a.starts_with("-L"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            search,
            vec![
                "-L/opt/devkitpro/libnx/lib",
                "-L/opt/devkitpro/portlibs/switch/lib",
                "-L/usr/local/mylibs",
            ]
        );
        assert!(inv.args.contains(&"-lnx".to_string()));
    }

    #[test]
    fn darwin_passes_arch_and_min_version() {
        let config = BuildConfig {
            platform: Some(Os::Ios),
            arch: Some(Arch::Thumbv7),
            ..Default::default()
        };
        let t = initialized(TargetKind::Darwin, &config);
        let inv = t.link_invocation(Path::new("app"), &[], &[], &[]).unwrap();
        assert!(inv.args.windows(2).any(|w| w == ["-arch", "armv7"]));
        assert!(inv.args.contains(&"-miphoneos-version-min=7.0".to_string()));
        assert_eq!(t.triple().as_deref(), Some("thumbv7-unknown-ios7.0.0"));
    }

    #[test]
    fn console_cannot_launch_and_packaging_is_placeholder() {
        let t = initialized(TargetKind::Console, &BuildConfig::default());
        assert!(!t.can_launch());
        assert!(!t.can_launch_in_place());
        assert_eq!(
            t.packaging(),
            Packaging::Placeholder {
                intended_format: "nro"
            }
        );
    }

    #[test]
    fn target_ids() {
        assert_eq!(TargetKind::from_id("switch").unwrap(), TargetKind::Console);
        assert_eq!(TargetKind::from_id("darwin").unwrap(), TargetKind::Darwin);
        for platform_id in ["ios", "macosx"] {
            assert!(matches!(
                TargetKind::from_id(platform_id),
                Err(TargetError::UnknownTarget { .. })
            ));
        }
        assert!(matches!(
            TargetKind::from_id("wasm"),
            Err(TargetError::UnknownTarget { .. })
        ));
        for kind in TargetKind::ALL {
            assert_eq!(TargetKind::from_id(kind.id()).unwrap(), kind);
            assert!(kind.supports(kind.default_os()));
        }
    }
}
