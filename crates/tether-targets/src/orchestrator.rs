//! Build orchestration: resolve a target, then build -> archive -> launch.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::arch::Arch;
use crate::config::BuildConfig;
use crate::error::{Result, TargetError};
use crate::os::Os;
use crate::target::{ArchiveOutcome, LaunchOutcome, Target, TargetKind};
use crate::triple::host_triple;

/// One build invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub config: BuildConfig,
    /// Path of the linked executable.
    pub output: PathBuf,
    /// Object files from the code generator.
    pub objects: Vec<PathBuf>,
    /// Library references in addition to the configured ones.
    pub libraries: Vec<String>,
    /// Extra linker arguments in addition to the configured ones.
    pub cc_args: Vec<String>,
    /// Whether to run the artifact after archiving.
    pub launch: bool,
    pub launch_args: Vec<String>,
}

/// Summary of a completed build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildReport {
    pub target: TargetKind,
    pub platform: Os,
    pub arch: Arch,
    pub triple: String,
    pub artifact: PathBuf,
    pub archive: ArchiveOutcome,
    pub launch: Option<LaunchOutcome>,
    pub duration_ms: u64,
}

/// Pick the target type for a configuration.
///
/// An explicit target id wins, then the family of an explicit platform, and
/// finally the family of the host toolchain.
pub fn resolve_target_kind(config: &BuildConfig) -> Result<TargetKind> {
    if let Some(id) = &config.target {
        return TargetKind::from_id(id);
    }
    if let Some(os) = config.platform {
        return Ok(TargetKind::for_family(os.family()));
    }
    let triple = host_triple(&config.cc);
    let os = Os::resolve_default(&triple)?;
    log::debug!("no target configured; host triple {triple} selects {os}");
    Ok(TargetKind::for_family(os.family()))
}

/// Architectures a multi-architecture build should produce: the pinned one,
/// or the target's defaults.
pub fn plan_architectures(config: &BuildConfig) -> Result<Vec<Arch>> {
    let kind = resolve_target_kind(config)?;
    if let Some(arch) = config.arch {
        return Ok(vec![arch]);
    }
    let os = config.platform.unwrap_or_else(|| kind.default_os());
    Ok(kind.default_archs(os))
}

/// Run a full build for one architecture.
pub fn run(request: &BuildRequest) -> Result<BuildReport> {
    let start = Instant::now();
    let kind = resolve_target_kind(&request.config)?;

    let mut target = Target::new(kind);
    target.initialize(&request.config)?;
    let (Some(platform), Some(arch)) = (target.os(), target.arch()) else {
        return Err(TargetError::ContractViolation {
            operation: "build",
            state: "uninitialized",
        });
    };
    let triple = target.triple().unwrap_or_default();
    log::info!("building {} for {triple}", kind);

    target.build(
        &request.output,
        &request.cc_args,
        &request.objects,
        &request.libraries,
    )?;
    let archive = target.archive()?;

    let launch = if request.launch {
        Some(target.launch(&request.launch_args)?)
    } else {
        None
    };

    Ok(BuildReport {
        target: kind,
        platform,
        arch,
        triple,
        artifact: request.output.clone(),
        archive,
        launch,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
