//! `tether build`: link, archive, and optionally launch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tether_targets::orchestrator::{self, BuildReport, BuildRequest};
use tether_targets::{plan_architectures, Arch, BuildConfig, LaunchOutcome, Os};

/// Command-line inputs to a build.
#[derive(Debug, Default)]
pub struct BuildOptions {
    pub config: Option<PathBuf>,
    pub target: Option<String>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub all_archs: bool,
    pub output: Option<PathBuf>,
    pub libraries: Vec<String>,
    pub launch: bool,
    pub objects: Vec<PathBuf>,
    pub launch_args: Vec<String>,
}

/// Run one build per requested architecture.
pub fn run(cwd: &Path, options: &BuildOptions) -> Result<Vec<BuildReport>> {
    let config = resolve_config(cwd, options)?;

    let objects: Vec<PathBuf> = options.objects.iter().map(|o| cwd.join(o)).collect();
    for object in &objects {
        if !object.is_file() {
            bail!("object file not found: {}", object.display());
        }
    }

    let passes: Vec<Option<Arch>> = if options.all_archs {
        plan_architectures(&config)?.into_iter().map(Some).collect()
    } else {
        vec![config.arch]
    };
    log::debug!("build passes: {passes:?}");

    let base_output = match &options.output {
        Some(path) => cwd.join(path),
        None => cwd.join("build").join(&config.executable_name),
    };

    let mut reports = Vec::with_capacity(passes.len());
    for arch in passes {
        let output = match arch {
            Some(a) if options.all_archs => per_arch_output(&base_output, a),
            _ => base_output.clone(),
        };
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let request = BuildRequest {
            config: BuildConfig {
                arch,
                ..config.clone()
            },
            output,
            objects: objects.clone(),
            libraries: options.libraries.clone(),
            cc_args: Vec::new(),
            launch: options.launch,
            launch_args: options.launch_args.clone(),
        };
        let report = orchestrator::run(&request).with_context(|| match arch {
            Some(a) => format!("building for {a}"),
            None => "building".to_string(),
        })?;
        reports.push(report);
    }
    Ok(reports)
}

/// Configuration file (explicit, or `build.toml` in `cwd`) overlaid with
/// command-line flags.
fn resolve_config(cwd: &Path, options: &BuildOptions) -> Result<BuildConfig> {
    let mut config = match &options.config {
        Some(path) => {
            let path = cwd.join(path);
            BuildConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => {
            let default = cwd.join("build.toml");
            if default.is_file() {
                BuildConfig::load(&default)
                    .with_context(|| format!("loading {}", default.display()))?
            } else {
                BuildConfig::default()
            }
        }
    };

    if let Some(target) = &options.target {
        config.target = Some(target.clone());
    }
    if let Some(platform) = &options.platform {
        config.platform = Some(Os::from_id(platform)?);
    }
    if let Some(arch) = &options.arch {
        config.arch = Some(Arch::from_id(arch)?);
    }
    Ok(config)
}

fn per_arch_output(base: &Path, arch: Arch) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a.out".to_string());
    base.with_file_name(format!("{name}-{arch}"))
}

/// Print build reports, as JSON or for humans.
pub fn print_reports(reports: &[BuildReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!(
            "Target:   {} ({}, {})",
            report.target, report.platform, report.arch
        );
        println!("Triple:   {}", report.triple);
        println!("Artifact: {}", report.artifact.display());
        match report.archive.pending_format {
            Some(format) => println!(
                "Archive:  {} (incomplete: {format} packaging not yet produced)",
                report.archive.path.display()
            ),
            None => println!("Archive:  {}", report.archive.path.display()),
        }
        match &report.launch {
            Some(LaunchOutcome::Exited { code: Some(code) }) => println!("Launch:   exited with {code}"),
            Some(LaunchOutcome::Exited { code: None }) => println!("Launch:   terminated by signal"),
            Some(LaunchOutcome::NotLaunched { reason }) => println!("Launch:   skipped ({reason})"),
            None => {}
        }
        println!("Time:     {} ms", report.duration_ms);
        println!();
    }
    Ok(())
}
