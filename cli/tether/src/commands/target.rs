//! `tether target`: target listing and description.

use anyhow::Result;
use tether_targets::{Os, Packaging, TargetKind};

/// List all targets.
pub fn list() -> Result<()> {
    println!("Targets:");
    println!();
    for kind in TargetKind::ALL {
        println!("  {:<10} {}", kind.id(), kind.description());
    }
    println!();
    println!("Use 'tether target describe <name>' for details.");
    Ok(())
}

/// Describe one target, optionally for a specific platform of its family.
pub fn describe(name: &str, platform: Option<&str>) -> Result<()> {
    let kind = TargetKind::from_id(name)?;
    let os = match platform {
        Some(id) => {
            let os = Os::from_id(id)?;
            if !kind.supports(os) {
                anyhow::bail!("target '{kind}' does not build for platform '{os}'");
            }
            os
        }
        None => kind.default_os(),
    };

    println!("=== Target: {kind} ===");
    println!("{}", kind.description());
    println!();

    println!("--- Platform ---");
    println!("  Id:              {}", os.id());
    println!("  Toolchain name:  {}", os.toolchain_name());
    println!("  Minimum version: {}", os.minimum_version());
    println!("  Family:          {:?}", os.family());
    println!();

    println!("--- Architectures ---");
    let defaults = kind.default_archs(os);
    for arch in kind.supported_archs(os) {
        let d = arch.descriptor();
        println!(
            "  {:<8} {}-bit {:?}, {}{}",
            d.id,
            d.word_size,
            d.endianness,
            d.abi,
            if defaults.contains(&arch) { " (default)" } else { "" }
        );
    }
    println!();

    println!("--- Capabilities ---");
    println!("  Launch:          {}", yes_no(kind.can_launch(os)));
    println!("  Launch in place: {}", yes_no(kind.can_launch_in_place(os)));
    match kind.packaging() {
        Packaging::Complete { format } => println!("  Packaging:       {format}"),
        Packaging::Placeholder { intended_format } => {
            println!("  Packaging:       placeholder ({intended_format} not yet produced)")
        }
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
