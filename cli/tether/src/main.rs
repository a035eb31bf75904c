//! Tether CLI: cross-target builds and native binding checks.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tether", version, about = "Native interop and cross-target build driver")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link object files for a target, archive the result, and optionally run it
    Build {
        /// Build configuration file (default: ./build.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Target type (linux, darwin, console)
        #[arg(long)]
        target: Option<String>,
        /// Platform (linux, macosx, ios, switch)
        #[arg(long)]
        platform: Option<String>,
        /// Architecture (x86, x86_64, thumbv7, arm64)
        #[arg(long)]
        arch: Option<String>,
        /// Build every default architecture of the target
        #[arg(long, conflicts_with = "arch")]
        all_archs: bool,
        /// Output executable path (default: build/<executable-name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Additional library to link (repeatable)
        #[arg(short = 'l', long = "lib")]
        libraries: Vec<String>,
        /// Run the artifact after archiving
        #[arg(long)]
        launch: bool,
        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
        /// Object files to link
        #[arg(required = true)]
        objects: Vec<PathBuf>,
        /// Arguments passed to the launched program
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Inspect build targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Show the host toolchain triple and the platform it selects
    Host {
        /// Linker driver to query (default: cc)
        #[arg(long)]
        cc: Option<PathBuf>,
    },
    /// Work with native binding declarations
    Bindings {
        #[command(subcommand)]
        action: BindingsAction,
    },
}

#[derive(Subcommand)]
enum TargetAction {
    /// List available targets
    List,
    /// Show details of a target
    Describe {
        /// Target id
        name: String,
        /// Platform to describe the target for (default: the target's own)
        #[arg(long)]
        platform: Option<String>,
    },
}

#[derive(Subcommand)]
enum BindingsAction {
    /// Validate a declaration file and print its marshaling plans
    Check {
        /// Path to a .bindings.toml file
        file: PathBuf,
        /// Architecture to lay structures out for (default: host)
        #[arg(long)]
        arch: Option<String>,
        /// Also resolve raw symbols with the dynamic loader
        #[arg(long)]
        resolve: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Build {
            config,
            target,
            platform,
            arch,
            all_archs,
            output,
            libraries,
            launch,
            json,
            objects,
            args,
        } => {
            let options = commands::build::BuildOptions {
                config,
                target,
                platform,
                arch,
                all_archs,
                output,
                libraries,
                launch,
                objects,
                launch_args: args,
            };
            let reports = commands::build::run(&cwd, &options)?;
            commands::build::print_reports(&reports, json)
        }

        Commands::Target { action } => match action {
            TargetAction::List => commands::target::list(),
            TargetAction::Describe { name, platform } => {
                commands::target::describe(&name, platform.as_deref())
            }
        },

        Commands::Host { cc } => commands::host::run(cc.as_deref()),

        Commands::Bindings { action } => match action {
            BindingsAction::Check { file, arch, resolve } => {
                commands::bindings::check(&cwd.join(file), arch.as_deref(), resolve)
            }
        },
    }
}
