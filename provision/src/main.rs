//! Workstation installer for Tinker and psi4.
//!
//! With no sub-command the whole pipeline runs: prerequisites, Tinker from
//! source, then psi4 through conda. Progress goes to the console and is
//! appended to `<software-dir>/build_log.txt`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use provision::core::platform::Host;
use provision::exit_codes;
use provision::install::{InstallContext, Plan, RunOutcome, run_check, run_install};
use provision::io::config::{ProvisionConfig, load_config};
use provision::io::paths::{InstallPaths, setup_directories};
use provision::io::process::SystemRunner;
use provision::io::profile::resolve_profile;
use provision::io::tools::PathProbe;
use provision::logging;

#[derive(Parser, Debug)]
#[command(
    name = "provision",
    version,
    about = "Build Tinker from source and install psi4 into a conda environment"
)]
struct Cli {
    /// TOML file overriding the built-in defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Install root (default: `$HOME/software`).
    #[arg(long, global = true, value_name = "DIR")]
    software_dir: Option<PathBuf>,
    /// Parallel make jobs (default: available CPUs).
    #[arg(short, long, global = true, value_name = "N")]
    jobs: Option<u32>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Check prerequisites, build Tinker, install psi4 (default).
    Run,
    /// Report which required tools are present without installing anything.
    Check,
    /// Check prerequisites and build Tinker only.
    Tinker,
    /// Check prerequisites and install psi4 only.
    Psi4,
}

fn main() {
    let cli = Cli::parse();

    // Nothing is logged until the install root and log file exist.
    let (config, paths) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    };
    if let Err(err) = logging::init(&paths.log_file) {
        eprintln!("ERROR: {err:#}");
        std::process::exit(exit_codes::FAILED);
    }

    let code = match execute(cli.command.unwrap_or(Command::Run), &config, &paths) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            error!("{err:#}");
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn prepare(cli: &Cli) -> Result<(ProvisionConfig, InstallPaths)> {
    let mut config = load_config(cli.config.as_deref())?;
    config.jobs = cli.jobs.or(config.jobs).or_else(available_jobs);
    config.validate()?;
    let paths = InstallPaths::resolve(cli.software_dir.as_deref(), &config)?;
    setup_directories(&paths)?;
    Ok((config, paths))
}

fn available_jobs() -> Option<u32> {
    std::thread::available_parallelism()
        .ok()
        .and_then(|n| u32::try_from(n.get()).ok())
}

fn execute(command: Command, config: &ProvisionConfig, paths: &InstallPaths) -> Result<()> {
    let host = Host::detect()?;
    let plan = match command {
        Command::Check => {
            let probe = PathProbe::new(&host.package_manager_dirs())?;
            run_check(&probe, host)?;
            return Ok(());
        }
        Command::Run => Plan::All,
        Command::Tinker => Plan::Tinker,
        Command::Psi4 => Plan::Psi4,
    };

    let mut extra_dirs = vec![paths.miniconda_bin.clone()];
    extra_dirs.extend(host.package_manager_dirs());
    let probe = PathProbe::new(&extra_dirs)?;
    let runner = SystemRunner::new(
        Duration::from_secs(config.capture_timeout_secs),
        config.capture_output_limit_bytes,
    );
    let ctx = InstallContext {
        paths,
        config,
        host,
        runner: &runner,
        probe: &probe,
        shell_profile: resolve_profile(config.conda.shell_profile.as_deref(), host)?,
    };

    if run_install(&ctx, plan)? == RunOutcome::RerunRequired {
        info!("Exiting; re-run provision once the installer has finished");
    }
    Ok(())
}
