//! Prerequisite detection and installation.
//!
//! Runs before anything touches the install tree: once this stage returns
//! [`PrereqOutcome::Ready`], every tool in [`REQUIREMENTS`] resolves on the
//! search path.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::platform::{Host, PackageManager};
use crate::io::process::{CommandRunner, CommandSpec};
use crate::io::tools::ToolProbe;

/// A required executable and the packages that provide it.
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub tool: &'static str,
    pub brew: &'static [&'static str],
    pub apt: &'static [&'static str],
}

impl Requirement {
    fn packages(&self, manager: PackageManager) -> &'static [&'static str] {
        match manager {
            PackageManager::Homebrew => self.brew,
            PackageManager::Apt => self.apt,
        }
    }
}

/// Homebrew's `gcc` formula ships `gfortran` as well. Homebrew's `make`
/// formula only installs `gmake`, so on macOS `make` comes from the Xcode
/// Command Line Tools and has no formula here.
pub const REQUIREMENTS: &[Requirement] = &[
    Requirement {
        tool: "gcc",
        brew: &["gcc"],
        apt: &["gcc"],
    },
    Requirement {
        tool: "gfortran",
        brew: &["gcc"],
        apt: &["gfortran"],
    },
    Requirement {
        tool: "git",
        brew: &["git"],
        apt: &["git"],
    },
    Requirement {
        tool: "make",
        brew: &[],
        apt: &["make"],
    },
    Requirement {
        tool: "curl",
        brew: &["curl"],
        apt: &["curl"],
    },
];

const DEVELOPER_TOOLS: &str = "xcode-select";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrereqOutcome {
    /// All required tools are available.
    Ready,
    /// An interactive installer was started; the operator must re-run afterwards.
    RerunRequired,
}

/// Presence of one tool, for report-only checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: &'static str,
    pub path: Option<PathBuf>,
}

pub fn missing_tools<P: ToolProbe>(probe: &P) -> Vec<Requirement> {
    REQUIREMENTS
        .iter()
        .filter(|req| !probe.exists(req.tool))
        .copied()
        .collect()
}

/// Make sure every required tool is installed, installing missing ones.
#[instrument(skip_all, fields(host = %host))]
pub fn ensure_prerequisites<R: CommandRunner, P: ToolProbe>(
    runner: &R,
    probe: &P,
    host: Host,
    homebrew_install_url: &str,
) -> Result<PrereqOutcome> {
    info!("Checking prerequisites");

    if host.needs_developer_tools() && !probe.exists(DEVELOPER_TOOLS) {
        warn!("Xcode Command Line Tools not found. Installing...");
        runner
            .run(&CommandSpec::new(DEVELOPER_TOOLS).arg("--install"))
            .context("start Xcode Command Line Tools installer")?;
        warn!(
            "After Xcode Command Line Tools installation completes, please run this installer again."
        );
        return Ok(PrereqOutcome::RerunRequired);
    }

    let missing = missing_tools(probe);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|req| req.tool).collect();
        let manager = host.package_manager();
        let unpackaged: Vec<&str> = missing
            .iter()
            .filter(|req| req.packages(manager).is_empty())
            .map(|req| req.tool)
            .collect();
        if !unpackaged.is_empty() {
            bail!(
                "{} not found and not installable via {}. Reinstall the Xcode Command Line Tools \
                 (`xcode-select --install`) and run this installer again.",
                unpackaged.join(", "),
                manager.executable()
            );
        }
        warn!(
            "{} not found. Installing via {}...",
            names.join(", "),
            manager.executable()
        );
        install_packages(runner, probe, manager, homebrew_install_url, &missing)?;
    }

    let still_missing: Vec<&str> = missing_tools(probe).iter().map(|req| req.tool).collect();
    if !still_missing.is_empty() {
        bail!(
            "required tools still missing after installation: {}",
            still_missing.join(", ")
        );
    }
    Ok(PrereqOutcome::Ready)
}

/// Report-only check: nothing is installed.
pub fn check_prerequisites<P: ToolProbe>(probe: &P, host: Host) -> Result<Vec<ToolStatus>> {
    let mut tools: Vec<&'static str> = Vec::new();
    if host.needs_developer_tools() {
        tools.push(DEVELOPER_TOOLS);
    }
    tools.extend(REQUIREMENTS.iter().map(|req| req.tool));

    let statuses: Vec<ToolStatus> = tools
        .into_iter()
        .map(|tool| ToolStatus {
            tool,
            path: probe.find(tool),
        })
        .collect();

    let mut missing = Vec::new();
    for status in &statuses {
        match &status.path {
            Some(path) => info!("[OK] {} ({})", status.tool, path.display()),
            None => {
                warn!("[MISSING] {}", status.tool);
                missing.push(status.tool);
            }
        }
    }
    if !missing.is_empty() {
        bail!("missing required tools: {}", missing.join(", "));
    }
    Ok(statuses)
}

fn install_packages<R: CommandRunner, P: ToolProbe>(
    runner: &R,
    probe: &P,
    manager: PackageManager,
    homebrew_install_url: &str,
    missing: &[Requirement],
) -> Result<()> {
    let mut packages: Vec<&str> = Vec::new();
    for req in missing {
        for pkg in req.packages(manager) {
            if !packages.contains(pkg) {
                packages.push(pkg);
            }
        }
    }

    match manager {
        PackageManager::Homebrew => {
            if !probe.exists("brew") {
                info!("Installing Homebrew...");
                let script = format!("/bin/bash -c \"$(curl -fsSL {homebrew_install_url})\"");
                runner
                    .run(&CommandSpec::new("/bin/bash").arg("-c").arg(script))
                    .context("install Homebrew")?;
            }
            let brew = probe
                .find("brew")
                .context("brew not found after Homebrew installation")?;
            info!("Installing {}...", packages.join(" "));
            runner
                .run(&CommandSpec::new(brew).arg("install").args(&packages))
                .context("brew install")?;
        }
        PackageManager::Apt => {
            let apt = |args: &[&str]| {
                if probe.exists("sudo") {
                    CommandSpec::new("sudo").arg("apt-get").args(args)
                } else {
                    CommandSpec::new("apt-get").args(args)
                }
            };
            runner.run(&apt(&["update"])).context("apt-get update")?;
            info!("Installing {}...", packages.join(" "));
            runner
                .run(&apt(&["install", "-y"]).args(&packages))
                .context("apt-get install")?;
        }
    }
    Ok(())
}
