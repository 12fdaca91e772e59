//! Pipeline sequencing for `provision run`, `tinker`, `psi4` and `check`.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::core::platform::Host;
use crate::io::config::ProvisionConfig;
use crate::io::paths::InstallPaths;
use crate::io::process::CommandRunner;
use crate::io::tools::ToolProbe;
use crate::prereqs::{PrereqOutcome, ToolStatus, check_prerequisites, ensure_prerequisites};
use crate::psi4::{Psi4Install, Psi4Outcome, install_psi4};
use crate::tinker::{TinkerBuild, TinkerOutcome, build_tinker};

/// Which stages run after the prerequisite check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    All,
    Tinker,
    Psi4,
}

impl Plan {
    fn includes_tinker(self) -> bool {
        matches!(self, Self::All | Self::Tinker)
    }

    fn includes_psi4(self) -> bool {
        matches!(self, Self::All | Self::Psi4)
    }
}

/// Everything the stages need, resolved once by the caller.
pub struct InstallContext<'a, R: CommandRunner, P: ToolProbe> {
    pub paths: &'a InstallPaths,
    pub config: &'a ProvisionConfig,
    pub host: Host,
    pub runner: &'a R,
    pub probe: &'a P,
    pub shell_profile: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every planned stage finished.
    Completed {
        tinker: Option<TinkerOutcome>,
        psi4: Option<Psi4Outcome>,
    },
    /// The developer-tools installer was started; nothing else ran.
    RerunRequired,
}

/// Run the prerequisite stage and then the planned stages, stopping at the
/// first failure.
pub fn run_install<R: CommandRunner, P: ToolProbe>(
    ctx: &InstallContext<'_, R, P>,
    plan: Plan,
) -> Result<RunOutcome> {
    info!("Starting installation process");
    info!("Software will be installed in {}", ctx.paths.software_dir.display());

    let prereqs = ensure_prerequisites(
        ctx.runner,
        ctx.probe,
        ctx.host,
        &ctx.config.homebrew_install_url,
    )?;
    if prereqs == PrereqOutcome::RerunRequired {
        return Ok(RunOutcome::RerunRequired);
    }

    let tinker = if plan.includes_tinker() {
        let build = TinkerBuild {
            paths: ctx.paths,
            config: &ctx.config.tinker,
            jobs: ctx.config.jobs,
        };
        Some(build_tinker(ctx.runner, &build)?)
    } else {
        None
    };

    let psi4 = if plan.includes_psi4() {
        let install = Psi4Install {
            paths: ctx.paths,
            conda: &ctx.config.conda,
            smoke: &ctx.config.smoke,
            host: ctx.host,
            shell_profile: ctx.shell_profile.clone(),
        };
        Some(install_psi4(ctx.runner, ctx.probe, &install)?)
    } else {
        None
    };

    info!("Installation completed successfully!");
    if let Some(tinker) = &tinker {
        info!("Tinker executables are located in: {}", tinker.bin_dir.display());
    }
    if psi4.is_some() {
        info!(
            "To use psi4, activate the environment with: conda activate {}",
            ctx.config.conda.env_name
        );
    }
    info!("Log file is available at: {}", ctx.paths.log_file.display());

    Ok(RunOutcome::Completed { tinker, psi4 })
}

/// Report-only prerequisite check.
pub fn run_check<P: ToolProbe>(probe: &P, host: Host) -> Result<Vec<ToolStatus>> {
    info!("Checking prerequisites on {host}");
    let statuses = check_prerequisites(probe, host)?;
    info!("All prerequisites are installed");
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ALL_TOOLS, FakeProbe, FakeRunner, TestInstall, mac_host, simulate_upstream};

    fn context<'a>(
        install: &'a TestInstall,
        runner: &'a FakeRunner,
        probe: &'a FakeProbe,
    ) -> InstallContext<'a, FakeRunner, FakeProbe> {
        InstallContext {
            paths: &install.paths,
            config: &install.config,
            host: mac_host(),
            runner,
            probe,
            shell_profile: install.home.join(".zshrc"),
        }
    }

    #[test]
    fn tinker_plan_skips_conda() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |_| false));
        let probe = FakeProbe::with(ALL_TOOLS);

        let outcome = run_install(&context(&install, &runner, &probe), Plan::Tinker).expect("run");
        let RunOutcome::Completed { tinker, psi4 } = outcome else {
            panic!("expected completion");
        };
        assert!(tinker.is_some());
        assert!(psi4.is_none());
        assert!(!runner.ran_program("conda"));
        assert!(!runner.ran_program("curl"));
    }

    #[test]
    fn psi4_plan_skips_tinker() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |_| false));
        let probe = FakeProbe::with(ALL_TOOLS);

        let outcome = run_install(&context(&install, &runner, &probe), Plan::Psi4).expect("run");
        assert!(matches!(
            outcome,
            RunOutcome::Completed {
                tinker: None,
                psi4: Some(_)
            }
        ));
        assert!(!runner.ran_program("git"));
        assert!(!runner.ran_program("make"));
    }

    #[test]
    fn rerun_required_stops_pipeline() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::succeeding();
        let probe = FakeProbe::with(&["gcc", "gfortran", "git", "make", "curl"]);

        let outcome = run_install(&context(&install, &runner, &probe), Plan::All).expect("run");
        assert_eq!(outcome, RunOutcome::RerunRequired);
        assert_eq!(runner.command_lines(), vec!["xcode-select --install"]);
    }

    #[test]
    fn tinker_failure_prevents_psi4() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |line| {
            line.starts_with("git clone")
        }));
        let probe = FakeProbe::with(ALL_TOOLS);

        run_install(&context(&install, &runner, &probe), Plan::All).unwrap_err();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn check_lists_every_tool() {
        let statuses = run_check(&FakeProbe::with(ALL_TOOLS), mac_host()).expect("check");
        assert!(statuses.iter().all(|status| status.path.is_some()));
    }
}
