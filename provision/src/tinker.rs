//! Tinker build: fetch sources, build the bundled FFTW, template the
//! Makefile, build and install, verify.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::makefile::rewrite_assignment;
use crate::io::config::TinkerConfig;
use crate::io::git::{Git, SourceAction};
use crate::io::paths::InstallPaths;
use crate::io::process::{CommandRunner, CommandSpec};

const FFTW_LIBRARIES: [&str; 2] = ["libfftw3.a", "libfftw3_threads.a"];

/// Inputs for [`build_tinker`].
#[derive(Debug, Clone)]
pub struct TinkerBuild<'a> {
    pub paths: &'a InstallPaths,
    pub config: &'a TinkerConfig,
    /// `make -j` value; `None` runs make serially.
    pub jobs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinkerOutcome {
    pub source: SourceAction,
    pub bin_dir: PathBuf,
}

/// Run the whole Tinker stage.
#[instrument(skip_all)]
pub fn build_tinker<R: CommandRunner>(runner: &R, build: &TinkerBuild<'_>) -> Result<TinkerOutcome> {
    info!("Starting Tinker build process");
    let paths = build.paths;

    let source = Git::new(runner, &paths.tinker_dir)
        .clone_or_pull(&build.config.repo_url)
        .context("fetch Tinker sources")?;

    build_fftw(runner, build).context("build FFTW")?;

    info!("Preparing Makefile for Tinker compilation");
    prepare_makefile(paths, build.config)?;

    fs::create_dir_all(&paths.bin_dir)
        .with_context(|| format!("create directory {}", paths.bin_dir.display()))?;

    info!("Building Tinker (this may take a while)");
    runner
        .run(&make(build.jobs, &paths.source_dir).arg("all"))
        .context("build Tinker")?;

    info!("Installing Tinker executables");
    runner
        .run(&make(None, &paths.source_dir).arg("install"))
        .context("install Tinker")?;
    info!("Tinker has been built successfully!");

    info!("Testing Tinker installation");
    verify_executable(&paths.bin_dir, &build.config.verify_executable)?;

    Ok(TinkerOutcome {
        source,
        bin_dir: paths.bin_dir.clone(),
    })
}

fn make(jobs: Option<u32>, dir: &Path) -> CommandSpec {
    let spec = CommandSpec::new("make").current_dir(dir);
    match jobs {
        Some(jobs) if jobs > 1 => spec.arg(format!("-j{jobs}")),
        _ => spec,
    }
}

/// Configure, build and install FFTW into its own directory.
fn build_fftw<R: CommandRunner>(runner: &R, build: &TinkerBuild<'_>) -> Result<()> {
    info!("Building FFTW library");
    let fftw_dir = &build.paths.fftw_dir;
    if !fftw_dir.is_dir() {
        bail!("FFTW sources not found at {}", fftw_dir.display());
    }
    let prefix = fs::canonicalize(fftw_dir)
        .with_context(|| format!("resolve {}", fftw_dir.display()))?;
    let compilers = |spec: CommandSpec| {
        spec.env("CC", &build.config.c_compiler)
            .env("F77", &build.config.fortran_compiler)
    };

    // A fresh checkout has nothing to clean.
    let distclean = compilers(make(None, fftw_dir).arg("distclean"));
    if runner.status(&distclean)? != Some(0) {
        info!("make distclean had nothing to clean");
    }

    let configure = CommandSpec::new("./configure")
        .current_dir(fftw_dir)
        .arg(format!("--prefix={}", prefix.display()))
        .args(&build.config.fftw_configure_flags);
    runner.run(&compilers(configure))?;
    runner.run(&compilers(make(build.jobs, fftw_dir)))?;
    runner.run(&compilers(make(None, fftw_dir).arg("install")))?;

    let missing: Vec<&str> = FFTW_LIBRARIES
        .iter()
        .copied()
        .filter(|lib| !build.paths.fftw_lib_dir.join(lib).is_file())
        .collect();
    if !missing.is_empty() {
        bail!(
            "FFTW libraries were not built successfully (missing {}). Check the log for details.",
            missing.join(", ")
        );
    }
    Ok(())
}

/// Copy the Makefile template into `source/`, back it up, and point the
/// build directory at the checkout.
pub fn prepare_makefile(paths: &InstallPaths, config: &TinkerConfig) -> Result<()> {
    let template = fs::read_to_string(&paths.makefile_template)
        .with_context(|| format!("read {}", paths.makefile_template.display()))?;
    fs::write(&paths.makefile, &template)
        .with_context(|| format!("write {}", paths.makefile.display()))?;
    fs::write(&paths.makefile_backup, &template)
        .with_context(|| format!("write {}", paths.makefile_backup.display()))?;

    info!("Modifying Makefile paths");
    let tinker_dir = fs::canonicalize(&paths.tinker_dir)
        .with_context(|| format!("resolve {}", paths.tinker_dir.display()))?;
    let tinker_dir = tinker_dir.to_string_lossy();
    let rewrite = rewrite_assignment(
        &template,
        &config.build_dir_var,
        &config.build_dir_placeholder,
        &tinker_dir,
    )?;
    if rewrite.replaced == 0 {
        warn!(
            "{} = {} not found in {}; Makefile left unchanged",
            config.build_dir_var,
            config.build_dir_placeholder,
            paths.makefile.display()
        );
        return Ok(());
    }
    fs::write(&paths.makefile, rewrite.text)
        .with_context(|| format!("write {}", paths.makefile.display()))?;
    Ok(())
}

fn verify_executable(bin_dir: &Path, name: &str) -> Result<()> {
    let exe = bin_dir.join(name);
    if !exe.is_file() {
        bail!("Tinker installation failed: {name} executable not found in {}", bin_dir.display());
    }
    info!("Tinker installation verified: {name} executable exists");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRunner, TestInstall, simulate_upstream};

    #[test]
    fn prepare_makefile_rewrites_build_dir_and_keeps_backup() {
        let install = TestInstall::new().expect("install");
        install.seed_tinker_checkout().expect("seed");
        let paths = &install.paths;

        prepare_makefile(paths, &install.config.tinker).expect("prepare");

        let tinker_dir = fs::canonicalize(&paths.tinker_dir).expect("canonicalize");
        let makefile = fs::read_to_string(&paths.makefile).expect("read");
        assert!(makefile.starts_with(&format!("BUILDDIR = {}\n", tinker_dir.display())));
        assert!(makefile.contains("BINDIR = $(BUILDDIR)/bin"));
        let backup = fs::read_to_string(&paths.makefile_backup).expect("read backup");
        assert!(backup.contains("$(HOME)/ffe/build"));
    }

    #[test]
    fn prepare_makefile_without_placeholder_copies_template() {
        let install = TestInstall::new().expect("install");
        install.seed_tinker_checkout().expect("seed");
        fs::write(&install.paths.makefile_template, "BUILDDIR = /custom\n").expect("write");

        prepare_makefile(&install.paths, &install.config.tinker).expect("prepare");
        let makefile = fs::read_to_string(&install.paths.makefile).expect("read");
        assert_eq!(makefile, "BUILDDIR = /custom\n");
    }

    #[test]
    fn fresh_build_clones_and_runs_make_sequence() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |_| false));
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: Some(4),
        };

        let outcome = build_tinker(&runner, &build).expect("build");

        assert_eq!(outcome.source, SourceAction::Cloned);
        assert!(install.paths.bin_dir.join("analyze").is_file());
        let lines = runner.command_lines();
        let prefix = fs::canonicalize(&install.paths.fftw_dir).expect("canonicalize");
        assert_eq!(
            lines[1..],
            [
                "make distclean".to_string(),
                format!(
                    "configure --prefix={} --enable-threads --enable-openmp",
                    prefix.display()
                ),
                "make -j4".to_string(),
                "make install".to_string(),
                "make -j4 all".to_string(),
                "make install".to_string(),
            ]
        );
        let configure = &runner.calls()[2];
        assert!(
            configure
                .env
                .iter()
                .any(|(k, v)| k == "F77" && v == "gfortran")
        );
    }

    #[test]
    fn existing_checkout_is_pulled() {
        let install = TestInstall::new().expect("install");
        install.seed_tinker_checkout().expect("seed");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |_| false));
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: None,
        };

        let outcome = build_tinker(&runner, &build).expect("build");
        assert_eq!(outcome.source, SourceAction::Updated);
        assert_eq!(runner.command_lines()[0], "git pull");
        assert!(!runner.command_lines().iter().any(|l| l.starts_with("git clone")));
    }

    #[test]
    fn failed_distclean_is_ignored() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |line| {
            line == "make distclean"
        }));
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: None,
        };

        build_tinker(&runner, &build).expect("build");
    }

    #[test]
    fn missing_fftw_library_aborts_before_tinker_build() {
        let install = TestInstall::new().expect("install");
        install.seed_tinker_checkout().expect("seed");
        // Builds "succeed" but produce nothing.
        let runner = FakeRunner::succeeding();
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: None,
        };

        let err = build_tinker(&runner, &build).unwrap_err();
        assert!(format!("{err:#}").contains("libfftw3.a"));
        assert!(!runner.ran("make all"));
    }

    #[test]
    fn missing_analyze_fails_verification() {
        let install = TestInstall::new().expect("install");
        let paths = install.paths.clone();
        let upstream = simulate_upstream(&install.paths, "", |_| false);
        // Skip the Tinker install step's artifacts.
        let runner = FakeRunner::new(move |spec| {
            if spec.cwd.as_deref() == Some(paths.source_dir.as_path()) {
                return crate::test_support::Reply::ok();
            }
            upstream(spec)
        });
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: None,
        };

        let err = build_tinker(&runner, &build).unwrap_err();
        assert!(err.to_string().contains("analyze executable not found"));
    }

    #[test]
    fn failing_make_aborts_with_exit_code() {
        let install = TestInstall::new().expect("install");
        let runner = FakeRunner::new(simulate_upstream(&install.paths, "", |line| {
            line == "make all"
        }));
        let build = TinkerBuild {
            paths: &install.paths,
            config: &install.config.tinker,
            jobs: None,
        };

        let err = build_tinker(&runner, &build).unwrap_err();
        assert_eq!(crate::exit_codes::for_error(&err), 2);
        assert_eq!(
            runner.command_lines().last().map(String::as_str),
            Some("make all")
        );
    }
}
