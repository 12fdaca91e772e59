//! psi4 through conda: bootstrap Miniconda if needed, create the isolated
//! environment, install psi4, and smoke-test it on a tiny SCF job.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::platform::Host;
use crate::io::conda::Conda;
use crate::io::config::{CondaConfig, SmokeConfig};
use crate::io::paths::InstallPaths;
use crate::io::process::{CommandRunner, CommandSpec, ensure_success};
use crate::io::profile::register_install;
use crate::io::tools::ToolProbe;

/// Inputs for [`install_psi4`].
#[derive(Debug, Clone)]
pub struct Psi4Install<'a> {
    pub paths: &'a InstallPaths,
    pub conda: &'a CondaConfig,
    pub smoke: &'a SmokeConfig,
    pub host: Host,
    /// Shell profile that receives the Miniconda export lines.
    pub shell_profile: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondaSource {
    /// A conda executable was already available.
    Existing,
    /// Miniconda was downloaded and installed by this run.
    Installed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeOutcome {
    Passed,
    /// psi4 ran but its output lacks the success marker.
    MarkerMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psi4Outcome {
    pub conda: CondaSource,
    pub env_created: bool,
    pub smoke: SmokeOutcome,
}

/// Run the whole psi4 stage.
#[instrument(skip_all, fields(env = %install.conda.env_name))]
pub fn install_psi4<R: CommandRunner, P: ToolProbe>(
    runner: &R,
    probe: &P,
    install: &Psi4Install<'_>,
) -> Result<Psi4Outcome> {
    info!("Starting psi4 installation process");
    let (conda_exe, source) = ensure_conda(runner, probe, install)?;
    let conda = Conda::new(runner, conda_exe);
    let cfg = install.conda;

    let env_created = if conda.env_exists(&cfg.env_name)? {
        warn!(
            "psi4 environment '{}' already exists. Skipping creation.",
            cfg.env_name
        );
        false
    } else {
        info!("Creating conda environment for psi4");
        conda.create_env(&cfg.env_name, &cfg.python_version)?;
        true
    };

    info!("Adding necessary conda channels");
    for channel in &cfg.channels {
        conda.add_channel(channel)?;
    }

    info!("Installing psi4 in the '{}' environment", cfg.env_name);
    conda.install(&cfg.env_name, &cfg.packages)?;
    info!("psi4 has been installed successfully!");

    let smoke = smoke_test(&conda, install)?;
    Ok(Psi4Outcome {
        conda: source,
        env_created,
        smoke,
    })
}

/// Find a usable conda, installing Miniconda into the install root if none exists.
pub fn ensure_conda<R: CommandRunner, P: ToolProbe>(
    runner: &R,
    probe: &P,
    install: &Psi4Install<'_>,
) -> Result<(PathBuf, CondaSource)> {
    let paths = install.paths;
    if let Some(exe) = probe.find("conda") {
        info!("Conda is already installed ({})", exe.display());
        return Ok((exe, CondaSource::Existing));
    }
    let bundled = paths.miniconda_conda();
    if bundled.is_file() {
        info!("Conda is already installed ({})", bundled.display());
        return Ok((bundled, CondaSource::Existing));
    }

    info!("Installing Miniconda");
    let installer = install
        .conda
        .installer
        .clone()
        .unwrap_or_else(|| install.host.miniconda_installer());
    let installer_path = paths.software_dir.join(&installer);
    let url = format!(
        "{}/{}",
        install.conda.installer_base_url.trim_end_matches('/'),
        installer
    );

    runner
        .run(
            &CommandSpec::new("curl")
                .arg("-fsSL")
                .arg("-o")
                .arg(&installer_path)
                .arg(&url)
                .current_dir(&paths.software_dir),
        )
        .with_context(|| format!("download {url}"))?;
    runner
        .run(
            &CommandSpec::new("bash")
                .arg(&installer_path)
                .arg("-b")
                .arg("-p")
                .arg(&paths.miniconda_dir)
                .current_dir(&paths.software_dir),
        )
        .context("run Miniconda installer")?;

    if !bundled.is_file() {
        bail!(
            "Miniconda installer finished but {} does not exist",
            bundled.display()
        );
    }

    register_install(
        &install.shell_profile,
        &install.conda.home_var,
        &paths.miniconda_dir,
    )?;
    info!(
        "Miniconda installed. You may need to restart your terminal or run 'source {}' to use conda.",
        install.shell_profile.display()
    );
    Ok((bundled, CondaSource::Installed))
}

/// Check `psi4 --version`, then run the fixed input and look for the marker.
pub fn smoke_test<R: CommandRunner>(
    conda: &Conda<'_, R>,
    install: &Psi4Install<'_>,
) -> Result<SmokeOutcome> {
    info!("Testing psi4 installation");
    let paths = install.paths;
    let smoke = install.smoke;
    let env = &install.conda.env_name;

    fs::create_dir_all(&paths.smoke_dir)
        .with_context(|| format!("create directory {}", paths.smoke_dir.display()))?;
    fs::write(&paths.smoke_input, &smoke.input)
        .with_context(|| format!("write {}", paths.smoke_input.display()))?;

    let version = conda.run_in_env(env, &paths.smoke_dir, "psi4", &["--version"])?;
    if !version.success() {
        bail!("psi4 installation issues: psi4 command not found or not working");
    }
    info!(
        "psi4 installation verified: psi4 command works ({})",
        version.stdout_text().trim()
    );

    info!("Running a simple psi4 calculation (H2 molecule)...");
    // psi4 writes the named output file itself; the captured streams are the
    // fallback when it dies before opening it.
    match fs::remove_file(&paths.smoke_output) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("remove stale {}", paths.smoke_output.display()));
        }
    }
    let args = [smoke.input_name.as_str(), smoke.output_name.as_str()];
    let run = conda.run_in_env(env, &paths.smoke_dir, "psi4", &args)?;
    if !paths.smoke_output.is_file() {
        fs::write(&paths.smoke_output, run.combined_text())
            .with_context(|| format!("write {}", paths.smoke_output.display()))?;
    }
    ensure_success(&conda.env_command(env, &paths.smoke_dir, "psi4", &args), &run)
        .with_context(|| {
            format!(
                "psi4 calculation failed. Check {} for details.",
                paths.smoke_output.display()
            )
        })?;

    let outcome = check_marker(&paths.smoke_output, &smoke.success_marker)?;
    match outcome {
        SmokeOutcome::Passed => info!("psi4 calculation completed successfully!"),
        SmokeOutcome::MarkerMissing => warn!(
            "psi4 calculation may have issues. Check {} for details.",
            paths.smoke_output.display()
        ),
    }
    Ok(outcome)
}

/// Substring check on the smoke-test output file.
pub fn check_marker(output: &Path, marker: &str) -> Result<SmokeOutcome> {
    let text = fs::read_to_string(output)
        .with_context(|| format!("read {}", output.display()))?;
    Ok(if text.contains(marker) {
        SmokeOutcome::Passed
    } else {
        SmokeOutcome::MarkerMissing
    })
}
