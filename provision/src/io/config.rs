//! Installer configuration (TOML).
//!
//! Every field defaults to the hard-coded value the installer has always used,
//! so running without a config file installs exactly the reference setup.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const TINKER_REPO_URL: &str = "https://github.com/TinkerTools/Tinker.git";
pub const MINICONDA_BASE_URL: &str = "https://repo.anaconda.com/miniconda";
pub const HOMEBREW_INSTALL_URL: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// H2 at 0.9 Å, STO-3G SCF.
pub const SMOKE_INPUT: &str = "molecule {
0 1
H
H 1 0.9
}

set basis sto-3g
energy(\"scf\")
";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Install root. Defaults to `$HOME/software` when unset.
    pub software_dir: Option<PathBuf>,

    /// Log file name inside the install root.
    pub log_file_name: String,

    /// `make -j` value. Defaults to the host's available parallelism when unset.
    pub jobs: Option<u32>,

    /// Wall-clock limit for captured commands (probes, version check, smoke test).
    pub capture_timeout_secs: u64,

    /// Bytes of stdout/stderr kept per captured command.
    pub capture_output_limit_bytes: usize,

    pub homebrew_install_url: String,

    pub tinker: TinkerConfig,
    pub conda: CondaConfig,
    pub smoke: SmokeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TinkerConfig {
    pub repo_url: String,
    /// Checkout directory name inside the install root.
    pub dir_name: String,
    pub c_compiler: String,
    pub fortran_compiler: String,
    pub fftw_configure_flags: Vec<String>,
    /// Makefile variable that receives the absolute checkout path.
    pub build_dir_var: String,
    /// Value of that variable in the shipped template.
    pub build_dir_placeholder: String,
    /// Executable whose presence in `bin/` marks a successful install.
    pub verify_executable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CondaConfig {
    pub installer_base_url: String,
    /// Installer file name; derived from host OS/arch when unset.
    pub installer: Option<String>,
    /// Miniconda prefix directory name inside the install root.
    pub install_dir_name: String,
    /// Variable exported on the shell profile pointing at the prefix.
    pub home_var: String,
    /// Startup profile to register with; derived from `$SHELL` when unset.
    pub shell_profile: Option<PathBuf>,
    pub env_name: String,
    pub python_version: String,
    pub channels: Vec<String>,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SmokeConfig {
    pub dir_name: String,
    pub input_name: String,
    pub output_name: String,
    pub input: String,
    /// Substring whose presence in the output counts as a pass.
    pub success_marker: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            software_dir: None,
            log_file_name: "build_log.txt".to_string(),
            jobs: None,
            capture_timeout_secs: 30 * 60,
            capture_output_limit_bytes: 1_000_000,
            homebrew_install_url: HOMEBREW_INSTALL_URL.to_string(),
            tinker: TinkerConfig::default(),
            conda: CondaConfig::default(),
            smoke: SmokeConfig::default(),
        }
    }
}

impl Default for TinkerConfig {
    fn default() -> Self {
        Self {
            repo_url: TINKER_REPO_URL.to_string(),
            dir_name: "tinker".to_string(),
            c_compiler: "gcc".to_string(),
            fortran_compiler: "gfortran".to_string(),
            fftw_configure_flags: vec!["--enable-threads".to_string(), "--enable-openmp".to_string()],
            build_dir_var: "BUILDDIR".to_string(),
            build_dir_placeholder: "$(HOME)/ffe/build".to_string(),
            verify_executable: "analyze".to_string(),
        }
    }
}

impl Default for CondaConfig {
    fn default() -> Self {
        Self {
            installer_base_url: MINICONDA_BASE_URL.to_string(),
            installer: None,
            install_dir_name: "miniconda3".to_string(),
            home_var: "MINICONDA_HOME".to_string(),
            shell_profile: None,
            env_name: "psi4env".to_string(),
            python_version: "3.9".to_string(),
            channels: vec!["conda-forge".to_string(), "psi4".to_string()],
            packages: vec!["psi4".to_string(), "psi4-rt".to_string()],
        }
    }
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            dir_name: "psi4_test".to_string(),
            input_name: "test.inp".to_string(),
            output_name: "test.out".to_string(),
            input: SMOKE_INPUT.to_string(),
            success_marker: "Hartree".to_string(),
        }
    }
}

impl ProvisionConfig {
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("log_file_name", &self.log_file_name),
            ("tinker.repo_url", &self.tinker.repo_url),
            ("tinker.dir_name", &self.tinker.dir_name),
            ("tinker.build_dir_var", &self.tinker.build_dir_var),
            ("tinker.verify_executable", &self.tinker.verify_executable),
            ("conda.install_dir_name", &self.conda.install_dir_name),
            ("conda.home_var", &self.conda.home_var),
            ("conda.env_name", &self.conda.env_name),
            ("conda.python_version", &self.conda.python_version),
            ("smoke.dir_name", &self.smoke.dir_name),
            ("smoke.input_name", &self.smoke.input_name),
            ("smoke.output_name", &self.smoke.output_name),
            ("smoke.success_marker", &self.smoke.success_marker),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must not be empty"));
            }
        }
        if self.jobs == Some(0) {
            return Err(anyhow!("jobs must be > 0"));
        }
        if self.capture_timeout_secs == 0 {
            return Err(anyhow!("capture_timeout_secs must be > 0"));
        }
        if self.capture_output_limit_bytes == 0 {
            return Err(anyhow!("capture_output_limit_bytes must be > 0"));
        }
        if self.conda.packages.is_empty() {
            return Err(anyhow!("conda.packages must be a non-empty array"));
        }
        if self.conda.env_name.contains(char::is_whitespace) {
            return Err(anyhow!("conda.env_name must not contain whitespace"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If `path` is `None`, returns `ProvisionConfig::default()`.
pub fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    let Some(path) = path else {
        let cfg = ProvisionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ProvisionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
