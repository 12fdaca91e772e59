//! Canonical filesystem layout under the install root.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::io::config::ProvisionConfig;

/// All paths the installer reads or writes, derived from one install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub software_dir: PathBuf,
    pub log_file: PathBuf,
    pub tinker_dir: PathBuf,
    pub fftw_dir: PathBuf,
    pub fftw_lib_dir: PathBuf,
    pub source_dir: PathBuf,
    pub makefile_template: PathBuf,
    pub makefile: PathBuf,
    pub makefile_backup: PathBuf,
    pub bin_dir: PathBuf,
    pub miniconda_dir: PathBuf,
    pub miniconda_bin: PathBuf,
    pub smoke_dir: PathBuf,
    pub smoke_input: PathBuf,
    pub smoke_output: PathBuf,
}

impl InstallPaths {
    pub fn new(software_dir: impl Into<PathBuf>, config: &ProvisionConfig) -> Self {
        let software_dir = software_dir.into();
        let tinker_dir = software_dir.join(&config.tinker.dir_name);
        let fftw_dir = tinker_dir.join("fftw");
        let source_dir = tinker_dir.join("source");
        let miniconda_dir = software_dir.join(&config.conda.install_dir_name);
        let smoke_dir = software_dir.join(&config.smoke.dir_name);
        Self {
            log_file: software_dir.join(&config.log_file_name),
            fftw_lib_dir: fftw_dir.join("lib"),
            makefile_template: tinker_dir.join("make").join("Makefile"),
            makefile: source_dir.join("Makefile"),
            makefile_backup: source_dir.join("Makefile.backup"),
            bin_dir: tinker_dir.join("bin"),
            miniconda_bin: miniconda_dir.join("bin"),
            smoke_input: smoke_dir.join(&config.smoke.input_name),
            smoke_output: smoke_dir.join(&config.smoke.output_name),
            software_dir,
            tinker_dir,
            fftw_dir,
            source_dir,
            miniconda_dir,
            smoke_dir,
        }
    }

    /// Resolve the install root: explicit override, then config, then `$HOME/software`.
    pub fn resolve(override_dir: Option<&Path>, config: &ProvisionConfig) -> Result<Self> {
        let software_dir = match override_dir.or(config.software_dir.as_deref()) {
            Some(dir) => dir.to_path_buf(),
            None => home_dir()?.join("software"),
        };
        Ok(Self::new(software_dir, config))
    }

    /// The `conda` executable inside the Miniconda prefix.
    pub fn miniconda_conda(&self) -> PathBuf {
        self.miniconda_bin.join("conda")
    }
}

/// `$HOME`, required for the default install root and shell profile.
pub fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .context("HOME is not set")
}

/// Create the install root and make sure the log file exists.
///
/// Existing log content is kept; the log is append-only across runs.
pub fn setup_directories(paths: &InstallPaths) -> Result<()> {
    fs::create_dir_all(&paths.software_dir)
        .with_context(|| format!("create directory {}", paths.software_dir.display()))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)
        .with_context(|| format!("create log file {}", paths.log_file.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_stable() {
        let cfg = ProvisionConfig::default();
        let paths = InstallPaths::new("/home/dev/software", &cfg);

        assert_eq!(paths.log_file, Path::new("/home/dev/software/build_log.txt"));
        assert_eq!(paths.tinker_dir, Path::new("/home/dev/software/tinker"));
        assert_eq!(paths.fftw_lib_dir, Path::new("/home/dev/software/tinker/fftw/lib"));
        assert_eq!(
            paths.makefile_template,
            Path::new("/home/dev/software/tinker/make/Makefile")
        );
        assert_eq!(
            paths.makefile_backup,
            Path::new("/home/dev/software/tinker/source/Makefile.backup")
        );
        assert_eq!(paths.bin_dir, Path::new("/home/dev/software/tinker/bin"));
        assert_eq!(
            paths.miniconda_conda(),
            Path::new("/home/dev/software/miniconda3/bin/conda")
        );
        assert_eq!(
            paths.smoke_output,
            Path::new("/home/dev/software/psi4_test/test.out")
        );
    }

    #[test]
    fn override_wins_over_config() {
        let cfg = ProvisionConfig {
            software_dir: Some(PathBuf::from("/from/config")),
            ..ProvisionConfig::default()
        };
        let paths = InstallPaths::resolve(Some(Path::new("/from/flag")), &cfg).expect("resolve");
        assert_eq!(paths.software_dir, Path::new("/from/flag"));

        let paths = InstallPaths::resolve(None, &cfg).expect("resolve");
        assert_eq!(paths.software_dir, Path::new("/from/config"));
    }

    #[test]
    fn setup_keeps_existing_log_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = InstallPaths::new(temp.path().join("software"), &ProvisionConfig::default());

        setup_directories(&paths).expect("setup");
        fs::write(&paths.log_file, "previous run\n").expect("write");
        setup_directories(&paths).expect("setup again");

        assert!(paths.software_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.log_file).expect("read"),
            "previous run\n"
        );
    }
}
