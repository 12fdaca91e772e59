//! Conda adapter.
//!
//! Commands go through the resolved `conda` executable directly and programs
//! inside an environment are started with `conda run -n <env>`, so nothing
//! depends on shell activation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::env_list::has_env;
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec};

#[derive(Debug)]
pub struct Conda<'a, R: CommandRunner> {
    runner: &'a R,
    exe: PathBuf,
}

impl<'a, R: CommandRunner> Conda<'a, R> {
    pub fn new(runner: &'a R, exe: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            exe: exe.into(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.exe)
    }

    /// True if an environment with exactly this name exists.
    #[instrument(skip_all, fields(env = name))]
    pub fn env_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .runner
            .capture_checked(&self.command().args(["env", "list"]))
            .context("conda env list")?;
        let exists = has_env(&output.stdout_text(), name);
        debug!(exists, "environment lookup");
        Ok(exists)
    }

    pub fn create_env(&self, name: &str, python_version: &str) -> Result<()> {
        let spec = self
            .command()
            .args(["create", "-y", "-n", name])
            .arg(format!("python={python_version}"));
        self.runner
            .run(&spec)
            .with_context(|| format!("create conda environment {name}"))
    }

    pub fn add_channel(&self, channel: &str) -> Result<()> {
        let spec = self
            .command()
            .args(["config", "--add", "channels", channel]);
        self.runner
            .run(&spec)
            .with_context(|| format!("add conda channel {channel}"))
    }

    pub fn install(&self, env: &str, packages: &[String]) -> Result<()> {
        let spec = self
            .command()
            .args(["install", "-y", "-n", env])
            .args(packages);
        self.runner
            .run(&spec)
            .with_context(|| format!("install {} into {env}", packages.join(" ")))
    }

    /// `conda run -n <env> program args...` started in `cwd`.
    pub fn env_command(&self, env: &str, cwd: &Path, program: &str, args: &[&str]) -> CommandSpec {
        self.command()
            .args(["run", "-n", env, program])
            .args(args)
            .current_dir(cwd)
    }

    /// Run `program args...` inside `env`, capturing its output.
    pub fn run_in_env(
        &self,
        env: &str,
        cwd: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput> {
        let spec = self.env_command(env, cwd, program, args);
        self.runner
            .capture(&spec)
            .with_context(|| format!("run {program} in {env}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRunner, Reply};

    #[test]
    fn env_exists_parses_listing() {
        let runner = FakeRunner::new(|_| {
            Reply::stdout("# conda environments:\nbase * /mc\npsi4env /mc/envs/psi4env\n")
        });
        let conda = Conda::new(&runner, "/mc/bin/conda");

        assert!(conda.env_exists("psi4env").expect("lookup"));
        assert!(!conda.env_exists("psi4").expect("lookup"));
        assert_eq!(runner.command_lines()[0], "conda env list");
    }

    #[test]
    fn install_passes_all_packages() {
        let runner = FakeRunner::succeeding();
        let conda = Conda::new(&runner, "/mc/bin/conda");

        conda
            .install("psi4env", &["psi4".to_string(), "psi4-rt".to_string()])
            .expect("install");
        assert_eq!(
            runner.command_lines(),
            vec!["conda install -y -n psi4env psi4 psi4-rt"]
        );
    }

    #[test]
    fn create_env_pins_python() {
        let runner = FakeRunner::succeeding();
        Conda::new(&runner, "/mc/bin/conda")
            .create_env("psi4env", "3.9")
            .expect("create");
        assert_eq!(
            runner.command_lines(),
            vec!["conda create -y -n psi4env python=3.9"]
        );
    }
}
