//! Git adapter for source acquisition.
//!
//! Only two operations are needed: a full clone when the checkout is missing
//! and a pull when it already exists. No branch selection, no conflict
//! handling, no signature checks.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::process::{CommandRunner, CommandSpec};

/// What [`Git::clone_or_pull`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAction {
    Cloned,
    Updated,
}

/// Wrapper for executing git commands against one checkout.
#[derive(Debug)]
pub struct Git<'a, R: CommandRunner> {
    runner: &'a R,
    checkout: PathBuf,
}

impl<'a, R: CommandRunner> Git<'a, R> {
    pub fn new(runner: &'a R, checkout: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            checkout: checkout.into(),
        }
    }

    /// Clone `url` into the checkout if it does not exist, otherwise pull.
    #[instrument(skip_all, fields(checkout = %self.checkout.display()))]
    pub fn clone_or_pull(&self, url: &str) -> Result<SourceAction> {
        if self.checkout.exists() {
            info!("repository already exists, updating");
            self.pull()?;
            return Ok(SourceAction::Updated);
        }
        info!(url, "cloning repository");
        self.clone_from(url)?;
        Ok(SourceAction::Cloned)
    }

    fn clone_from(&self, url: &str) -> Result<()> {
        let parent = self
            .checkout
            .parent()
            .ok_or_else(|| anyhow!("checkout has no parent: {}", self.checkout.display()))?;
        let spec = CommandSpec::new("git")
            .arg("clone")
            .arg(url)
            .arg(&self.checkout)
            .current_dir(parent);
        self.runner
            .run(&spec)
            .with_context(|| format!("git clone {url}"))
    }

    fn pull(&self) -> Result<()> {
        debug!("git pull");
        let spec = CommandSpec::new("git")
            .arg("pull")
            .current_dir(&self.checkout);
        self.runner.run(&spec).context("git pull")
    }
}
