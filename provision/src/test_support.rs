//! Test-only doubles for the command runner and tool probe.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Result;

use crate::core::platform::{Arch, Host, Os};
use crate::io::config::ProvisionConfig;
use crate::io::paths::InstallPaths;
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::io::tools::ToolProbe;

/// Scripted reply for one command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Reply {
    pub fn ok() -> Self {
        Self::exit(0)
    }

    pub fn exit(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn stdout(text: &str) -> Self {
        Self {
            code: Some(0),
            stdout: text.to_string(),
            ..Self::default()
        }
    }
}

type Handler = Box<dyn Fn(&CommandSpec) -> Reply>;

/// Runner that records every command and answers with a handler.
pub struct FakeRunner {
    handler: Handler,
    calls: RefCell<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new(handler: impl Fn(&CommandSpec) -> Reply + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every command exits 0 with no output.
    pub fn succeeding() -> Self {
        Self::new(|_| Reply::ok())
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Recorded commands rendered as `program arg...`.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, line: &str) -> bool {
        self.command_lines().iter().any(|l| l == line)
    }

    pub fn ran_program(&self, program: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|spec| spec.program_name() == program)
    }

    fn reply(&self, spec: &CommandSpec) -> Reply {
        self.calls.borrow_mut().push(spec.clone());
        (self.handler)(spec)
    }
}

impl CommandRunner for FakeRunner {
    fn status(&self, spec: &CommandSpec) -> Result<Option<i32>> {
        Ok(self.reply(spec).code)
    }

    fn capture(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let reply = self.reply(spec);
        Ok(CommandOutput {
            code: reply.code,
            stdout: reply.stdout.into_bytes(),
            stderr: reply.stderr.into_bytes(),
            ..CommandOutput::default()
        })
    }
}

/// Probe over an in-memory set of tool names. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    tools: Rc<RefCell<BTreeSet<String>>>,
}

impl FakeProbe {
    pub fn with(tools: &[&str]) -> Self {
        let probe = Self::default();
        for tool in tools {
            probe.install(tool);
        }
        probe
    }

    pub fn install(&self, tool: &str) {
        self.tools.borrow_mut().insert(tool.to_string());
    }
}

impl ToolProbe for FakeProbe {
    fn find(&self, name: &str) -> Option<PathBuf> {
        self.tools
            .borrow()
            .contains(name)
            .then(|| Path::new("/usr/bin").join(name))
    }
}

/// Every tool the pipeline expects on a fully provisioned macOS host.
pub const ALL_TOOLS: &[&str] = &["xcode-select", "brew", "gcc", "gfortran", "git", "make", "curl"];

pub fn mac_host() -> Host {
    Host::new(Os::MacOs, Arch::X86_64)
}

pub fn linux_host() -> Host {
    Host::new(Os::Linux, Arch::X86_64)
}

/// Temporary install root with default config.
pub struct TestInstall {
    _temp: tempfile::TempDir,
    pub home: PathBuf,
    pub config: ProvisionConfig,
    pub paths: InstallPaths,
}

impl TestInstall {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let home = temp.path().join("home");
        fs::create_dir_all(&home)?;
        let mut config = ProvisionConfig {
            jobs: Some(2),
            ..ProvisionConfig::default()
        };
        config.conda.shell_profile = Some(home.join(".zshrc"));
        let paths = InstallPaths::new(home.join("software"), &config);
        fs::create_dir_all(&paths.software_dir)?;
        Ok(Self {
            _temp: temp,
            home,
            config,
            paths,
        })
    }

    /// Lay out a Tinker checkout the way the upstream repository ships it.
    pub fn seed_tinker_checkout(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.fftw_dir)?;
        fs::create_dir_all(&self.paths.source_dir)?;
        if let Some(parent) = self.paths.makefile_template.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.paths.makefile_template, MAKEFILE_TEMPLATE)?;
        Ok(())
    }
}

pub const MAKEFILE_TEMPLATE: &str = "\
BUILDDIR = $(HOME)/ffe/build
BINDIR = $(BUILDDIR)/bin
";

/// Handler that imitates successful upstream builds.
///
/// `git clone` lays out the checkout, FFTW's `make install` drops the static
/// libraries, Tinker's `make install` drops the `analyze` executable, the
/// Miniconda installer creates `bin/conda`, and psi4 prints an SCF energy.
/// Commands matched by `fail` exit 2 instead.
pub fn simulate_upstream(
    paths: &InstallPaths,
    env_listing: &'static str,
    fail: impl Fn(&str) -> bool + 'static,
) -> impl Fn(&CommandSpec) -> Reply + 'static {
    let paths = paths.clone();
    move |spec: &CommandSpec| {
        let line = spec.to_string();
        if fail(&line) {
            return Reply::exit(2);
        }
        let cwd = spec.cwd.clone().unwrap_or_default();
        let touch = |path: &Path| {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::write(path, "");
        };
        if line.starts_with("git clone") {
            let _ = fs::create_dir_all(&paths.fftw_dir);
            let _ = fs::create_dir_all(&paths.source_dir);
            let _ = fs::create_dir_all(paths.makefile_template.parent().unwrap_or(paths.tinker_dir.as_path()));
            let _ = fs::write(&paths.makefile_template, MAKEFILE_TEMPLATE);
        } else if line.starts_with("make") && line.ends_with("install") && cwd == paths.fftw_dir {
            touch(&paths.fftw_lib_dir.join("libfftw3.a"));
            touch(&paths.fftw_lib_dir.join("libfftw3_threads.a"));
        } else if line.starts_with("make") && line.ends_with("install") && cwd == paths.source_dir {
            touch(&paths.bin_dir.join("analyze"));
        } else if line.starts_with("bash") && line.contains("Miniconda3") {
            touch(&paths.miniconda_conda());
        } else if line.ends_with("env list") {
            return Reply::stdout(env_listing);
        } else if line.contains("psi4 --version") {
            return Reply::stdout("1.9.1\n");
        } else if line.contains("psi4 test.inp") {
            return Reply::stdout("  @DF-RHF Final Energy:    -1.06 Hartree\n");
        }
        Reply::ok()
    }
}
