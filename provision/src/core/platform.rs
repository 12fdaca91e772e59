//! Host detection and the per-platform choices that follow from it.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// System package manager used to install missing prerequisites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Homebrew,
    Apt,
}

impl PackageManager {
    pub fn executable(self) -> &'static str {
        match self {
            PackageManager::Homebrew => "brew",
            PackageManager::Apt => "apt-get",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Host {
    pub os: Os,
    pub arch: Arch,
}

impl Host {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Host this binary runs on.
    pub fn detect() -> Result<Self> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_consts(os: &str, arch: &str) -> Result<Self> {
        let os = match os {
            "macos" => Os::MacOs,
            "linux" => Os::Linux,
            other => bail!("unsupported operating system: {other}"),
        };
        let arch = match arch {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => bail!("unsupported architecture: {other}"),
        };
        Ok(Self { os, arch })
    }

    /// Miniconda installer published for this host.
    pub fn miniconda_installer(&self) -> String {
        let os = match self.os {
            Os::MacOs => "MacOSX",
            Os::Linux => "Linux",
        };
        let arch = match (self.os, self.arch) {
            (_, Arch::X86_64) => "x86_64",
            (Os::MacOs, Arch::Aarch64) => "arm64",
            (Os::Linux, Arch::Aarch64) => "aarch64",
        };
        format!("Miniconda3-latest-{os}-{arch}.sh")
    }

    pub fn package_manager(&self) -> PackageManager {
        match self.os {
            Os::MacOs => PackageManager::Homebrew,
            Os::Linux => PackageManager::Apt,
        }
    }

    /// macOS compilers come from the Xcode Command Line Tools.
    pub fn needs_developer_tools(&self) -> bool {
        self.os == Os::MacOs
    }

    /// Directories a fresh Homebrew install puts `brew` in.
    pub fn package_manager_dirs(&self) -> Vec<PathBuf> {
        match self.os {
            Os::MacOs => vec![
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/usr/local/bin"),
            ],
            Os::Linux => Vec::new(),
        }
    }

    /// Startup profile (relative to `$HOME`) for the given login shell.
    pub fn shell_profile(&self, shell: Option<&str>) -> &'static str {
        let shell_name = shell
            .and_then(|s| s.rsplit('/').next())
            .unwrap_or_default();
        match (shell_name, self.os) {
            ("zsh", _) => ".zshrc",
            (_, Os::MacOs) => ".bash_profile",
            (_, Os::Linux) => ".bashrc",
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let os = match self.os {
            Os::MacOs => "macos",
            Os::Linux => "linux",
        };
        let arch = match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        };
        write!(f, "{os}-{arch}")
    }
}
