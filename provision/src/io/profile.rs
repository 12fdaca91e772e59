//! Shell startup profile registration.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::platform::Host;
use crate::io::paths::home_dir;

/// Profile to register installs on: the configured one, else the login
/// shell's startup file under `$HOME`.
pub fn resolve_profile(configured: Option<&Path>, host: Host) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let shell = std::env::var("SHELL").ok();
    Ok(home_dir()?.join(host.shell_profile(shell.as_deref())))
}

/// The two profile lines that put an install prefix on the search path.
pub fn profile_lines(home_var: &str, install_dir: &Path) -> [String; 2] {
    [
        format!("export {home_var}=\"{}\"", install_dir.display()),
        format!("export PATH=\"${home_var}/bin:$PATH\""),
    ]
}

/// Append the export lines to `profile` unless they are already there.
///
/// Returns `true` when the profile was modified.
pub fn register_install(profile: &Path, home_var: &str, install_dir: &Path) -> Result<bool> {
    let lines = profile_lines(home_var, install_dir);
    let existing = match fs::read_to_string(profile) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err).with_context(|| format!("read {}", profile.display())),
    };
    if existing.lines().any(|line| line.trim() == lines[0]) {
        debug!(profile = %profile.display(), "profile already registered");
        return Ok(false);
    }

    let mut block = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        block.push('\n');
    }
    for line in &lines {
        block.push_str(line);
        block.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(profile)
        .with_context(|| format!("open {}", profile.display()))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("append to {}", profile.display()))?;
    info!(profile = %profile.display(), "registered {} on shell profile", home_var);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{Arch, Os};

    #[test]
    fn configured_profile_wins() {
        let host = Host::new(Os::Linux, Arch::X86_64);
        let profile = resolve_profile(Some(Path::new("/tmp/custom_rc")), host).expect("resolve");
        assert_eq!(profile, Path::new("/tmp/custom_rc"));
    }

    #[test]
    fn appends_two_lines_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let profile = temp.path().join(".zshrc");
        fs::write(&profile, "alias ll='ls -l'").expect("write");
        let prefix = Path::new("/Users/dev/software/miniconda3");

        assert!(register_install(&profile, "MINICONDA_HOME", prefix).expect("register"));
        assert!(!register_install(&profile, "MINICONDA_HOME", prefix).expect("register again"));

        let contents = fs::read_to_string(&profile).expect("read");
        assert_eq!(
            contents,
            "alias ll='ls -l'\n\
             export MINICONDA_HOME=\"/Users/dev/software/miniconda3\"\n\
             export PATH=\"$MINICONDA_HOME/bin:$PATH\"\n"
        );
    }

    #[test]
    fn creates_missing_profile() {
        let temp = tempfile::tempdir().expect("tempdir");
        let profile = temp.path().join(".bashrc");

        assert!(register_install(&profile, "MINICONDA_HOME", Path::new("/opt/mc")).expect("register"));
        let contents = fs::read_to_string(&profile).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }
}
