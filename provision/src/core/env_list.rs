//! Parsing `conda env list` output.

/// Names of the environments listed by `conda env list`.
///
/// Comment lines and blank lines are skipped. The active-environment marker
/// (`*`) is part of the second column and never part of the name. Unnamed
/// environments (a bare path in the first column) are ignored.
pub fn env_names(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with('/') && *name != "*")
        .collect()
}

/// Exact-name membership test.
pub fn has_env(output: &str, name: &str) -> bool {
    env_names(output).contains(&name)
}
