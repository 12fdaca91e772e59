//! Makefile variable substitution.

use anyhow::{Context, Result};
use regex::{Captures, Regex};

/// Result of [`rewrite_assignment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// Number of lines that were rewritten.
    pub replaced: usize,
}

/// Rewrite every `VAR = <from>` line to `VAR = <to>`.
///
/// Only lines whose value is exactly `from` (surrounding blanks ignored) are
/// touched; spacing before the value is preserved and `to` is inserted
/// literally.
pub fn rewrite_assignment(contents: &str, var: &str, from: &str, to: &str) -> Result<Rewrite> {
    let pattern = format!(
        r"(?m)^([ \t]*{}[ \t]*=[ \t]*){}[ \t]*$",
        regex::escape(var),
        regex::escape(from)
    );
    let re = Regex::new(&pattern)
        .with_context(|| format!("build substitution pattern for {var}"))?;

    let mut replaced = 0usize;
    let text = re
        .replace_all(contents, |caps: &Captures<'_>| {
            replaced += 1;
            format!("{}{}", &caps[1], to)
        })
        .into_owned();
    Ok(Rewrite { text, replaced })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
# Tinker Makefile
BUILDDIR = $(HOME)/ffe/build
BINDIR = $(BUILDDIR)/bin
LIBS = -L$(BUILDDIR)/fftw/lib
";

    #[test]
    fn rewrites_placeholder_line_only() {
        let rewrite = rewrite_assignment(
            TEMPLATE,
            "BUILDDIR",
            "$(HOME)/ffe/build",
            "/Users/dev/software/tinker",
        )
        .expect("rewrite");
        assert_eq!(rewrite.replaced, 1);
        assert_eq!(
            rewrite.text,
            "\
# Tinker Makefile
BUILDDIR = /Users/dev/software/tinker
BINDIR = $(BUILDDIR)/bin
LIBS = -L$(BUILDDIR)/fftw/lib
"
        );
    }

    #[test]
    fn replacement_is_literal() {
        let rewrite = rewrite_assignment("BUILDDIR = old\n", "BUILDDIR", "old", "/tmp/$1/${x}")
            .expect("rewrite");
        assert_eq!(rewrite.text, "BUILDDIR = /tmp/$1/${x}\n");
    }

    #[test]
    fn keeps_original_spacing() {
        let rewrite = rewrite_assignment("BUILDDIR\t=  old  \n", "BUILDDIR", "old", "/new")
            .expect("rewrite");
        assert_eq!(rewrite.text, "BUILDDIR\t=  /new\n");
    }

    #[test]
    fn leaves_other_values_untouched() {
        let contents = "BUILDDIR = /already/custom\nXBUILDDIR = $(HOME)/ffe/build\n";
        let rewrite = rewrite_assignment(contents, "BUILDDIR", "$(HOME)/ffe/build", "/new")
            .expect("rewrite");
        assert_eq!(rewrite.replaced, 0);
        assert_eq!(rewrite.text, contents);
    }

    #[test]
    fn oversized_pattern_is_an_error() {
        let placeholder = "a".repeat(2_000_000);
        let err = rewrite_assignment("BUILDDIR = a\n", "BUILDDIR", &placeholder, "/new").unwrap_err();
        assert!(err.to_string().contains("build substitution pattern for BUILDDIR"));
    }
}
