//! Workstation installer for Tinker and psi4.
//!
//! The crate drives a fixed, fail-fast provisioning pipeline: bootstrap the
//! install root and log, make sure the toolchain is present, build Tinker (and
//! its bundled FFTW) from source, then install psi4 into an isolated conda
//! environment and smoke-test it. The split mirrors the usual one:
//!
//! - **[`core`]**: Pure logic (Makefile substitution, host detection, parsing
//!   `conda env list`). No I/O.
//! - **[`io`]**: Side-effecting adapters (process execution, git, conda, tool
//!   lookup, shell profile, config). External commands go through the
//!   [`io::process::CommandRunner`] trait so tests never spawn installers.
//!
//! Stage modules ([`prereqs`], [`tinker`], [`psi4`]) implement one stage each and
//! [`install`] sequences them.

pub mod core;
pub mod exit_codes;
pub mod install;
pub mod io;
pub mod logging;
pub mod prereqs;
pub mod psi4;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tinker;
