//! I/O adapters for the install stages.

pub mod conda;
pub mod config;
pub mod git;
pub mod paths;
pub mod process;
pub mod profile;
pub mod tools;
