//! Pure logic with no filesystem or process access.

pub mod env_list;
pub mod makefile;
pub mod platform;
