//! Process exit codes for the `provision` binary.

use crate::io::process::CommandFailed;

/// Pipeline completed, or stopped early asking the operator to re-run.
pub const OK: i32 = 0;
/// Any failure that does not carry an external command's exit code.
pub const FAILED: i32 = 1;

/// Exit code for a failed run.
///
/// Propagates the exit code of the first failing external command when the
/// error chain contains one; everything else maps to [`FAILED`].
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CommandFailed>())
        .and_then(|failed| failed.code)
        .filter(|code| *code != OK)
        .unwrap_or(FAILED)
}
