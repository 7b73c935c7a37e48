// SPDX-License-Identifier: GPL-3.0-only

use lvmd_types::AttrError;
use thiserror::Error;

/// LVM exit code for "object not found" style failures.
pub const EXIT_NOT_FOUND: i32 = 5;

/// A command ran but did not exit successfully
#[derive(Error, Debug)]
#[error("{message}")]
pub struct CommandError {
    /// Rendered command line
    pub command: String,

    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Wrapped failure combined with the trimmed stderr
    pub message: String,
}

impl CommandError {
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Error types for LVM operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to decode output of `{command}`: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {field}")]
    Parse { field: &'static str, value: String },

    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SysError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SysError::NotFound(_))
    }
}

/// Result type alias for LVM operations
pub type Result<T> = std::result::Result<T, SysError>;

/// Whether stderr of a failed LVM command reports a missing volume group or
/// logical volume.
///
/// This matches the wording of current LVM releases and is not a stable
/// interface of the tool; it only applies together with exit code 5.
pub fn is_not_found_message(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.lines().any(|line| {
        (line.contains("volume group") && line.contains("not found"))
            || line.contains("failed to find logical volume")
    })
}
