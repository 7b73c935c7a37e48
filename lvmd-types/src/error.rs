// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy every remote operation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LvmdErrorKind {
    InvalidArgument,
    NotFound,
    ResourceExhausted,
    OutOfRange,
    Unimplemented,
    Internal,
}

impl LvmdErrorKind {
    /// Stable numeric code, aligned with the gRPC status codes volume
    /// orchestrators already branch on.
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidArgument => 3,
            Self::NotFound => 5,
            Self::ResourceExhausted => 8,
            Self::OutOfRange => 11,
            Self::Unimplemented => 12,
            Self::Internal => 13,
        }
    }
}

/// Wire form of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct LvmdError {
    pub kind: LvmdErrorKind,
    pub message: String,
}

impl LvmdError {
    pub fn new(kind: LvmdErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == LvmdErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lvmd_error_roundtrips() {
        let error = LvmdError::new(LvmdErrorKind::ResourceExhausted, "not enough space");
        let json = serde_json::to_string(&error).expect("serialize error");
        assert!(json.contains("\"resource_exhausted\""));
        let parsed: LvmdError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
    }

    #[test]
    fn codes_are_distinct() {
        let kinds = [
            LvmdErrorKind::InvalidArgument,
            LvmdErrorKind::NotFound,
            LvmdErrorKind::ResourceExhausted,
            LvmdErrorKind::OutOfRange,
            LvmdErrorKind::Unimplemented,
            LvmdErrorKind::Internal,
        ];
        let mut codes: Vec<u16> = kinds.iter().map(|kind| kind.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
