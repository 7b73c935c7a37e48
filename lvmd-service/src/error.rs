// SPDX-License-Identifier: GPL-3.0-only

use lvmd_sys::SysError;
use lvmd_types::{LvmdError, LvmdErrorKind};
use thiserror::Error;
use zbus::fdo;

/// Service-level errors, one variant per remote error kind
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> LvmdErrorKind {
        match self {
            Self::InvalidArgument(_) => LvmdErrorKind::InvalidArgument,
            Self::NotFound(_) => LvmdErrorKind::NotFound,
            Self::ResourceExhausted(_) => LvmdErrorKind::ResourceExhausted,
            Self::OutOfRange(_) => LvmdErrorKind::OutOfRange,
            Self::Unimplemented(_) => LvmdErrorKind::Unimplemented,
            Self::Internal(_) => LvmdErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(message)
            | Self::NotFound(message)
            | Self::ResourceExhausted(message)
            | Self::OutOfRange(message)
            | Self::Unimplemented(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<SysError> for ServiceError {
    fn from(err: SysError) -> Self {
        match err {
            SysError::NotFound(message) => ServiceError::NotFound(message),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<&ServiceError> for LvmdError {
    fn from(err: &ServiceError) -> Self {
        LvmdError::new(err.kind(), err.message())
    }
}

impl From<ServiceError> for fdo::Error {
    fn from(err: ServiceError) -> Self {
        // The message is the JSON form of the error so clients can recover
        // the exact kind, including the ones D-Bus has no name for.
        let wire = LvmdError::from(&err);
        let message = serde_json::to_string(&wire).unwrap_or_else(|_| err.to_string());
        match err {
            ServiceError::InvalidArgument(_) | ServiceError::OutOfRange(_) => {
                fdo::Error::InvalidArgs(message)
            }
            ServiceError::NotFound(_) => fdo::Error::UnknownObject(message),
            ServiceError::ResourceExhausted(_) => fdo::Error::LimitsExceeded(message),
            ServiceError::Unimplemented(_) => fdo::Error::NotSupported(message),
            ServiceError::Internal(_) => fdo::Error::Failed(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_not_found_stays_not_found() {
        let err = ServiceError::from(SysError::NotFound("vg0/lv0".to_string()));
        assert!(err.is_not_found());

        let err = ServiceError::from(SysError::InvalidArgument("bad".to_string()));
        assert_eq!(err.kind(), LvmdErrorKind::Internal);
    }

    #[test]
    fn dbus_error_carries_kind() {
        let err: fdo::Error = ServiceError::OutOfRange("too small".to_string()).into();
        let fdo::Error::InvalidArgs(message) = err else {
            panic!("expected InvalidArgs");
        };
        let wire: LvmdError = serde_json::from_str(&message).expect("json message");
        assert_eq!(wire.kind, LvmdErrorKind::OutOfRange);
        assert_eq!(wire.message, "too small");

        let err: fdo::Error = ServiceError::ResourceExhausted("full".to_string()).into();
        assert!(matches!(err, fdo::Error::LimitsExceeded(_)));
    }
}
