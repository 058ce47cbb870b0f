use crate::position::InvalidPosition;
use crate::status::ErrorKind;
use crate::telemetry::ParseFailure;
use std::io;

/// Errors returned by an [`AntennaController`](crate::AntennaController).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The requested target is outside the accepted range. Never retried.
    #[error(transparent)]
    InvalidPosition(#[from] InvalidPosition),

    /// Every telemetry read of a move was unintelligible.
    #[error("position not updated after {attempts} telemetry reads: {last}")]
    PositionUpdateFailed {
        attempts: usize,
        #[source]
        last: ParseFailure,
    },

    /// The serial channel itself failed.
    #[error("serial communication failed: {0}")]
    Communication(#[from] io::Error),
}

impl DeviceError {
    /// The fault to record in the controller status, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DeviceError::InvalidPosition(_) => None,
            DeviceError::PositionUpdateFailed { .. } => Some(ErrorKind::PositionUpdateFailed),
            DeviceError::Communication(_) => Some(ErrorKind::Communication),
        }
    }

    /// Whether the channel is unusable and the caller should give up on it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Communication(_))
    }
}
