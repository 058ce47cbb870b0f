use crate::position::PositionReading;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Last fault recorded by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No telemetry frame could be parsed within the retry budget.
    PositionUpdateFailed,
    /// The serial channel failed while talking to the dish.
    Communication,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::PositionUpdateFailed => write!(f, "Failed to update position"),
            ErrorKind::Communication => write!(f, "Communication error"),
        }
    }
}

/// Snapshot of what a controller knows about the dish.
///
/// The position starts at [`PositionReading::ORIGIN`] because the firmware
/// only reports its pointing while the motors run; it is accurate after the
/// first completed move.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AntennaStatus {
    pub position: PositionReading,
    pub is_moving: bool,
    pub error: Option<ErrorKind>,
    /// Diagnostic only.
    pub last_command: Option<String>,
}

/// Status shared between the thread driving the dish and status readers.
#[derive(Debug, Default)]
pub(crate) struct StatusCell(RwLock<AntennaStatus>);

impl StatusCell {
    pub(crate) fn snapshot(&self) -> AntennaStatus {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut AntennaStatus)) {
        let mut status = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *status);
    }
}
