pub mod channel;
pub mod error;
pub mod mock;
pub mod position;
pub mod serial;
pub mod status;
pub mod telemetry;

pub use channel::SerialChannel;
pub use error::DeviceError;
pub use position::{Degrees, InvalidPosition, PositionReading, SoftLimits};
pub use serial::{CarryoutController, LinkSettings};
pub use status::{AntennaStatus, ErrorKind};

/// Pointing capability shared by every dish driver.
///
/// Methods take `&self`: implementations serialize access to the hardware
/// internally, so a controller can sit behind an `Arc` and be used by the
/// rotctld listener and the status API at the same time.
pub trait AntennaController: Send + Sync {
    /// Moves the dish and returns the position it reported.
    fn move_to(&self, target: PositionReading) -> Result<PositionReading, DeviceError>;

    /// Copy of the current status.
    fn current_status(&self) -> AntennaStatus;

    /// Halts the motors. Safe to call repeatedly.
    fn stop(&self) -> Result<(), DeviceError>;
}
