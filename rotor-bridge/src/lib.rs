pub mod api;
pub mod bridge;
pub mod config;
pub mod protocol;
pub mod session;

use antenna_controller::AntennaController;
use std::sync::Arc;

pub use bridge::Bridge;
pub use session::{RotctldSession, SessionState};

/// The one dish every listener of the process talks to.
pub type SharedController = Arc<dyn AntennaController>;
