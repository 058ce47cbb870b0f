use crate::channel::SerialChannel;
use crate::error::DeviceError;
use crate::position::{InvalidPosition, PositionReading, SoftLimits, format_degrees};
use crate::status::{AntennaStatus, ErrorKind, StatusCell};
use crate::{AntennaController, telemetry};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Leaves any submenu and returns to the root prompt. Also halts the motors.
const ROOT_MENU: &[u8] = b"q\r";
const CLEAR_PROMPT: &[u8] = b"\r";
const TARGET_MENU: &[u8] = b"target\r";
/// Size of a single telemetry read.
const FRAME_LEN: usize = 100;

pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSettings {
    /// Telemetry reads per move before giving up.
    pub retry_attempts: usize,
    pub soft_limits: SoftLimits,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            soft_limits: SoftLimits::FULL_RANGE,
        }
    }
}

/// Drives a Winegard Carryout dish through its serial console.
///
/// The channel sits behind a mutex so only one command sequence reaches the
/// firmware at a time. Status lives behind its own lock, so readers see
/// `is_moving` while a move is in flight instead of blocking on it.
pub struct CarryoutController<C = Box<dyn SerialPort>> {
    channel: Mutex<C>,
    status: StatusCell,
    settings: LinkSettings,
}

impl CarryoutController {
    /// Opens the dish's serial port (8N1, no flow control) and resets its console.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
        settings: LinkSettings,
    ) -> Result<Self, DeviceError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| DeviceError::Communication(e.into()))?;

        log::info!("Carryout antenna connected on {port_name} at {baud_rate} baud");

        Self::new(port, settings)
    }
}

impl<C: SerialChannel> CarryoutController<C> {
    pub fn new(channel: C, settings: LinkSettings) -> Result<Self, DeviceError> {
        let controller = Self {
            channel: Mutex::new(channel),
            status: StatusCell::default(),
            settings: LinkSettings {
                retry_attempts: settings.retry_attempts.max(1),
                ..settings
            },
        };
        controller.initialize()?;

        Ok(controller)
    }

    /// Forces the firmware back to its root prompt in case it was left in a
    /// submenu. Nothing is read back.
    fn initialize(&self) -> Result<(), DeviceError> {
        let mut channel = self.channel();
        channel.send(ROOT_MENU)?;
        channel.send(CLEAR_PROMPT)?;

        Ok(())
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn channel(&self) -> std::sync::MutexGuard<'_, C> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads telemetry until a frame parses. Each attempt is a fresh read:
    /// the dish keeps streaming frames while moving, so the move command is
    /// never sent twice.
    fn await_position(&self, channel: &mut C) -> Result<PositionReading, DeviceError> {
        let attempts = self.settings.retry_attempts;
        let mut buffer = [0u8; FRAME_LEN];
        let mut attempt = 1;

        loop {
            let n = channel.receive(&mut buffer)?;
            log::trace!("Carryout replied: {:?}", String::from_utf8_lossy(&buffer[..n]));

            match telemetry::parse(&buffer[..n]) {
                Ok(position) => return Ok(position),
                Err(last) if attempt >= attempts => {
                    return Err(DeviceError::PositionUpdateFailed { attempts, last });
                }
                Err(e) => {
                    log::warn!("Position update attempt {attempt} failed: {e}");
                    attempt += 1;
                }
            }
        }
    }
}

impl<C: SerialChannel> AntennaController for CarryoutController<C> {
    fn move_to(&self, target: PositionReading) -> Result<PositionReading, DeviceError> {
        if !self.settings.soft_limits.contains(&target) {
            return Err(InvalidPosition {
                azimuth: target.azimuth(),
                elevation: target.elevation(),
            }
            .into());
        }

        let mut channel = self.channel();
        let command = format!(
            "g {} {}",
            format_degrees(target.azimuth()),
            format_degrees(target.elevation())
        );

        self.status.update(|status| {
            status.is_moving = true;
            status.last_command = Some(command.clone());
        });
        log::debug!("Move antenna to: {target}");

        let result = channel
            .send(TARGET_MENU)
            .and_then(|()| channel.send(format!("{command}\r").as_bytes()))
            .map_err(DeviceError::from)
            .and_then(|()| self.await_position(&mut channel));

        self.status.update(|status| {
            status.is_moving = false;
            match &result {
                Ok(position) => {
                    status.position = *position;
                    status.error = None;
                }
                Err(e) => status.error = e.kind(),
            }
        });

        match &result {
            Ok(position) => log::info!("Antenna at {position}"),
            Err(e) => log::error!("Movement error: {e}"),
        }

        result
    }

    fn current_status(&self) -> AntennaStatus {
        self.status.snapshot()
    }

    fn stop(&self) -> Result<(), DeviceError> {
        let result = self.channel().send(ROOT_MENU);
        self.status.update(|status| status.is_moving = false);

        match result {
            Ok(()) => {
                log::info!("Antenna movement stopped");
                Ok(())
            }
            Err(e) => {
                self.status
                    .update(|status| status.error = Some(ErrorKind::Communication));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChannel;
    use std::sync::Arc;
    use std::thread;

    const GOOD_FRAME: &[u8] = b"hdg 18000 az junk el = 4500zz";

    fn controller(channel: &MockChannel) -> CarryoutController<MockChannel> {
        let controller = CarryoutController::new(channel.clone(), LinkSettings::default()).unwrap();
        channel.clear_written();
        controller
    }

    fn target(azimuth: f64, elevation: f64) -> PositionReading {
        PositionReading::new(azimuth, elevation).unwrap()
    }

    #[test]
    fn initialize_resets_console() {
        let channel = MockChannel::new();
        CarryoutController::new(channel.clone(), LinkSettings::default()).unwrap();

        assert_eq!(channel.written(), b"q\r\r");
        assert_eq!(channel.reads(), 0);
    }

    #[test]
    fn move_sends_target_then_go_command() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        channel.push_frame(GOOD_FRAME);

        let position = controller.move_to(target(180.0, 45.0)).unwrap();

        assert_eq!(position, target(180.0, 45.0));
        assert_eq!(channel.written(), b"target\rg 180.0 45.0\r");

        let status = controller.current_status();
        assert_eq!(status.position, position);
        assert!(!status.is_moving);
        assert_eq!(status.error, None);
        assert_eq!(status.last_command.as_deref(), Some("g 180.0 45.0"));
    }

    #[test]
    fn sends_coordinates_unscaled() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        channel.push_frame(b"a 12345 b c el = 6789");

        let position = controller.move_to(target(123.45, 67.89)).unwrap();

        assert_eq!(channel.written(), b"target\rg 123.45 67.89\r");
        assert_eq!(position, target(123.45, 67.89));
    }

    #[test]
    fn retries_by_reading_again() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        channel.push_frame(b"garbage");
        channel.push_frame(b"more garbage el");
        channel.push_frame(GOOD_FRAME);
        channel.push_frame(b"x 100 y z el = 100");

        let position = controller.move_to(target(180.0, 45.0)).unwrap();

        assert_eq!(position, target(180.0, 45.0));
        assert_eq!(channel.reads(), 3);
        // The go command went out once.
        assert_eq!(channel.written(), b"target\rg 180.0 45.0\r");
    }

    #[test]
    fn success_on_first_read_short_circuits() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        channel.push_frame(GOOD_FRAME);
        channel.push_frame(GOOD_FRAME);

        controller.move_to(target(180.0, 45.0)).unwrap();

        assert_eq!(channel.reads(), 1);
    }

    #[test]
    fn gives_up_after_retry_attempts() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        for _ in 0..3 {
            channel.push_frame(b"hdg 18000 az junk");
        }
        channel.push_frame(GOOD_FRAME);

        let err = controller.move_to(target(180.0, 45.0)).unwrap_err();

        assert!(matches!(
            err,
            DeviceError::PositionUpdateFailed {
                attempts: 3,
                last: telemetry::ParseFailure::MarkerNotFound
            }
        ));
        assert_eq!(channel.reads(), 3);

        let status = controller.current_status();
        assert!(!status.is_moving);
        assert_eq!(status.error, Some(ErrorKind::PositionUpdateFailed));
        assert_eq!(status.position, PositionReading::ORIGIN);
    }

    #[test]
    fn honours_configured_retry_attempts() {
        let channel = MockChannel::new();
        let settings = LinkSettings {
            retry_attempts: 5,
            ..LinkSettings::default()
        };
        let controller = CarryoutController::new(channel.clone(), settings).unwrap();

        assert!(controller.move_to(target(10.0, 10.0)).is_err());
        assert_eq!(channel.reads(), 5);
    }

    #[test]
    fn zero_retry_attempts_still_reads_once() {
        let channel = MockChannel::new();
        let settings = LinkSettings {
            retry_attempts: 0,
            ..LinkSettings::default()
        };
        let controller = CarryoutController::new(channel.clone(), settings).unwrap();

        assert!(controller.move_to(target(10.0, 10.0)).is_err());
        assert_eq!(channel.reads(), 1);
    }

    #[test]
    fn successful_move_clears_previous_error() {
        let channel = MockChannel::new();
        let controller = controller(&channel);

        assert!(controller.move_to(target(10.0, 10.0)).is_err());
        assert_eq!(
            controller.current_status().error,
            Some(ErrorKind::PositionUpdateFailed)
        );

        channel.push_frame(GOOD_FRAME);
        controller.move_to(target(180.0, 45.0)).unwrap();
        assert_eq!(controller.current_status().error, None);
    }

    #[test]
    fn rejects_target_outside_soft_limits_without_io() {
        let channel = MockChannel::new();
        let settings = LinkSettings {
            soft_limits: SoftLimits::new(target(0.0, 10.0), target(360.0, 80.0)).unwrap(),
            ..LinkSettings::default()
        };
        let controller = CarryoutController::new(channel.clone(), settings).unwrap();
        channel.clear_written();

        let err = controller.move_to(target(180.0, 5.0)).unwrap_err();

        assert!(matches!(err, DeviceError::InvalidPosition(_)));
        assert!(channel.written().is_empty());
        assert_eq!(channel.reads(), 0);
        assert_eq!(controller.current_status(), AntennaStatus::default());
    }

    #[test]
    fn io_failure_is_a_communication_error() {
        let channel = MockChannel::new();
        let controller = controller(&channel);
        channel.set_failing(true);

        let err = controller.move_to(target(180.0, 45.0)).unwrap_err();

        assert!(err.is_fatal());
        let status = controller.current_status();
        assert!(!status.is_moving);
        assert_eq!(status.error, Some(ErrorKind::Communication));
    }

    #[test]
    fn stop_is_idempotent() {
        let channel = MockChannel::new();
        let controller = controller(&channel);

        controller.stop().unwrap();
        let first = controller.current_status();
        controller.stop().unwrap();

        assert_eq!(controller.current_status(), first);
        assert!(!first.is_moving);
        assert_eq!(channel.written(), b"q\rq\r");
        assert_eq!(channel.reads(), 0);
    }

    #[test]
    fn status_shows_move_in_flight() {
        let channel = MockChannel::new();
        let controller = Arc::new(controller(&channel));
        channel.set_read_delay(Duration::from_millis(200));
        channel.push_frame(GOOD_FRAME);

        let mover = {
            let controller = controller.clone();
            thread::spawn(move || controller.move_to(target(180.0, 45.0)))
        };

        thread::sleep(Duration::from_millis(50));
        let during = controller.current_status();
        assert!(during.is_moving);
        assert_eq!(during.position, PositionReading::ORIGIN);

        mover.join().unwrap().unwrap();
        let after = controller.current_status();
        assert!(!after.is_moving);
        assert_eq!(after.position, target(180.0, 45.0));
    }
}
