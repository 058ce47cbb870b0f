use crate::channel::SerialChannel;
use crate::error::DeviceError;
use crate::position::{InvalidPosition, PositionReading, SoftLimits};
use crate::status::{AntennaStatus, StatusCell};
use crate::AntennaController;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// A dish that reaches every valid target instantly. Used to run the bridge
/// without hardware.
#[derive(Debug, Default)]
pub struct SimulatedController {
    status: StatusCell,
    soft_limits: SoftLimits,
}

impl SimulatedController {
    pub fn new(soft_limits: SoftLimits) -> Self {
        Self {
            status: StatusCell::default(),
            soft_limits,
        }
    }
}

impl AntennaController for SimulatedController {
    fn move_to(&self, target: PositionReading) -> Result<PositionReading, DeviceError> {
        if !self.soft_limits.contains(&target) {
            return Err(InvalidPosition {
                azimuth: target.azimuth(),
                elevation: target.elevation(),
            }
            .into());
        }

        self.status.update(|status| {
            status.position = target;
            status.is_moving = false;
            status.error = None;
            status.last_command = Some(format!("MOVE {target}"));
        });
        log::info!("Simulated antenna at {target}");

        Ok(target)
    }

    fn current_status(&self) -> AntennaStatus {
        self.status.snapshot()
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.status.update(|status| status.is_moving = false);
        Ok(())
    }
}

/// Scripted serial channel for tests. Clones share state, so a test can keep
/// one handle while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
}

#[derive(Debug, Default)]
struct MockChannelInner {
    frames: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    reads: usize,
    failing: bool,
    read_delay: Duration,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MockChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a frame to be returned by one read. With no frame queued a
    /// read behaves like a timeout.
    pub fn push_frame(&self, frame: &[u8]) {
        self.inner().frames.push_back(frame.to_vec());
    }

    /// Every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner().written.clone()
    }

    pub fn clear_written(&self) {
        self.inner().written.clear();
    }

    /// Number of reads performed.
    pub fn reads(&self) -> usize {
        self.inner().reads
    }

    /// Makes every subsequent read and write fail, as a pulled cable would.
    pub fn set_failing(&self, failing: bool) {
        self.inner().failing = failing;
    }

    /// Slows reads down to mimic the serial timeout.
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner().read_delay = delay;
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected")
}

impl SerialChannel for MockChannel {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let mut inner = self.inner();
        if inner.failing {
            return Err(disconnected());
        }

        inner.written.extend_from_slice(data);
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let delay = self.inner().read_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut inner = self.inner();
        if inner.failing {
            return Err(disconnected());
        }

        inner.reads += 1;
        let Some(frame) = inner.frames.pop_front() else {
            return Ok(0);
        };

        let n = frame.len().min(buffer.len());
        buffer[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }
}
