use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Byte channel to the dish firmware.
pub trait SerialChannel: Send {
    /// Writes the whole buffer.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads whatever is available, waiting at most the channel timeout.
    /// A timeout yields `Ok(0)`.
    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
}

impl SerialChannel for Box<dyn SerialPort> {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)?;
        self.flush()
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}
