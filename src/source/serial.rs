//! Serial port byte source.
//!
//! Wraps the `serialport` crate. The port is opened with a read timeout so a quiet
//! line shows up as [`SourceRead::Idle`] instead of blocking the producer forever;
//! that timeout also bounds how quickly a stop request is noticed.

use std::io;
#[cfg(feature = "instrument_serial")]
use std::io::Read;
#[cfg(feature = "instrument_serial")]
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{AppResult, DaqError};
use crate::source::{ByteSource, SourceRead};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;

/// Serial device opened for reading.
pub struct SerialSource {
    name: String,
    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialSource {
    /// Open the port named in `settings` and drop any stale input.
    #[cfg(feature = "instrument_serial")]
    pub fn open(settings: &SerialConfig) -> AppResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                DaqError::SerialPort(format!("failed to open '{}': {}", settings.port, e))
            })?;

        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            warn!(port = %settings.port, error = %e, "Could not clear stale input");
        }

        info!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            read_timeout_ms = settings.read_timeout_ms,
            "Serial port opened"
        );

        Ok(Self {
            name: settings.port.clone(),
            port: Some(port),
        })
    }

    /// Serial support is compiled out.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(_settings: &SerialConfig) -> AppResult<Self> {
        Err(DaqError::SerialFeatureDisabled)
    }
}

impl ByteSource for SerialSource {
    #[cfg(feature = "instrument_serial")]
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<SourceRead> {
        let Some(port) = self.port.as_mut() else {
            return Ok(SourceRead::Closed);
        };
        match port.read(buf) {
            // A serial line never reports EOF; zero bytes is just a quiet line.
            Ok(0) => Ok(SourceRead::Idle),
            Ok(n) => Ok(SourceRead::Data(n)),
            Err(e) if super::is_transient(e.kind()) => Ok(SourceRead::Idle),
            Err(e) => Err(e),
        }
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn read_bytes(&mut self, _buf: &mut [u8]) -> io::Result<SourceRead> {
        Ok(SourceRead::Closed)
    }

    fn close(&mut self) {
        #[cfg(feature = "instrument_serial")]
        if self.port.take().is_some() {
            debug!(port = %self.name, "Serial connection closed");
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(all(test, feature = "instrument_serial"))]
mod tests {
    use super::*;

    #[test]
    fn opening_missing_port_is_a_serial_error() {
        let settings = SerialConfig {
            port: "/dev/frame-daq-does-not-exist".to_string(),
            ..SerialConfig::default()
        };
        match SerialSource::open(&settings) {
            Err(DaqError::SerialPort(msg)) => assert!(msg.contains("does-not-exist")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }
}
