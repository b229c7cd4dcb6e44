//! Serial port lifecycle: discovery, opening, command upload with the
//! two-phase baud-rate handshake, and teardown.

use crate::config::RawConfigCommand;
use crate::prelude::{PortError, PortResult};
use log::{debug, info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

pub const DEFAULT_INITIAL_BAUD: u32 = 115_200;

#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub initial_baud: u32,
    pub read_timeout: Duration,
    pub inter_command_delay: Duration,
    pub baud_switch_delay: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            initial_baud: DEFAULT_INITIAL_BAUD,
            read_timeout: Duration::from_secs(1),
            inter_command_delay: Duration::from_millis(50),
            baud_switch_delay: Duration::from_millis(200),
        }
    }
}

/// Control operations the configuration upload needs beyond plain writes.
pub trait CommandPort: Write {
    fn set_baud_rate(&mut self, baud: u32) -> PortResult<()>;
    fn clear_buffers(&mut self) -> PortResult<()>;
    /// Releases the device. Calling it again is a no-op.
    fn close(&mut self);
}

pub fn available_ports() -> PortResult<Vec<String>> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|err| PortError::Enumeration(err.to_string()))
}

/// An opened serial device. Reads and writes fail with `NotConnected` once closed.
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn inner(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner()?.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl CommandPort for SerialLink {
    fn set_baud_rate(&mut self, baud: u32) -> PortResult<()> {
        let port = self.port.as_mut().ok_or(PortError::Closed)?;
        port.set_baud_rate(baud)
            .map_err(|err| PortError::BaudRateChangeFailure {
                baud,
                reason: err.to_string(),
            })
    }

    fn clear_buffers(&mut self) -> PortResult<()> {
        let port = self.port.as_mut().ok_or(PortError::Closed)?;
        port.clear(ClearBuffer::All)
            .map_err(|err| PortError::Io(io::Error::new(io::ErrorKind::Other, err.to_string())))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port {} closed", self.name);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct PortController;

impl PortController {
    /// Opens `port_id` at the initial baud rate (8N1) after checking that the
    /// device is enumerated.
    pub fn open(port_id: &str, settings: &PortSettings) -> PortResult<SerialLink> {
        let available = available_ports()?;
        if !available.iter().any(|name| name == port_id) {
            return Err(PortError::PortUnavailable {
                port: port_id.to_string(),
                available,
            });
        }

        let port = serialport::new(port_id, settings.initial_baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|err| PortError::Open {
                port: port_id.to_string(),
                reason: err.to_string(),
            })?;
        info!("Opened serial port {} at {} baud", port_id, settings.initial_baud);

        Ok(SerialLink {
            name: port_id.to_string(),
            port: Some(port),
        })
    }

    /// Uploads the command list line by line. After each `baudRate` command
    /// both ends switch to the speed it names; a failed switch closes the port.
    pub fn send_commands<P: CommandPort + ?Sized>(
        port: &mut P,
        commands: &[RawConfigCommand],
        settings: &PortSettings,
    ) -> PortResult<()> {
        for command in commands {
            let line = command.to_line();
            debug!("-> {}", line);
            port.write_all(format!("{line}\n").as_bytes())?;
            port.flush()?;
            thread::sleep(settings.inter_command_delay);

            if command.name == "baudRate" {
                thread::sleep(settings.baud_switch_delay);
                let switched = match command.parse_arg::<u32>(1) {
                    Ok(baud) => port.set_baud_rate(baud).map(|_| baud),
                    Err(_) => Err(PortError::BaudRateChangeFailure {
                        baud: 0,
                        reason: format!("no usable baud value in `{line}`"),
                    }),
                };
                match switched {
                    Ok(baud) => info!("Switched to {} baud", baud),
                    Err(err) => {
                        warn!("Baud rate switch failed: {}", err);
                        port.close();
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Discards anything buffered from the command phase before binary reads start.
    pub fn prepare_for_streaming<P: CommandPort + ?Sized>(port: &mut P) -> PortResult<()> {
        port.clear_buffers()?;
        info!("Port configured for binary streaming");
        Ok(())
    }

    pub fn close<P: CommandPort + ?Sized>(port: &mut P) {
        port.close();
    }
}
