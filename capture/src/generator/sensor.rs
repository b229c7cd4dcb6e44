use crate::generator::profile::{period_from_ms, SensorProfile};
use fmcwcore::config::RawConfigCommand;
use fmcwcore::port::{CommandPort, DEFAULT_INITIAL_BAUD};
use fmcwcore::prelude::{PortError, PortResult};
use fmcwcore::protocol::SYNC_PATTERN;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

const HEADER_LEN: usize = 40;
const BYTES_PER_OBJ: usize = 16;
const CYCLES_PER_FRAME: u32 = 600_000;

/// In-process stand-in for a radar on a serial link.
///
/// Accepts the command text over `Write`, acknowledges each line, and once
/// started emits framed packets over `Read` separated by random junk. After a
/// `baudRate` command the host must switch too, otherwise every byte it reads
/// is noise.
pub struct SimulatedSensor {
    profile: SensorProfile,
    rng: StdRng,
    frame_period: Duration,
    line: Vec<u8>,
    received: Vec<RawConfigCommand>,
    host_baud: u32,
    sensor_baud: u32,
    streaming: bool,
    outbox: VecDeque<u8>,
    frame_number: u32,
    next_frame_at: Instant,
    closed: bool,
}

impl SimulatedSensor {
    pub fn new(profile: SensorProfile) -> Self {
        Self {
            rng: StdRng::seed_from_u64(profile.seed),
            frame_period: profile.frame_period(),
            profile,
            line: Vec::new(),
            received: Vec::new(),
            host_baud: DEFAULT_INITIAL_BAUD,
            sensor_baud: DEFAULT_INITIAL_BAUD,
            streaming: false,
            outbox: VecDeque::new(),
            frame_number: 0,
            next_frame_at: Instant::now(),
            closed: false,
        }
    }

    #[cfg(test)]
    pub fn received(&self) -> &[RawConfigCommand] {
        &self.received
    }

    #[cfg(test)]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    #[cfg(test)]
    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    fn handle_line(&mut self, text: &str) {
        let Some(command) = RawConfigCommand::parse_line(text) else {
            return;
        };
        debug!("sim <- {}", command.to_line());
        // Acknowledged at the old rate, before any switch below.
        self.emit(b"\r\nDone\r\n");

        match command.name.as_str() {
            "sensorStart" => {
                self.streaming = true;
                self.next_frame_at = Instant::now();
            }
            "sensorStop" => self.streaming = false,
            "frameCfg" => {
                if let Some(period) = command.parse_arg::<f64>(5).ok().and_then(period_from_ms) {
                    self.frame_period = period;
                }
            }
            "baudRate" => {
                if let Ok(baud) = command.parse_arg::<u32>(1) {
                    self.sensor_baud = baud;
                }
            }
            _ => {}
        }
        self.received.push(command);
    }

    /// Queues bytes as the host will see them at its current baud rate.
    fn emit(&mut self, bytes: &[u8]) {
        if self.host_baud == self.sensor_baud {
            self.outbox.extend(bytes.iter().copied());
        } else {
            for _ in bytes {
                let noise: u8 = self.rng.gen();
                self.outbox.push_back(noise);
            }
        }
    }

    fn emit_frame(&mut self) {
        let garbage = self.rng.gen_range(0..=self.profile.max_garbage);
        let junk: Vec<u8> = (0..garbage).map(|_| self.rng.gen()).collect();

        self.frame_number = self.frame_number.wrapping_add(1);
        let skip = self.profile.skip_probability;
        if skip > 0.0 && self.rng.gen::<f64>() < skip {
            self.frame_number = self.frame_number.wrapping_add(self.rng.gen_range(1..=3));
        }

        let num_obj = self.rng.gen_range(0..=self.profile.max_detected_obj);
        let payload_len = num_obj as usize * BYTES_PER_OBJ;
        let total = HEADER_LEN + payload_len;

        let mut packet = Vec::with_capacity(total);
        packet.extend_from_slice(&SYNC_PATTERN);
        for value in [
            self.profile.version,
            total as u32,
            self.profile.platform,
            self.frame_number,
            self.frame_number.wrapping_mul(CYCLES_PER_FRAME),
            num_obj,
            u32::from(num_obj > 0),
            0,
        ] {
            packet.extend_from_slice(&value.to_le_bytes());
        }
        packet.extend((0..payload_len).map(|_| self.rng.gen::<u8>()));

        self.emit(&junk);
        self.emit(&packet);
    }

    /// Blocks like a serial read: until the next frame is due or the read
    /// timeout expires.
    fn wait_for_frame(&mut self) -> io::Result<()> {
        let timeout = self.profile.read_timeout();
        if !self.streaming {
            thread::sleep(timeout);
            return Err(timed_out());
        }
        let now = Instant::now();
        if self.next_frame_at > now {
            let wait = self.next_frame_at - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Err(timed_out());
            }
            thread::sleep(wait);
        }
        self.next_frame_at += self.frame_period;
        self.emit_frame();
        Ok(())
    }
}

fn timed_out() -> io::Error {
    io::Error::new(ErrorKind::TimedOut, "simulated read timed out")
}

fn not_connected() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "simulated sensor closed")
}

impl Read for SimulatedSensor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(not_connected());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.outbox.is_empty() {
            self.wait_for_frame()?;
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedSensor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(not_connected());
        }
        for &byte in buf {
            if byte == b'\n' {
                let text = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.handle_line(&text);
            } else {
                self.line.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommandPort for SimulatedSensor {
    fn set_baud_rate(&mut self, baud: u32) -> PortResult<()> {
        if self.closed {
            return Err(PortError::Closed);
        }
        self.host_baud = baud;
        Ok(())
    }

    fn clear_buffers(&mut self) -> PortResult<()> {
        if self.closed {
            return Err(PortError::Closed);
        }
        self.outbox.clear();
        self.line.clear();
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.streaming = false;
            info!(
                "Simulated sensor closed after {} commands, last frame {}",
                self.received.len(),
                self.frame_number
            );
        }
    }
}
