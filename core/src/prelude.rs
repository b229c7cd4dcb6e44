use crate::config::RadarParams;
use crate::frame::FrameData;
use crate::protocol::{ByteSource, FrameHeader};

/// Failures raised while compiling the sensor command list.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("required command `{0}` is missing from the configuration")]
    MissingCommand(&'static str),
    #[error("command `{command}` has no argument at position {index}")]
    MissingArgument { command: String, index: usize },
    #[error("command `{command}` argument {index} (`{value}`) is not a valid number")]
    InvalidNumber {
        command: String,
        index: usize,
        value: String,
    },
    #[error("division by zero while deriving {0}")]
    DivisionByZero(&'static str),
    #[error("unable to read configuration {path}: {reason}")]
    Io { path: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serial port lifecycle failures.
#[derive(thiserror::Error, Debug)]
pub enum PortError {
    #[error("port {port} is not available (found: {available:?})")]
    PortUnavailable {
        port: String,
        available: Vec<String>,
    },
    #[error("failed to open port {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("failed to switch baud rate to {baud}: {reason}")]
    BaudRateChangeFailure { baud: u32, reason: String },
    #[error("port is closed")]
    Closed,
    #[error("serial enumeration failed: {0}")]
    Enumeration(String),
    #[error("serial i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type PortResult<T> = Result<T, PortError>;

/// Per-frame decode failures. Always recoverable: the frame is dropped.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("struct unpack mismatch: template expects {expected} bytes, got {actual}")]
    StructUnpackMismatch { expected: usize, actual: usize },
    #[error("header field `{0}` is missing")]
    MissingField(&'static str),
    #[error("packet length {packet} is shorter than the header length {header}")]
    InvalidPacketLength { packet: usize, header: usize },
    #[error("packet length {packet} exceeds the {limit} byte limit")]
    OversizedPacket { packet: usize, limit: usize },
    #[error("payload truncated: expected {expected} bytes, read {actual}")]
    TruncatedPayload { expected: usize, actual: usize },
    #[error("payload read failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Failures of the frame logger thread.
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("log file i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("logger thread panicked")]
    Panicked,
}

pub type LoggerResult<T> = Result<T, LoggerError>;

/// Failures while loading or analysing a persisted frame log.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("log i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("log is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("log contains no frames")]
    Empty,
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Decodes the payload that follows a verified frame header.
///
/// Implementations read the frame body straight from the port the header was
/// recovered from and return the assembled frame. Payload TLV interpretation
/// lives behind this seam.
pub trait FrameBodyDecoder {
    fn decode(
        &mut self,
        header: &FrameHeader,
        port: &mut dyn ByteSource,
        params: &RadarParams,
    ) -> DecodeResult<FrameData>;
}
