use crate::prelude::{ConfigError, ConfigResult};
use log::info;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// One line of the sensor command list: a command name and its positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfigCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl RawConfigCommand {
    /// Splits a trimmed command line on whitespace. Returns `None` for blank
    /// lines and `%` comments.
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            return None;
        }
        let mut tokens = trimmed.split_whitespace();
        let name = tokens.next()?.to_string();
        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Text sent to the sensor, without the line terminator.
    pub fn to_line(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.args.join(" "))
        }
    }

    /// Argument at a protocol position. Position 0 is the command name, so
    /// the first argument is position 1.
    pub fn arg(&self, position: usize) -> ConfigResult<&str> {
        position
            .checked_sub(1)
            .and_then(|idx| self.args.get(idx))
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingArgument {
                command: self.name.clone(),
                index: position,
            })
    }

    pub fn parse_arg<T: FromStr>(&self, position: usize) -> ConfigResult<T> {
        let raw = self.arg(position)?;
        raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
            command: self.name.clone(),
            index: position,
            value: raw.to_string(),
        })
    }

    /// Parses every argument as a float.
    pub fn float_args(&self) -> ConfigResult<Vec<f64>> {
        (1..=self.args.len()).map(|pos| self.parse_arg(pos)).collect()
    }
}

pub fn parse_config_text(text: &str) -> Vec<RawConfigCommand> {
    text.lines().filter_map(RawConfigCommand::parse_line).collect()
}

pub fn read_config_file<P: AsRef<Path>>(path: P) -> ConfigResult<Vec<RawConfigCommand>> {
    let path_ref = path.as_ref();
    info!("Opening configuration file {}", path_ref.display());
    let contents = fs::read_to_string(path_ref).map_err(|err| ConfigError::Io {
        path: path_ref.display().to_string(),
        reason: err.to_string(),
    })?;
    Ok(parse_config_text(&contents))
}
