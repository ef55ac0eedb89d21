//! Instruction codec for the teapot serial link.
//!
//! The wire format is a flat list of key/value pairs:
//!
//! ```text
//! temp>80|motor>UP
//! ```
//!
//! Pairs are joined by `|` and each key is joined to its value by `>`.
//! Neither separator is escaped, so keys and values must not contain them.
//! That is a limitation of the kettle firmware's parser and is kept as-is.
//!
//! Decoding never fails. A part that does not split into exactly one key and
//! one value is dropped, and a missing key is reported as `None` to the caller
//! that asked for it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between pairs.
pub const PAIR_SEPARATOR: char = '|';

/// Separator between a key and its value.
pub const KEY_VALUE_SEPARATOR: char = '>';

/// Key carrying a temperature, in whole degrees Celsius.
pub const TEMP_KEY: &str = "temp";

/// Key carrying the infuser motor position.
pub const MOTOR_KEY: &str = "motor";

/// Temperature sentinel meaning "heater off" outbound and "unknown" inbound.
pub const TEMPERATURE_OFF: i32 = -1000;

/// Position of the infuser motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotorPosition {
    /// Infuser raised out of the water.
    #[default]
    Up,
    /// Infuser lowered into the water.
    Down,
}

impl MotorPosition {
    /// The token sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for MotorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotorPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            other => Err(Error::invalid_parameter(MOTOR_KEY, other)),
        }
    }
}

/// One outbound control message.
///
/// Pairs are kept in insertion order, which is the order they go on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instruction {
    pairs: Vec<(String, String)>,
}

impl Instruction {
    /// Create an empty instruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard brew instruction `temp>{target}|motor>{motor}`.
    pub fn brew(target_temperature: i32, motor: MotorPosition) -> Self {
        Self::new()
            .with(TEMP_KEY, target_temperature.to_string())
            .with(MOTOR_KEY, motor.as_str())
    }

    /// Instruction that turns the heater off and raises the infuser.
    pub fn off() -> Self {
        Self::brew(TEMPERATURE_OFF, MotorPosition::Up)
    }

    /// Append a pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// The pairs in wire order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Value of the first pair with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Encode to the wire format, without a line terminator.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                out.push(PAIR_SEPARATOR);
            }
            out.push_str(key);
            out.push(KEY_VALUE_SEPARATOR);
            out.push_str(value);
        }
        out
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pairs: Vec<(String, String)>,
}

impl Reply {
    /// Decode a frame. Malformed parts are dropped.
    pub fn decode(line: &str) -> Self {
        let pairs = line
            .split(PAIR_SEPARATOR)
            .filter_map(|part| {
                let mut pieces = part.split(KEY_VALUE_SEPARATOR);
                match (pieces.next(), pieces.next(), pieces.next()) {
                    (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                    _ => None,
                }
            })
            .collect();

        Self { pairs }
    }

    /// Value of the first pair with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` parsed as an integer, ignoring surrounding whitespace.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// The reported temperature, if present and numeric.
    pub fn temperature(&self) -> Option<i32> {
        self.get_i32(TEMP_KEY)
    }

    /// The pairs that survived decoding, in frame order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Whether no well-formed pair was found.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Encode an instruction to the wire format.
pub fn encode(instruction: &Instruction) -> String {
    instruction.encode()
}

/// Decode a frame. Never fails.
pub fn decode(line: &str) -> Reply {
    Reply::decode(line)
}
