//! Protocol module for the teapot's line-oriented wire format.
//!
//! - Instruction encoding and reply decoding
//! - Temperature readings extracted from replies

pub mod instruction;
pub mod telemetry;

pub use instruction::{
    decode, encode, Instruction, MotorPosition, Reply, MOTOR_KEY, TEMPERATURE_OFF, TEMP_KEY,
};
pub use telemetry::TelemetryReading;
