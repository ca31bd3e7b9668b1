//! Protocol module for constructing and parsing heater messages.
//!
//! This module contains the implementations for:
//! - Command frame encoding
//! - Status response parsing

pub mod command;
pub mod status;

pub use command::{checksum, Command, FRAME_LEN};
pub use status::{HeaterState, HeaterStatus, StatusSummary};
