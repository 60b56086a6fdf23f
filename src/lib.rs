//! BusProbe Library
//!
//! Diagnostics for RS485 Modbus RTU devices: address scanning, baud/parity
//! discovery and bus address reassignment.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::domain::error::{BusProbeError, BusProbeResult, LinkError};
pub use crate::domain::config::{BusProbeConfig, LineSettings, ParityConfig, SerialConfig};
pub use crate::domain::probe::{ProbeOutcome, ProbeResult, ScanReport};
pub use crate::core::prober::DeviceProber;
pub use crate::core::transport::{Link, Transport};
