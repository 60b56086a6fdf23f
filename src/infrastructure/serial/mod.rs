// Serial module - Modbus RTU transport and port enumeration
pub mod client;
pub mod ports;

pub use client::{RtuLink, RtuTransport};
pub use ports::{list_ports, PortInfo};
