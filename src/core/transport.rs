use crate::domain::{config::SerialConfig, error::LinkError};
use async_trait::async_trait;

/// Opens Modbus links on a serial line.
///
/// Every open produces an exclusive handle; callers close it before opening
/// the next one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the port described by `config` and return a link bound to it
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn Link>, LinkError>;
}

/// An open Modbus RTU link.
///
/// Requests carry the target device id; the link itself is not bound to one
/// device. Each request waits at most for the timeout the link was opened with.
#[async_trait]
pub trait Link: Send {
    /// Read holding registers (function code 0x03)
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError>;

    /// Write a single register (function code 0x06)
    async fn write_single_register(
        &mut self,
        unit: u8,
        register: u16,
        value: u16,
    ) -> Result<(), LinkError>;

    /// Release the port
    async fn close(&mut self);
}
