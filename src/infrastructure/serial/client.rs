use crate::core::transport::{Link, Transport};
use crate::domain::config::{ParityConfig, SerialConfig};
use crate::domain::error::LinkError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::{rtu, Client, Context, Reader, Writer};
use tokio_modbus::slave::{Slave, SlaveContext};
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

/// Modbus RTU over a local serial port
#[derive(Debug, Default, Clone, Copy)]
pub struct RtuTransport;

impl RtuTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Translate a serial configuration into a port builder
pub fn port_builder(config: &SerialConfig) -> Result<tokio_serial::SerialPortBuilder, LinkError> {
    let mut builder = tokio_serial::new(&config.port, config.baud_rate);

    builder = builder.data_bits(match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        8 => tokio_serial::DataBits::Eight,
        other => {
            return Err(LinkError::Unavailable(format!("Invalid data bits: {}", other)))
        }
    });

    builder = builder.stop_bits(match config.stop_bits {
        1 => tokio_serial::StopBits::One,
        2 => tokio_serial::StopBits::Two,
        other => {
            return Err(LinkError::Unavailable(format!("Invalid stop bits: {}", other)))
        }
    });

    builder = builder.parity(match config.parity {
        ParityConfig::None => tokio_serial::Parity::None,
        ParityConfig::Even => tokio_serial::Parity::Even,
        ParityConfig::Odd => tokio_serial::Parity::Odd,
    });

    builder = builder
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(config.timeout);

    Ok(builder)
}

#[async_trait]
impl Transport for RtuTransport {
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn Link>, LinkError> {
        let builder = port_builder(config)?;
        let port = SerialStream::open(&builder)
            .map_err(|e| LinkError::Unavailable(e.to_string()))?;

        info!("Serial port {} opened", config);

        Ok(Box::new(RtuLink {
            ctx: rtu::attach(port),
            port: config.port.clone(),
            timeout: config.timeout,
        }))
    }
}

/// An open RTU link; requests are addressed per call
pub struct RtuLink {
    ctx: Context,
    port: String,
    timeout: Duration,
}

#[async_trait]
impl Link for RtuLink {
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        self.ctx.set_slave(Slave(unit));
        debug!("FC03 -> unit {} register 0x{:04X} count {}", unit, register, count);

        match timeout(self.timeout, self.ctx.read_holding_registers(register, count)).await {
            Err(_) => Err(LinkError::Timeout),
            Ok(Err(e)) => Err(map_modbus_error(e)),
            Ok(Ok(Err(code))) => Err(LinkError::Exception(format!("{:?}", code))),
            Ok(Ok(Ok(values))) => Ok(values),
        }
    }

    async fn write_single_register(
        &mut self,
        unit: u8,
        register: u16,
        value: u16,
    ) -> Result<(), LinkError> {
        self.ctx.set_slave(Slave(unit));
        debug!("FC06 -> unit {} register 0x{:04X} value {}", unit, register, value);

        match timeout(self.timeout, self.ctx.write_single_register(register, value)).await {
            Err(_) => Err(LinkError::Timeout),
            Ok(Err(e)) => Err(map_modbus_error(e)),
            Ok(Ok(Err(code))) => Err(LinkError::Exception(format!("{:?}", code))),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ctx.disconnect().await {
            warn!("Closing {} reported: {}", self.port, e);
        }
        info!("Serial port {} closed", self.port);
    }
}

fn map_modbus_error(err: tokio_modbus::Error) -> LinkError {
    match err {
        tokio_modbus::Error::Transport(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            LinkError::Timeout
        }
        tokio_modbus::Error::Transport(e) => LinkError::Io(e.to_string()),
        #[allow(unreachable_patterns)]
        other => LinkError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::probe::ProbeOutcome;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn create_test_config() -> SerialConfig {
        SerialConfig {
            port: "/dev/null".to_string(),
            baud_rate: 4800,
            parity: ParityConfig::None,
            stop_bits: 1,
            data_bits: 8,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_builder_rejects_invalid_framing() {
        let mut config = create_test_config();
        config.data_bits = 9;
        assert!(matches!(port_builder(&config), Err(LinkError::Unavailable(_))));

        let mut config = create_test_config();
        config.stop_bits = 0;
        assert!(matches!(port_builder(&config), Err(LinkError::Unavailable(_))));
    }

    #[test]
    fn test_builder_accepts_device_defaults() {
        assert!(port_builder(&create_test_config()).is_ok());
    }

    #[tokio::test]
    async fn test_open_fails_gracefully() {
        let mut config = create_test_config();
        config.port = "/dev/busprobe-does-not-exist".to_string();

        // No such device file
        let result = RtuTransport::new().open(&config).await;
        assert!(matches!(result, Err(LinkError::Unavailable(_))));
    }

    #[test]
    fn test_timeout_error_maps_to_silence() {
        let err = tokio_modbus::Error::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out",
        ));
        assert_eq!(map_modbus_error(err), LinkError::Timeout);

        let err = tokio_modbus::Error::Transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        assert!(matches!(map_modbus_error(err), LinkError::Io(_)));
    }

    fn crc16(bytes: &[u8]) -> u16 {
        let mut crc = 0xFFFFu16;
        for byte in bytes {
            crc ^= u16::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            }
        }
        crc
    }

    /// Append the RTU checksum, low byte first
    fn frame(body: &[u8]) -> Vec<u8> {
        let crc = crc16(body);
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    /// An RTU link whose far end is `device`
    fn link_pair(timeout: Duration) -> (RtuLink, DuplexStream) {
        let (host, device) = duplex(256);
        let link = RtuLink {
            ctx: rtu::attach(host),
            port: "duplex".to_string(),
            timeout,
        };
        (link, device)
    }

    /// Device side: take one 8-byte request, send back `reply(request)`
    async fn respond<F>(mut device: DuplexStream, reply: F) -> (Vec<u8>, DuplexStream)
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        let mut request = [0u8; 8];
        device.read_exact(&mut request).await.unwrap();
        device.write_all(&reply(&request)).await.unwrap();
        (request.to_vec(), device)
    }

    #[tokio::test]
    async fn test_register_values_are_found() {
        let (mut link, device) = link_pair(Duration::from_secs(1));
        let device = tokio::spawn(respond(device, |_| frame(&[0x01, 0x03, 0x02, 0x00, 0x15])));

        let result = link.read_holding_registers(1, 0x0000, 1).await;
        let (request, _device) = device.await.unwrap();

        assert_eq!(request, frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(result, Ok(vec![21]));
        assert_eq!(ProbeOutcome::from_read(result), ProbeOutcome::Found(vec![21]));
    }

    #[tokio::test]
    async fn test_exception_response_is_a_protocol_error() {
        let (mut link, device) = link_pair(Duration::from_secs(1));
        let device = tokio::spawn(respond(device, |_| frame(&[0x01, 0x83, 0x02])));

        let result = link.read_holding_registers(1, 0x07D0, 1).await;
        let _device = device.await.unwrap();

        assert_eq!(result, Err(LinkError::Exception("IllegalDataAddress".to_string())));
        assert!(matches!(
            ProbeOutcome::from_read(result),
            ProbeOutcome::ProtocolError(message) if message.contains("IllegalDataAddress")
        ));
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (mut link, _device) = link_pair(Duration::from_millis(50));

        let result = link.read_holding_registers(7, 0x0000, 1).await;

        assert_eq!(result, Err(LinkError::Timeout));
        assert_eq!(ProbeOutcome::from_read(result), ProbeOutcome::NoResponse);
    }

    #[tokio::test]
    async fn test_write_is_acknowledged_by_echo() {
        let (mut link, device) = link_pair(Duration::from_secs(1));
        let device = tokio::spawn(respond(device, |request| request.to_vec()));

        let result = link.write_single_register(1, 0x07D0, 21).await;
        let (request, _device) = device.await.unwrap();

        assert_eq!(request, frame(&[0x01, 0x06, 0x07, 0xD0, 0x00, 0x15]));
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_unanswered_write_times_out() {
        let (mut link, _device) = link_pair(Duration::from_millis(50));
        assert_eq!(
            link.write_single_register(1, 0x07D0, 21).await,
            Err(LinkError::Timeout)
        );
    }
}
