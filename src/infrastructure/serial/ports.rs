use crate::domain::error::BusProbeResult;
use serde::Serialize;
use serialport::{available_ports, SerialPortType};
use tracing::info;

/// A serial port reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM5)
    pub name: String,
    /// Human-readable description
    pub description: String,
}

impl PortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let description = match port_type {
            SerialPortType::UsbPort(usb) => {
                let label = usb
                    .product
                    .clone()
                    .or_else(|| usb.manufacturer.clone())
                    .unwrap_or_else(|| "USB serial".to_string());
                format!("{} ({:04x}:{:04x})", label, usb.vid, usb.pid)
            }
            SerialPortType::PciPort => "PCI serial port".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
            SerialPortType::Unknown => "n/a".to_string(),
        };
        Self { name, description }
    }
}

/// Enumerate the serial ports the host knows about
pub fn list_ports() -> BusProbeResult<Vec<PortInfo>> {
    let ports: Vec<PortInfo> = available_ports()?
        .into_iter()
        .map(|p| PortInfo::from_serialport(p.port_name, &p.port_type))
        .collect();

    info!("Found {} serial port(s)", ports.len());
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_description() {
        let info = PortInfo::from_serialport("/dev/ttyS0".to_string(), &SerialPortType::Unknown);
        assert_eq!(info.name, "/dev/ttyS0");
        assert_eq!(info.description, "n/a");

        let pci = PortInfo::from_serialport("/dev/ttyS1".to_string(), &SerialPortType::PciPort);
        assert_eq!(pci.description, "PCI serial port");
    }
}
