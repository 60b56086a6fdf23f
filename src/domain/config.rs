use crate::domain::error::{BusProbeError, BusProbeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest unicast Modbus device address.
pub const MIN_UNICAST_ADDRESS: u8 = 1;
/// Highest unicast Modbus device address.
pub const MAX_UNICAST_ADDRESS: u8 = 247;
/// Highest address the scanner will ever try.
pub const MAX_SCAN_ADDRESS: u8 = 254;
/// Modbus broadcast device id.
pub const BROADCAST_ADDRESS: u8 = 0;

/// BusProbe configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusProbeConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Serial line used by probe, scan and reassign
    #[serde(default)]
    pub serial: SerialSettings,
    /// Device register map
    #[serde(default)]
    pub registers: RegisterMap,
    /// Address scan settings
    #[serde(default)]
    pub scan: ScanSettings,
    /// Baud/parity discovery settings
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Address reassignment settings
    #[serde(default)]
    pub reassign: ReassignSettings,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial line settings as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: ParityConfig,
    /// Response timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

/// Holding registers documented for the device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMap {
    /// Register holding the device's bus address
    #[serde(default = "default_address_register")]
    pub address_register: u16,
    /// First data register (channel 1)
    #[serde(default = "default_channel_register")]
    pub channel_register: u16,
}

/// Address scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_first_address")]
    pub first_address: u8,
    #[serde(default = "default_last_address")]
    pub last_address: u8,
    /// Number of registers read per probe
    #[serde(default = "default_register_count")]
    pub register_count: u16,
    /// Report progress every N addresses while nothing has been found
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u8,
}

/// Baud/parity discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Device id the discovery probes talk to
    #[serde(default = "default_discovery_unit")]
    pub unit: u8,
    /// Ports to test; empty means every port the host enumerates
    #[serde(default)]
    pub ports: Vec<String>,
    /// Line settings tried on every port, in order
    #[serde(default = "default_line_candidates")]
    pub candidates: Vec<LineSettings>,
}

/// Address reassignment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignSettings {
    #[serde(default = "default_old_address")]
    pub old_address: u8,
    #[serde(default = "default_new_address")]
    pub new_address: u8,
    /// Delay before the single connection retry
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Addresses tried when the old address stays silent
    #[serde(default = "default_recovery_candidates")]
    pub recovery_candidates: Vec<u8>,
}

/// One baud/parity permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub parity: ParityConfig,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM5".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_baud_rate() -> u32 {
    4800
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> ParityConfig {
    ParityConfig::None
}

fn default_timeout() -> u64 {
    1000
}

fn default_address_register() -> u16 {
    0x07D0
}

fn default_channel_register() -> u16 {
    0x0000
}

fn default_first_address() -> u8 {
    MIN_UNICAST_ADDRESS
}

fn default_last_address() -> u8 {
    MAX_SCAN_ADDRESS
}

fn default_register_count() -> u16 {
    1
}

fn default_progress_interval() -> u8 {
    50
}

fn default_discovery_unit() -> u8 {
    1
}

fn default_line_candidates() -> Vec<LineSettings> {
    vec![
        LineSettings::new(4800, ParityConfig::None),
        LineSettings::new(4800, ParityConfig::Even),
        LineSettings::new(9600, ParityConfig::None),
        LineSettings::new(9600, ParityConfig::Even),
    ]
}

fn default_old_address() -> u8 {
    1
}

fn default_new_address() -> u8 {
    21
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_recovery_candidates() -> Vec<u8> {
    vec![1, 2, 3, 21, 254]
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            timeout_ms: default_timeout(),
        }
    }
}

impl Default for ParityConfig {
    fn default() -> Self {
        default_parity()
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            address_register: default_address_register(),
            channel_register: default_channel_register(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            first_address: default_first_address(),
            last_address: default_last_address(),
            register_count: default_register_count(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            unit: default_discovery_unit(),
            ports: Vec::new(),
            candidates: default_line_candidates(),
        }
    }
}

impl Default for ReassignSettings {
    fn default() -> Self {
        Self {
            old_address: default_old_address(),
            new_address: default_new_address(),
            retry_delay_ms: default_retry_delay(),
            recovery_candidates: default_recovery_candidates(),
        }
    }
}

impl ParityConfig {
    /// Single-letter form used in line summaries ("4800 8N1").
    pub fn letter(&self) -> char {
        match self {
            ParityConfig::None => 'N',
            ParityConfig::Odd => 'O',
            ParityConfig::Even => 'E',
        }
    }
}

impl std::fmt::Display for ParityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParityConfig::None => write!(f, "none"),
            ParityConfig::Odd => write!(f, "odd"),
            ParityConfig::Even => write!(f, "even"),
        }
    }
}

impl LineSettings {
    pub fn new(baud_rate: u32, parity: ParityConfig) -> Self {
        Self { baud_rate, parity }
    }
}

impl std::fmt::Display for LineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} baud, {} parity", self.baud_rate, self.parity.letter())
    }
}

/// Serial connection configuration for one connection attempt.
///
/// Immutable once built; probing a different baud/parity derives a fresh
/// value with [`SerialConfig::with_line`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub stop_bits: u8,
    pub data_bits: u8,
    pub timeout: Duration,
}

impl SerialConfig {
    /// Same line on another port.
    pub fn with_port(&self, port: &str) -> Self {
        Self {
            port: port.to_string(),
            ..self.clone()
        }
    }

    /// Same port with a different baud/parity permutation.
    pub fn with_line(&self, line: LineSettings) -> Self {
        Self {
            baud_rate: line.baud_rate,
            parity: line.parity,
            ..self.clone()
        }
    }

    pub fn line(&self) -> LineSettings {
        LineSettings::new(self.baud_rate, self.parity)
    }
}

impl std::fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {} baud {}{}{}",
            self.port,
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

impl From<&SerialSettings> for SerialConfig {
    fn from(settings: &SerialSettings) -> Self {
        SerialConfig {
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            parity: settings.parity,
            stop_bits: settings.stop_bits,
            data_bits: settings.data_bits,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

impl BusProbeConfig {
    /// Runtime serial configuration built from the `[serial]` section
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig::from(&self.serial)
    }

    /// Check value ranges the file format cannot express, across every
    /// section. Commands check only the sections they use.
    pub fn validate(&self) -> BusProbeResult<()> {
        self.validate_serial()?;
        self.validate_scan()?;
        self.validate_discovery()?;
        self.validate_reassign()
    }

    pub fn validate_serial(&self) -> BusProbeResult<()> {
        check_serial(&self.serial)
    }

    pub fn validate_scan(&self) -> BusProbeResult<()> {
        let scan = &self.scan;
        if scan.first_address < MIN_UNICAST_ADDRESS || scan.last_address > MAX_SCAN_ADDRESS {
            return Err(config_error(format!(
                "scan range {}..={} must stay within {}..={}",
                scan.first_address, scan.last_address, MIN_UNICAST_ADDRESS, MAX_SCAN_ADDRESS
            )));
        }
        if scan.first_address > scan.last_address {
            return Err(config_error(format!(
                "scan range {}..={} is empty",
                scan.first_address, scan.last_address
            )));
        }
        if scan.register_count == 0 || scan.register_count > 125 {
            return Err(config_error(format!(
                "register count {} must be between 1 and 125",
                scan.register_count
            )));
        }
        if scan.progress_interval == 0 {
            return Err(config_error("progress interval must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn validate_discovery(&self) -> BusProbeResult<()> {
        if self.discovery.candidates.is_empty() {
            return Err(config_error("discovery needs at least one baud/parity candidate".to_string()));
        }
        for line in &self.discovery.candidates {
            if line.baud_rate == 0 {
                return Err(config_error("discovery baud rate must be non-zero".to_string()));
            }
        }
        validate_unicast("discovery unit", self.discovery.unit)
    }

    pub fn validate_reassign(&self) -> BusProbeResult<()> {
        let reassign = &self.reassign;
        validate_unicast("old address", reassign.old_address)?;
        validate_unicast("new address", reassign.new_address)?;
        for candidate in &reassign.recovery_candidates {
            if *candidate == BROADCAST_ADDRESS {
                return Err(config_error(
                    "recovery candidates cannot include the broadcast address".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn check_serial(serial: &SerialSettings) -> BusProbeResult<()> {
    if serial.port.trim().is_empty() {
        return Err(config_error("serial port must not be empty".to_string()));
    }
    if serial.baud_rate == 0 {
        return Err(config_error("baud rate must be non-zero".to_string()));
    }
    if !(5..=8).contains(&serial.data_bits) {
        return Err(config_error(format!("invalid data bits: {}", serial.data_bits)));
    }
    if !(1..=2).contains(&serial.stop_bits) {
        return Err(config_error(format!("invalid stop bits: {}", serial.stop_bits)));
    }
    if serial.timeout_ms == 0 {
        return Err(config_error("timeout must be at least 1 ms".to_string()));
    }
    Ok(())
}

/// Reject anything outside the unicast range 1..=247
pub fn validate_unicast(what: &str, address: u8) -> BusProbeResult<()> {
    if (MIN_UNICAST_ADDRESS..=MAX_UNICAST_ADDRESS).contains(&address) {
        Ok(())
    } else {
        Err(config_error(format!(
            "{} {} is not a unicast address ({}..={})",
            what, address, MIN_UNICAST_ADDRESS, MAX_UNICAST_ADDRESS
        )))
    }
}

fn config_error(message: String) -> BusProbeError {
    BusProbeError::Config { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = BusProbeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: BusProbeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.discovery.candidates, config.discovery.candidates);
        assert_eq!(deserialized.reassign.recovery_candidates, vec![1, 2, 3, 21, 254]);
    }

    #[test]
    fn test_defaults_match_device_manual() {
        let config = BusProbeConfig::default();
        assert_eq!(config.serial.baud_rate, 4800);
        assert_eq!(config.serial.parity, ParityConfig::None);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.registers.address_register, 0x07D0);
        assert_eq!(config.registers.channel_register, 0x0000);
        assert_eq!(config.scan.first_address, 1);
        assert_eq!(config.scan.last_address, 254);
        assert_eq!(config.reassign.new_address, 21);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let content = r#"
            [serial]
            port = "COM7"
            baud_rate = 9600
            parity = "even"

            [registers]
            address_register = 0x07D0

            [[discovery.candidates]]
            baud_rate = 19200
            parity = "odd"
        "#;

        let config: BusProbeConfig = toml::from_str(content).unwrap();
        assert_eq!(config.serial.port, "COM7");
        assert_eq!(config.serial.parity, ParityConfig::Even);
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.registers.address_register, 2000);
        assert_eq!(config.discovery.candidates, vec![LineSettings::new(19200, ParityConfig::Odd)]);
        assert_eq!(config.global.log_level, "info");
    }

    #[test]
    fn test_serial_config_derivation() {
        let settings = SerialSettings {
            port: "/dev/ttyUSB1".to_string(),
            ..SerialSettings::default()
        };
        let config = SerialConfig::from(&settings);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.to_string(), "/dev/ttyUSB1 @ 4800 baud 8N1");

        let even = config.with_line(LineSettings::new(9600, ParityConfig::Even));
        assert_eq!(even.port, "/dev/ttyUSB1");
        assert_eq!(even.line(), LineSettings::new(9600, ParityConfig::Even));
        assert_eq!(config.baud_rate, 4800);

        let moved = config.with_port("/dev/ttyS0");
        assert_eq!(moved.port, "/dev/ttyS0");
        assert_eq!(moved.baud_rate, 4800);
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut config = BusProbeConfig::default();
        config.scan.first_address = 0;
        assert!(config.validate().is_err());

        let mut config = BusProbeConfig::default();
        config.scan.last_address = 255;
        assert!(config.validate().is_err());

        let mut config = BusProbeConfig::default();
        config.reassign.new_address = 0;
        assert!(config.validate().is_err());

        let mut config = BusProbeConfig::default();
        config.reassign.old_address = 248;
        assert!(config.validate().is_err());

        let mut config = BusProbeConfig::default();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());

        let mut config = BusProbeConfig::default();
        config.discovery.candidates.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sections_validate_independently() {
        let mut config = BusProbeConfig::default();
        config.reassign.new_address = 0;
        config.discovery.candidates.clear();

        assert!(config.validate_serial().is_ok());
        assert!(config.validate_scan().is_ok());
        assert!(config.validate_discovery().is_err());
        assert!(config.validate_reassign().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_line_display() {
        let line = LineSettings::new(4800, ParityConfig::Even);
        assert_eq!(line.to_string(), "4800 baud, E parity");
    }
}
