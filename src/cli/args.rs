use crate::domain::config::{BusProbeConfig, LineSettings, ParityConfig};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for BusProbe
#[derive(Parser, Debug)]
#[command(
    name = "busprobe",
    version = env!("CARGO_PKG_VERSION"),
    about = "RS485 Modbus RTU diagnostic tool",
    long_about = "Diagnostic tool for RS485 Modbus RTU devices: scan bus addresses, detect baud rate and parity, and reassign a device's bus address."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports known to the host
    Ports,
    /// Read holding registers from one device address
    Probe(ProbeArgs),
    /// Scan bus addresses for responding devices
    Scan(ScanArgs),
    /// Try baud rate and parity combinations on each port
    Discover(DiscoverArgs),
    /// Change a device's bus address
    Reassign(ReassignArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
    /// CSV output
    Csv,
}

/// Serial line overrides shared by every command that opens a port
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct SerialArgs {
    /// Serial port path
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits
    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Parity (none, even, odd)
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Response timeout in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Single probe arguments
#[derive(ClapArgs, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// Device address (1-247)
    #[arg(short, long, default_value = "1")]
    pub unit: u8,

    /// First register to read (decimal or 0x-prefixed hex)
    #[arg(short, long, default_value = "0", value_parser = parse_register)]
    pub register: u16,

    /// Number of registers to read
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u16,
}

/// Address scan arguments
#[derive(ClapArgs, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// First address to scan
    #[arg(long)]
    pub first: Option<u8>,

    /// Last address to scan
    #[arg(long)]
    pub last: Option<u8>,

    /// Register read at each address (decimal or 0x-prefixed hex)
    #[arg(short, long, value_parser = parse_register)]
    pub register: Option<u16>,
}

/// Baud/parity discovery arguments
#[derive(ClapArgs, Debug)]
pub struct DiscoverArgs {
    /// Ports to test (repeatable); defaults to every enumerated port
    #[arg(short, long = "port")]
    pub ports: Vec<String>,

    /// Device address to talk to
    #[arg(short, long)]
    pub unit: Option<u8>,

    /// Candidate lines as BAUD:PARITY, e.g. 4800:N (repeatable)
    #[arg(short, long = "line", value_parser = parse_line)]
    pub lines: Vec<LineSettings>,

    /// Response timeout in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Address reassignment arguments
#[derive(ClapArgs, Debug)]
pub struct ReassignArgs {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// Address the device currently answers on
    #[arg(long)]
    pub old: Option<u8>,

    /// Address to assign
    #[arg(long)]
    pub new: Option<u8>,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate {
        /// Configuration file path
        file: Option<String>,
    },
    /// Create default configuration
    Init {
        /// Directory to create `.busprobe/config.toml` in
        #[arg(long)]
        dir: Option<String>,
        /// Global configuration
        #[arg(short, long)]
        global: bool,
    },
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl SerialArgs {
    /// Overlay the flags that were given onto the loaded configuration
    pub fn apply(&self, config: &mut BusProbeConfig) {
        let serial = &mut config.serial;
        if let Some(port) = &self.port {
            serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            serial.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            serial.data_bits = data_bits;
        }
        if let Some(stop_bits) = self.stop_bits {
            serial.stop_bits = stop_bits;
        }
        if let Some(parity) = self.parity {
            serial.parity = parity.into();
        }
        if let Some(timeout) = self.timeout {
            serial.timeout_ms = timeout;
        }
    }
}

impl ScanArgs {
    pub fn apply(&self, config: &mut BusProbeConfig) {
        self.serial.apply(config);
        if let Some(first) = self.first {
            config.scan.first_address = first;
        }
        if let Some(last) = self.last {
            config.scan.last_address = last;
        }
    }
}

impl DiscoverArgs {
    pub fn apply(&self, config: &mut BusProbeConfig) {
        if !self.ports.is_empty() {
            config.discovery.ports = self.ports.clone();
        }
        if let Some(unit) = self.unit {
            config.discovery.unit = unit;
        }
        if !self.lines.is_empty() {
            config.discovery.candidates = self.lines.clone();
        }
        if let Some(timeout) = self.timeout {
            config.serial.timeout_ms = timeout;
        }
    }
}

impl ReassignArgs {
    pub fn apply(&self, config: &mut BusProbeConfig) {
        self.serial.apply(config);
        if let Some(old) = self.old {
            config.reassign.old_address = old;
        }
        if let Some(new) = self.new {
            config.reassign.new_address = new;
        }
    }
}

/// Parse a register offset given as decimal or 0x-prefixed hex
pub fn parse_register(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid register '{}': {}", s, e))
}

/// Parse a discovery candidate written as BAUD:PARITY (N, E or O)
pub fn parse_line(s: &str) -> Result<LineSettings, String> {
    let (baud, parity) = s
        .split_once(':')
        .ok_or_else(|| format!("expected BAUD:PARITY, got '{}'", s))?;

    let baud_rate = baud
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid baud rate '{}': {}", baud, e))?;
    let parity = match parity.trim().to_ascii_uppercase().as_str() {
        "N" | "NONE" => ParityConfig::None,
        "E" | "EVEN" => ParityConfig::Even,
        "O" | "ODD" => ParityConfig::Odd,
        other => return Err(format!("invalid parity '{}'", other)),
    };

    Ok(LineSettings::new(baud_rate, parity))
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
