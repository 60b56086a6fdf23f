use crate::cli::args::OutputFormat;
use crate::core::discovery::{DiscoveryEvent, DiscoveryReport};
use crate::core::reassign::{ReassignEvent, ReassignOutcome};
use crate::core::scan::ScanEvent;
use crate::domain::config::BusProbeConfig;
use crate::domain::probe::{ProbeOutcome, ProbeResult, ScanReport};
use crate::infrastructure::serial::PortInfo;
use serde_json;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats.
///
/// Progress events, banners and hints only render as text; the structured
/// formats print the final report alone so stdout stays machine-readable.
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError>;
    fn write_probe(&self, line: &str, register: u16, result: &ProbeResult) -> Result<(), OutputError>;
    fn write_scan_event(&self, event: &ScanEvent) -> Result<(), OutputError>;
    fn write_scan_report(&self, report: &ScanReport) -> Result<(), OutputError>;
    fn write_discovery_event(&self, event: &DiscoveryEvent) -> Result<(), OutputError>;
    fn write_discovery_report(&self, report: &DiscoveryReport) -> Result<(), OutputError>;
    fn write_reassign_event(&self, event: &ReassignEvent) -> Result<(), OutputError>;
    fn write_reassign_outcome(&self, outcome: &ReassignOutcome) -> Result<(), OutputError>;
    fn write_config(&self, config: &BusProbeConfig) -> Result<(), OutputError>;
    fn write_banner(&self, banner: &str) -> Result<(), OutputError>;
    fn write_hints(&self, hints: &[&str]) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration rendering error: {0}")]
    TomlError(#[from] toml::ser::Error),
}

impl From<OutputError> for crate::domain::error::BusProbeError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn is_text(&self) -> bool {
        self.format == OutputFormat::Text
    }
}

const RULE: &str = "==================================================";

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    println!("No serial ports found");
                }
                for port in ports {
                    println!("  {} - {}", port.name, port.description);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(ports)?);
            }
            OutputFormat::Table => {
                if !ports.is_empty() {
                    let rows: Vec<PortRow> = ports.iter().map(PortRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Csv => {
                println!("name,description");
                for port in ports {
                    println!("{},{}", port.name, csv_field(&port.description));
                }
            }
        }
        Ok(())
    }

    fn write_probe(&self, line: &str, register: u16, result: &ProbeResult) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("Address {} on {} (register 0x{:04X}):", result.address, line, register);
                match &result.outcome {
                    ProbeOutcome::Found(values) => println!("  Device responded: {:?}", values),
                    other => println!("  {}", other),
                }
            }
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "line": line,
                    "register": register,
                    "result": result,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new(vec![ProbeRow::from(result)]));
            }
            OutputFormat::Csv => {
                println!("address,outcome,detail");
                println!("{}", probe_csv_row(result));
            }
        }
        Ok(())
    }

    fn write_scan_event(&self, event: &ScanEvent) -> Result<(), OutputError> {
        if !self.is_text() {
            return Ok(());
        }
        match event {
            ScanEvent::Found { address, register, values } => {
                let value = values.first().copied().unwrap_or_default();
                println!(
                    "Found device at address {} - Register {}: {}",
                    address, register, value
                );
            }
            ScanEvent::Progress { address } => {
                println!("   Scanned up to address {}...", address);
            }
        }
        Ok(())
    }

    fn write_scan_report(&self, report: &ScanReport) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!();
                println!("{}", RULE);
                if report.found_count() > 0 {
                    println!("Found {} device(s):", report.found_count());
                    for result in report.found() {
                        let value = result.outcome.first_value().unwrap_or_default();
                        println!("  - Address {}: Value = {}", result.address, value);
                    }
                } else {
                    println!("No devices found");
                }
                println!(
                    "Probed {} address(es): {} silent, {} error(s)",
                    report.attempted(),
                    report.silent_count(),
                    report.error_count()
                );
                println!("{}", RULE);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            OutputFormat::Table => {
                let rows: Vec<ProbeRow> = report.found().map(ProbeRow::from).collect();
                if !rows.is_empty() {
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Csv => {
                println!("address,outcome,detail");
                for result in &report.results {
                    println!("{}", probe_csv_row(result));
                }
            }
        }
        Ok(())
    }

    fn write_discovery_event(&self, event: &DiscoveryEvent) -> Result<(), OutputError> {
        if !self.is_text() {
            return Ok(());
        }
        match event {
            DiscoveryEvent::PortStarted { port } => {
                println!();
                println!("Testing {}", port);
                println!("{}", "-".repeat(RULE.len()));
            }
            DiscoveryEvent::Trying { line, .. } => {
                println!("  Trying {}...", line);
            }
            DiscoveryEvent::Finished { outcome, .. } => {
                println!("    {}", outcome);
            }
        }
        Ok(())
    }

    fn write_discovery_report(&self, report: &DiscoveryReport) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                let hits = report.hits();
                println!();
                println!("{}", RULE);
                if hits.is_empty() {
                    println!("No device answered at unit {} on any port", report.unit);
                } else {
                    println!("Device {} answered on:", report.unit);
                    for (port, result) in hits {
                        println!("  {} @ {}: {}", port, result.line, result.outcome);
                    }
                }
                println!("{}", RULE);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            OutputFormat::Table => {
                let rows: Vec<DiscoveryRow> = report
                    .ports
                    .iter()
                    .flat_map(|p| {
                        p.results.iter().map(move |r| DiscoveryRow {
                            port: p.port.clone(),
                            baud: r.line.baud_rate,
                            parity: r.line.parity.letter().to_string(),
                            result: r.outcome.to_string(),
                        })
                    })
                    .collect();
                if !rows.is_empty() {
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Csv => {
                println!("port,baud,parity,result");
                for port in &report.ports {
                    for result in &port.results {
                        println!(
                            "{},{},{},{}",
                            port.port,
                            result.line.baud_rate,
                            result.line.parity.letter(),
                            csv_field(&result.outcome.to_string())
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn write_reassign_event(&self, event: &ReassignEvent) -> Result<(), OutputError> {
        if !self.is_text() {
            return Ok(());
        }
        match event {
            ReassignEvent::ConnectRetry { reason, delay } => {
                println!("Connection failed ({}), retrying in {}s...", reason, delay.as_secs_f32());
            }
            ReassignEvent::Connected { line } => {
                println!("Connected: {}", line);
            }
            ReassignEvent::OldAddressVerified { values, .. } => {
                println!("Device responded: {:?}", values);
            }
            ReassignEvent::OldAddressSilent { address, reason } => {
                println!("No response from device at address {} ({})", address, reason);
            }
            ReassignEvent::RecoveryProbe(result) => match &result.outcome {
                ProbeOutcome::Found(_) => println!("   Found device at address {}!", result.address),
                other => println!("   Address {}: {}", result.address, other),
            },
            ReassignEvent::WriteAcknowledged { .. } => {
                println!("Write acknowledged");
            }
            ReassignEvent::BroadcastSent { reason, .. } => {
                println!("Write not acknowledged ({})", reason);
                println!("Broadcast sent to id 0 (unverified)");
            }
        }
        Ok(())
    }

    fn write_reassign_outcome(&self, outcome: &ReassignOutcome) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => match outcome {
                ReassignOutcome::ConnectivityError { reason } => {
                    println!("Cannot connect: {}", reason);
                }
                ReassignOutcome::RecoveryRequired { found, .. } => {
                    if found.is_empty() {
                        println!("No device found on the recovery addresses");
                    } else {
                        let addresses: Vec<String> =
                            found.iter().map(|r| r.address.to_string()).collect();
                        println!("Device(s) answering at: {}", addresses.join(", "));
                    }
                    println!("Nothing was written. Fix the old address and run again.");
                }
                ReassignOutcome::Rejected { address, reason } => {
                    println!("Device at address {} rejected the read ({})", address, reason);
                    println!("Nothing was written. Check the register map and run again.");
                }
                ReassignOutcome::Confirmed { write, values } => {
                    println!("New address confirmed: {:?} ({})", values, write);
                }
                ReassignOutcome::Unconfirmed { write, reason } => {
                    println!("No response on new address ({})", reason);
                    println!("Address change may have failed ({})", write);
                }
            },
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(outcome)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new(vec![ReassignRow::from(outcome)]));
            }
            OutputFormat::Csv => {
                let row = ReassignRow::from(outcome);
                println!("conclusion,write,detail");
                println!("{},{},{}", row.conclusion, row.write, csv_field(&row.detail));
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &BusProbeConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            _ => {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        Ok(())
    }

    fn write_banner(&self, banner: &str) -> Result<(), OutputError> {
        if self.is_text() {
            println!("{}", banner);
        }
        Ok(())
    }

    fn write_hints(&self, hints: &[&str]) -> Result<(), OutputError> {
        if !self.is_text() {
            return Ok(());
        }
        println!();
        println!("Possible causes:");
        for (i, hint) in hints.iter().enumerate() {
            println!("  {}. {}", i + 1, hint);
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// Table row for an enumerated port
#[derive(Tabled)]
struct PortRow {
    port: String,
    description: String,
}

impl From<&PortInfo> for PortRow {
    fn from(port: &PortInfo) -> Self {
        Self {
            port: port.name.clone(),
            description: port.description.clone(),
        }
    }
}

/// Table row for a probe result
#[derive(Tabled)]
struct ProbeRow {
    address: u8,
    outcome: String,
    values: String,
}

impl From<&ProbeResult> for ProbeRow {
    fn from(result: &ProbeResult) -> Self {
        let (outcome, values) = outcome_columns(&result.outcome);
        Self {
            address: result.address,
            outcome: outcome.to_string(),
            values,
        }
    }
}

/// Table row for one (port, line) discovery attempt
#[derive(Tabled)]
struct DiscoveryRow {
    port: String,
    baud: u32,
    parity: String,
    result: String,
}

/// Table row for the reassignment conclusion
#[derive(Tabled)]
struct ReassignRow {
    conclusion: String,
    write: String,
    detail: String,
}

impl From<&ReassignOutcome> for ReassignRow {
    fn from(outcome: &ReassignOutcome) -> Self {
        match outcome {
            ReassignOutcome::ConnectivityError { reason } => Self {
                conclusion: "connectivity_error".to_string(),
                write: "-".to_string(),
                detail: reason.clone(),
            },
            ReassignOutcome::RecoveryRequired { found, .. } => Self {
                conclusion: "recovery_required".to_string(),
                write: "-".to_string(),
                detail: found
                    .iter()
                    .map(|r| r.address.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            },
            ReassignOutcome::Rejected { address, reason } => Self {
                conclusion: "rejected".to_string(),
                write: "-".to_string(),
                detail: format!("address {}: {}", address, reason),
            },
            ReassignOutcome::Confirmed { write, values } => Self {
                conclusion: "confirmed".to_string(),
                write: write.to_string(),
                detail: format!("{:?}", values),
            },
            ReassignOutcome::Unconfirmed { write, reason } => Self {
                conclusion: "unconfirmed".to_string(),
                write: write.to_string(),
                detail: reason.clone(),
            },
        }
    }
}

fn outcome_columns(outcome: &ProbeOutcome) -> (&'static str, String) {
    match outcome {
        ProbeOutcome::Found(values) => (
            "found",
            values.iter().map(u16::to_string).collect::<Vec<_>>().join(" "),
        ),
        ProbeOutcome::ConnectFailed(reason) => ("connect_failed", reason.clone()),
        ProbeOutcome::NoResponse => ("no_response", String::new()),
        ProbeOutcome::ProtocolError(message) => ("protocol_error", message.clone()),
    }
}

fn probe_csv_row(result: &ProbeResult) -> String {
    let (outcome, detail) = outcome_columns(&result.outcome);
    format!("{},{},{}", result.address, outcome, csv_field(&detail))
}

/// Quote a CSV field when it contains a separator or quote
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_writer_creation() {
        let writer = ConsoleWriter::new(OutputFormat::Json);
        assert_eq!(writer.format(), OutputFormat::Json);
        assert!(!writer.is_text());
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("no response"), "no response");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_probe_csv_row() {
        let found = ProbeResult::new(21, ProbeOutcome::Found(vec![1, 2]));
        assert_eq!(probe_csv_row(&found), "21,found,1 2");

        let silent = ProbeResult::new(3, ProbeOutcome::NoResponse);
        assert_eq!(probe_csv_row(&silent), "3,no_response,");
    }

    #[test]
    fn test_reassign_row_keeps_broadcast_wording() {
        let outcome = ReassignOutcome::Confirmed {
            write: crate::core::reassign::WriteOutcome::BroadcastSent {
                reason: "no response within timeout".to_string(),
            },
            values: vec![0],
        };
        let row = ReassignRow::from(&outcome);
        assert_eq!(row.conclusion, "confirmed");
        assert_eq!(row.write, "broadcast sent (unverified)");
    }

    #[test]
    fn test_writers_accept_every_format() {
        let report = ScanReport::new("COM5 @ 4800 baud 8N1".to_string(), 0);
        for format in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Table, OutputFormat::Csv] {
            let writer = ConsoleWriter::new(format);
            assert!(writer.write_scan_report(&report).is_ok());
            assert!(writer.write_config(&BusProbeConfig::default()).is_ok());
            assert!(writer.write_ports(&[]).is_ok());
        }
    }
}
