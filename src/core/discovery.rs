//! Baud/parity discovery
//!
//! Tries every candidate line on every port. Per (port, line) the
//! address-configuration register is read first; when that yields nothing
//! usable the channel-1 register is read as a fallback sign of life.

use crate::core::prober::DeviceProber;
use crate::domain::config::{BusProbeConfig, LineSettings, SerialConfig};
use crate::domain::probe::ProbeOutcome;
use serde::Serialize;
use tracing::{debug, info};

/// Terminal state of one (port, line) attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    /// The address-configuration register answered with the device address
    AddressRegister(u16),
    /// Only the channel register answered
    ChannelRegister(u16),
    /// Port opened, nothing answered
    Silent,
    /// The link reported errors on both reads
    ProtocolError(String),
    /// The port could not be opened
    PortUnavailable(String),
}

impl DiscoveryOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(
            self,
            DiscoveryOutcome::AddressRegister(_) | DiscoveryOutcome::ChannelRegister(_)
        )
    }
}

impl std::fmt::Display for DiscoveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryOutcome::AddressRegister(value) => {
                write!(f, "FOUND! Device address: {}", value)
            }
            DiscoveryOutcome::ChannelRegister(value) => {
                write!(f, "FOUND! Channel 1 value: {}", value)
            }
            DiscoveryOutcome::Silent => write!(f, "Connected but no response"),
            DiscoveryOutcome::ProtocolError(message) => write!(f, "Error: {}", message),
            DiscoveryOutcome::PortUnavailable(_) => write!(f, "Cannot open port"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineResult {
    pub line: LineSettings,
    pub outcome: DiscoveryOutcome,
}

/// Results for one port, in candidate order
#[derive(Debug, Clone, Serialize)]
pub struct PortReport {
    pub port: String,
    pub results: Vec<LineResult>,
}

/// Results for every port, in enumeration order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub unit: u8,
    pub ports: Vec<PortReport>,
}

impl DiscoveryReport {
    /// Look up the outcome of one (port, line) attempt
    pub fn get(&self, port: &str, line: LineSettings) -> Option<&DiscoveryOutcome> {
        self.ports
            .iter()
            .find(|p| p.port == port)?
            .results
            .iter()
            .find(|r| r.line == line)
            .map(|r| &r.outcome)
    }

    /// Every (port, line) where something answered
    pub fn hits(&self) -> Vec<(&str, &LineResult)> {
        self.ports
            .iter()
            .flat_map(|p| p.results.iter().map(move |r| (p.port.as_str(), r)))
            .filter(|(_, r)| r.outcome.is_hit())
            .collect()
    }
}

/// Notifications emitted while discovery runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    PortStarted { port: String },
    Trying { port: String, line: LineSettings },
    Finished { port: String, line: LineSettings, outcome: DiscoveryOutcome },
}

/// Which device and registers discovery talks to
#[derive(Debug, Clone)]
pub struct DiscoveryPlan {
    pub unit: u8,
    pub address_register: u16,
    pub channel_register: u16,
    pub candidates: Vec<LineSettings>,
}

impl DiscoveryPlan {
    pub fn from_config(config: &BusProbeConfig) -> Self {
        Self {
            unit: config.discovery.unit,
            address_register: config.registers.address_register,
            channel_register: config.registers.channel_register,
            candidates: config.discovery.candidates.clone(),
        }
    }
}

/// Try every candidate line on every port.
///
/// `base` supplies stop bits, byte size and timeout; port, baud and parity
/// are replaced per attempt, so each attempt reopens the port.
pub async fn discover(
    prober: &DeviceProber,
    base: &SerialConfig,
    ports: &[String],
    plan: &DiscoveryPlan,
    observer: &mut dyn FnMut(DiscoveryEvent),
) -> DiscoveryReport {
    let mut report = DiscoveryReport {
        unit: plan.unit,
        ports: Vec::with_capacity(ports.len()),
    };

    for port in ports {
        observer(DiscoveryEvent::PortStarted { port: port.clone() });
        let mut port_report = PortReport {
            port: port.clone(),
            results: Vec::with_capacity(plan.candidates.len()),
        };

        for line in &plan.candidates {
            observer(DiscoveryEvent::Trying {
                port: port.clone(),
                line: *line,
            });

            let config = base.with_port(port).with_line(*line);
            let outcome = try_line(prober, &config, plan).await;
            debug!("{} at {}: {:?}", port, line, outcome);

            observer(DiscoveryEvent::Finished {
                port: port.clone(),
                line: *line,
                outcome: outcome.clone(),
            });
            port_report.results.push(LineResult {
                line: *line,
                outcome,
            });
        }

        report.ports.push(port_report);
    }

    info!("Discovery finished: {} hit(s)", report.hits().len());
    report
}

async fn try_line(prober: &DeviceProber, config: &SerialConfig, plan: &DiscoveryPlan) -> DiscoveryOutcome {
    let primary = prober
        .probe(config, plan.unit, plan.address_register, 1)
        .await
        .outcome;

    let first_error = match primary {
        ProbeOutcome::Found(values) => {
            return DiscoveryOutcome::AddressRegister(values.first().copied().unwrap_or_default())
        }
        ProbeOutcome::ConnectFailed(reason) => return DiscoveryOutcome::PortUnavailable(reason),
        ProbeOutcome::ProtocolError(message) => Some(message),
        ProbeOutcome::NoResponse => None,
    };

    let fallback = prober
        .probe(config, plan.unit, plan.channel_register, 1)
        .await
        .outcome;

    match fallback {
        ProbeOutcome::Found(values) => {
            DiscoveryOutcome::ChannelRegister(values.first().copied().unwrap_or_default())
        }
        ProbeOutcome::ConnectFailed(reason) => DiscoveryOutcome::PortUnavailable(reason),
        ProbeOutcome::ProtocolError(message) => DiscoveryOutcome::ProtocolError(message),
        ProbeOutcome::NoResponse => match first_error {
            Some(message) => DiscoveryOutcome::ProtocolError(message),
            None => DiscoveryOutcome::Silent,
        },
    }
}
