use crate::domain::error::LinkError;
use serde::Serialize;

/// What one read transaction against one device address produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Well-formed response without an error flag
    Found(Vec<u16>),
    /// The serial port could not be opened
    ConnectFailed(String),
    /// The port opened but nothing valid arrived within the timeout
    NoResponse,
    /// The link reported an exception response, framing/CRC or I/O failure
    ProtocolError(String),
}

impl ProbeOutcome {
    /// Fold the result of a register read into an outcome
    pub fn from_read(result: Result<Vec<u16>, LinkError>) -> Self {
        match result {
            Ok(values) if values.is_empty() => {
                ProbeOutcome::ProtocolError("response carried no registers".to_string())
            }
            Ok(values) => ProbeOutcome::Found(values),
            Err(LinkError::Timeout) => ProbeOutcome::NoResponse,
            Err(LinkError::Unavailable(reason)) => ProbeOutcome::ConnectFailed(reason),
            Err(other) => ProbeOutcome::ProtocolError(other.to_string()),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }

    pub fn values(&self) -> Option<&[u16]> {
        match self {
            ProbeOutcome::Found(values) => Some(values),
            _ => None,
        }
    }

    /// First register of a successful read
    pub fn first_value(&self) -> Option<u16> {
        self.values().and_then(|values| values.first().copied())
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Found(values) => write!(f, "found {:?}", values),
            ProbeOutcome::ConnectFailed(reason) => write!(f, "cannot open port ({})", reason),
            ProbeOutcome::NoResponse => write!(f, "no response"),
            ProbeOutcome::ProtocolError(message) => write!(f, "error: {}", message),
        }
    }
}

/// Outcome of probing one device address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub address: u8,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    pub fn new(address: u8, outcome: ProbeOutcome) -> Self {
        Self { address, outcome }
    }
}

/// Every probe result of one address scan, in address order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Port and line the scan ran on
    pub line: String,
    /// Register read at each address
    pub register: u16,
    pub results: Vec<ProbeResult>,
}

impl ScanReport {
    pub fn new(line: String, register: u16) -> Self {
        Self {
            line,
            register,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ProbeResult) {
        self.results.push(result);
    }

    /// Addresses that answered
    pub fn found(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.outcome.is_found())
    }

    pub fn found_count(&self) -> usize {
        self.found().count()
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn silent_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ProbeOutcome::NoResponse))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    ProbeOutcome::ProtocolError(_) | ProbeOutcome::ConnectFailed(_)
                )
            })
            .count()
    }
}
