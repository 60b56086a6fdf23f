use thiserror::Error;

/// BusProbe unified error type
#[derive(Error, Debug)]
pub enum BusProbeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Cannot open port {port}: {message}")]
    PortUnavailable { port: String, message: String },

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type BusProbeResult<T> = Result<T, BusProbeError>;

/// Failure raised by a serial Modbus link.
///
/// These never escape a probe as errors; the prober folds them into a
/// [`ProbeOutcome`](crate::domain::probe::ProbeOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The port could not be opened (busy, missing, misconfigured).
    #[error("cannot open port: {0}")]
    Unavailable(String),

    /// Nothing valid arrived within the configured timeout.
    #[error("no response within timeout")]
    Timeout,

    /// The device answered with an error-flagged Modbus response.
    #[error("exception response: {0}")]
    Exception(String),

    /// Framing, CRC or other protocol violation reported by the codec.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Io(String),
}
