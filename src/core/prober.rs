//! Device prober
//!
//! One probe is one read transaction: open the port, read holding registers
//! from one device address, close the port. The port is never shared
//! between probes.

use crate::core::transport::Transport;
use crate::domain::config::{SerialConfig, BROADCAST_ADDRESS};
use crate::domain::error::LinkError;
use crate::domain::probe::{ProbeOutcome, ProbeResult};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct DeviceProber {
    transport: Arc<dyn Transport>,
}

impl DeviceProber {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Read `count` holding registers starting at `register` from `address`.
    ///
    /// Never retries; failures come back as outcome variants.
    pub async fn probe(
        &self,
        config: &SerialConfig,
        address: u8,
        register: u16,
        count: u16,
    ) -> ProbeResult {
        if address == BROADCAST_ADDRESS {
            return ProbeResult::new(
                address,
                ProbeOutcome::ProtocolError("broadcast address cannot answer a read".to_string()),
            );
        }

        let mut link = match self.transport.open(config).await {
            Ok(link) => link,
            Err(e) => {
                debug!("Probe of address {} on {}: open failed: {}", address, config, e);
                return ProbeResult::new(address, ProbeOutcome::ConnectFailed(open_reason(e)));
            }
        };

        let read = link.read_holding_registers(address, register, count).await;
        link.close().await;

        let outcome = ProbeOutcome::from_read(read);
        trace!("Probe of address {} register 0x{:04X}: {}", address, register, outcome);
        ProbeResult::new(address, outcome)
    }

    /// Open and immediately close the port to confirm it is usable
    pub async fn check_port(&self, config: &SerialConfig) -> Result<(), LinkError> {
        let mut link = self.transport.open(config).await?;
        link.close().await;
        Ok(())
    }
}

fn open_reason(err: LinkError) -> String {
    match err {
        LinkError::Unavailable(reason) => reason,
        other => other.to_string(),
    }
}
