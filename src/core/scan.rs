//! Address scan driver
//!
//! Probes every address of a range in order with one fixed serial line and
//! collects the results. A failure at one address never stops the scan.

use crate::core::prober::DeviceProber;
use crate::domain::config::{ScanSettings, SerialConfig, MAX_SCAN_ADDRESS, MIN_UNICAST_ADDRESS};
use crate::domain::probe::{ProbeOutcome, ScanReport};
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Notifications emitted while a scan runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A device answered
    Found { address: u8, register: u16, values: Vec<u16> },
    /// Periodic heartbeat while nothing has been found yet
    Progress { address: u8 },
}

/// What to scan
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub register: u16,
    pub count: u16,
    pub addresses: RangeInclusive<u8>,
    pub progress_interval: u8,
}

impl ScanPlan {
    pub fn from_settings(settings: &ScanSettings, register: u16) -> Self {
        Self {
            register,
            count: settings.register_count,
            addresses: settings.first_address..=settings.last_address,
            progress_interval: settings.progress_interval,
        }
    }
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self::from_settings(&ScanSettings::default(), 0)
    }
}

/// Restrict a requested range to the scannable addresses 1..=254
pub fn scannable(range: &RangeInclusive<u8>) -> RangeInclusive<u8> {
    let start = (*range.start()).max(MIN_UNICAST_ADDRESS);
    let end = (*range.end()).min(MAX_SCAN_ADDRESS);
    start..=end
}

/// Probe every scannable address of the plan, in ascending order
pub async fn scan(
    prober: &DeviceProber,
    config: &SerialConfig,
    plan: &ScanPlan,
    observer: &mut dyn FnMut(ScanEvent),
) -> ScanReport {
    let addresses = scannable(&plan.addresses);
    let mut report = ScanReport::new(config.to_string(), plan.register);
    let mut found_any = false;

    info!(
        "Scanning addresses {}..={} on {} (register 0x{:04X})",
        addresses.start(),
        addresses.end(),
        config,
        plan.register
    );

    for address in addresses {
        let result = prober.probe(config, address, plan.register, plan.count).await;

        match &result.outcome {
            ProbeOutcome::Found(values) => {
                found_any = true;
                info!("Device answered at address {}", address);
                observer(ScanEvent::Found {
                    address,
                    register: plan.register,
                    values: values.clone(),
                });
            }
            other => debug!("Address {}: {}", address, other),
        }
        report.push(result);

        if plan.progress_interval > 0 && address % plan.progress_interval == 0 && !found_any {
            observer(ScanEvent::Progress { address });
        }
    }

    info!(
        "Scan finished: {} of {} address(es) answered",
        report.found_count(),
        report.attempted()
    );
    report
}
