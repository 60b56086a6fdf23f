//! Address reassignment workflow
//!
//! A strictly forward state machine:
//!
//! ```text
//! Connect -> VerifyOldAddress -> WriteNewAddress -> PowerCycleBarrier -> VerifyNewAddress -> Finished
//!                  |
//!                  +-> AddressRecovery -> Finished  (old address silent)
//!                  +-> Finished                     (exception response)
//! ```
//!
//! [`Reassignment::step`] runs one stage at a time. At the power-cycle barrier
//! it reports [`Step::AwaitingOperator`] and stays there until
//! [`Reassignment::release_barrier`] is called, so the workflow can be driven
//! without a console. [`Reassignment::run`] drives it with an
//! [`OperatorBarrier`].
//!
//! The link opened in `Connect` is held until the workflow finishes and is
//! closed exactly once on every terminal path.

use crate::core::transport::{Link, Transport};
use crate::domain::config::{validate_unicast, BusProbeConfig, SerialConfig, BROADCAST_ADDRESS};
use crate::domain::error::{BusProbeError, BusProbeResult, LinkError};
use crate::domain::probe::{ProbeOutcome, ProbeResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Workflow stages, in the only order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    VerifyOldAddress,
    AddressRecovery,
    WriteNewAddress,
    PowerCycleBarrier,
    VerifyNewAddress,
    Finished,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::VerifyOldAddress => "verify-old-address",
            Stage::AddressRecovery => "address-recovery",
            Stage::WriteNewAddress => "write-new-address",
            Stage::PowerCycleBarrier => "power-cycle-barrier",
            Stage::VerifyNewAddress => "verify-new-address",
            Stage::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// How the new address reached the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "write", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The device at the old address acknowledged the write
    Acknowledged,
    /// No acknowledgment; the value was broadcast to id 0. Unverified.
    BroadcastSent { reason: String },
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOutcome::Acknowledged => write!(f, "write acknowledged"),
            WriteOutcome::BroadcastSent { .. } => write!(f, "broadcast sent (unverified)"),
        }
    }
}

/// Where the workflow ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "conclusion", rename_all = "snake_case")]
pub enum ReassignOutcome {
    /// The port could not be opened, even after the retry
    ConnectivityError { reason: String },
    /// The old address stayed silent; the operator must resolve and rerun
    RecoveryRequired { reason: String, found: Vec<ProbeResult> },
    /// A device answered at the old address with an exception response
    Rejected { address: u8, reason: String },
    /// The device answered at the new address
    Confirmed { write: WriteOutcome, values: Vec<u16> },
    /// Nothing answered at the new address
    Unconfirmed { write: WriteOutcome, reason: String },
}

/// Progress reported by each stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignEvent {
    ConnectRetry { reason: String, delay: Duration },
    Connected { line: String },
    OldAddressVerified { address: u8, values: Vec<u16> },
    OldAddressSilent { address: u8, reason: String },
    RecoveryProbe(ProbeResult),
    WriteAcknowledged { address: u8, value: u16 },
    BroadcastSent { value: u16, reason: String },
}

/// Result of running one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Advanced(ReassignEvent),
    /// Suspended at the power-cycle barrier
    AwaitingOperator,
    Finished(ReassignOutcome),
}

/// External signal that the device has been power cycled
#[async_trait]
pub trait OperatorBarrier: Send {
    async fn wait_for_power_cycle(&mut self) -> BusProbeResult<()>;
}

/// Parameters of one reassignment
#[derive(Debug, Clone)]
pub struct ReassignPlan {
    pub config: SerialConfig,
    pub old_address: u8,
    pub new_address: u8,
    pub address_register: u16,
    /// Register read to verify the old and new addresses
    pub verify_register: u16,
    pub retry_delay: Duration,
    pub recovery_candidates: Vec<u8>,
}

impl ReassignPlan {
    pub fn from_config(config: &BusProbeConfig) -> BusProbeResult<Self> {
        let plan = Self {
            config: config.serial_config(),
            old_address: config.reassign.old_address,
            new_address: config.reassign.new_address,
            address_register: config.registers.address_register,
            verify_register: config.registers.channel_register,
            retry_delay: Duration::from_millis(config.reassign.retry_delay_ms),
            recovery_candidates: config.reassign.recovery_candidates.clone(),
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> BusProbeResult<()> {
        validate_unicast("old address", self.old_address)?;
        validate_unicast("new address", self.new_address)?;
        Ok(())
    }
}

pub struct Reassignment {
    transport: Arc<dyn Transport>,
    plan: ReassignPlan,
    stage: Stage,
    link: Option<Box<dyn Link>>,
    connect_attempts: u8,
    silent_reason: String,
    recovery_next: usize,
    recovery_found: Vec<ProbeResult>,
    write: Option<WriteOutcome>,
    outcome: Option<ReassignOutcome>,
}

const MAX_CONNECT_ATTEMPTS: u8 = 2;

impl Reassignment {
    pub fn new(transport: Arc<dyn Transport>, plan: ReassignPlan) -> BusProbeResult<Self> {
        plan.validate()?;
        Ok(Self {
            transport,
            plan,
            stage: Stage::Connect,
            link: None,
            connect_attempts: 0,
            silent_reason: String::new(),
            recovery_next: 0,
            recovery_found: Vec::new(),
            write: None,
            outcome: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the current stage
    pub async fn step(&mut self) -> Step {
        match self.stage {
            Stage::Connect => self.connect().await,
            Stage::VerifyOldAddress => self.verify_old_address().await,
            Stage::AddressRecovery => self.recover().await,
            Stage::WriteNewAddress => self.write_new_address().await,
            Stage::PowerCycleBarrier => Step::AwaitingOperator,
            Stage::VerifyNewAddress => self.verify_new_address().await,
            Stage::Finished => match &self.outcome {
                Some(outcome) => Step::Finished(outcome.clone()),
                None => Step::Finished(ReassignOutcome::ConnectivityError {
                    reason: "workflow aborted".to_string(),
                }),
            },
        }
    }

    /// Pass the power-cycle barrier
    pub fn release_barrier(&mut self) -> BusProbeResult<()> {
        if self.stage != Stage::PowerCycleBarrier {
            return Err(BusProbeError::Workflow(format!(
                "cannot release the power-cycle barrier during {}",
                self.stage
            )));
        }
        info!("Power cycle confirmed by operator");
        self.stage = Stage::VerifyNewAddress;
        Ok(())
    }

    /// Drive the workflow to completion
    pub async fn run(
        &mut self,
        barrier: &mut dyn OperatorBarrier,
        observer: &mut dyn FnMut(&ReassignEvent),
    ) -> BusProbeResult<ReassignOutcome> {
        loop {
            match self.step().await {
                Step::Advanced(event) => observer(&event),
                Step::AwaitingOperator => {
                    if let Err(e) = barrier.wait_for_power_cycle().await {
                        self.abort().await;
                        return Err(e);
                    }
                    self.release_barrier()?;
                }
                Step::Finished(outcome) => return Ok(outcome),
            }
        }
    }

    /// Close the link and stop without an outcome
    pub async fn abort(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.stage = Stage::Finished;
    }

    async fn connect(&mut self) -> Step {
        if self.connect_attempts > 0 {
            tokio::time::sleep(self.plan.retry_delay).await;
        }
        self.connect_attempts += 1;

        match self.transport.open(&self.plan.config).await {
            Ok(link) => {
                info!("Connected to {}", self.plan.config);
                self.link = Some(link);
                self.stage = Stage::VerifyOldAddress;
                Step::Advanced(ReassignEvent::Connected {
                    line: self.plan.config.to_string(),
                })
            }
            Err(e) if self.connect_attempts < MAX_CONNECT_ATTEMPTS => {
                warn!("Cannot open {}: {}; retrying", self.plan.config.port, e);
                Step::Advanced(ReassignEvent::ConnectRetry {
                    reason: e.to_string(),
                    delay: self.plan.retry_delay,
                })
            }
            Err(e) => {
                warn!("Cannot open {}: {}; giving up", self.plan.config.port, e);
                self.finish(ReassignOutcome::ConnectivityError {
                    reason: e.to_string(),
                })
                .await
            }
        }
    }

    async fn verify_old_address(&mut self) -> Step {
        let address = self.plan.old_address;
        let read = self.read_raw(address, self.plan.verify_register).await;

        // An exception response means something is listening at the old
        // address; the recovery scan is only for silence.
        if let Err(LinkError::Exception(code)) = &read {
            warn!("Device at old address {} rejected the read: {}", address, code);
            let outcome = ReassignOutcome::Rejected {
                address,
                reason: LinkError::Exception(code.clone()).to_string(),
            };
            return self.finish(outcome).await;
        }

        match ProbeOutcome::from_read(read) {
            ProbeOutcome::Found(values) => {
                info!("Device answered at old address {}", address);
                self.stage = Stage::WriteNewAddress;
                Step::Advanced(ReassignEvent::OldAddressVerified { address, values })
            }
            other => {
                warn!("No usable answer at old address {}: {}", address, other);
                self.silent_reason = other.to_string();
                self.stage = Stage::AddressRecovery;
                Step::Advanced(ReassignEvent::OldAddressSilent {
                    address,
                    reason: other.to_string(),
                })
            }
        }
    }

    async fn recover(&mut self) -> Step {
        let next = self.plan.recovery_candidates.get(self.recovery_next).copied();
        let Some(address) = next else {
            let outcome = ReassignOutcome::RecoveryRequired {
                reason: self.silent_reason.clone(),
                found: std::mem::take(&mut self.recovery_found),
            };
            return self.finish(outcome).await;
        };
        self.recovery_next += 1;

        let outcome = self.read(address, self.plan.verify_register).await;
        let result = ProbeResult::new(address, outcome);
        if result.outcome.is_found() {
            info!("Recovery scan: device answered at address {}", address);
            self.recovery_found.push(result.clone());
        }
        Step::Advanced(ReassignEvent::RecoveryProbe(result))
    }

    async fn write_new_address(&mut self) -> Step {
        let (old, new, register) = (
            self.plan.old_address,
            self.plan.new_address,
            self.plan.address_register,
        );
        let value = u16::from(new);

        let Some(link) = self.link.as_mut() else {
            return self
                .finish(ReassignOutcome::ConnectivityError {
                    reason: "link closed before write".to_string(),
                })
                .await;
        };

        let event = match link.write_single_register(old, register, value).await {
            Ok(()) => {
                info!("Address register write acknowledged by device {}", old);
                self.write = Some(WriteOutcome::Acknowledged);
                ReassignEvent::WriteAcknowledged { address: old, value }
            }
            Err(e) => {
                warn!("No acknowledgment from device {} ({}); broadcasting", old, e);
                // Broadcast writes are never answered; the result says nothing.
                if let Err(e) = link
                    .write_single_register(BROADCAST_ADDRESS, register, value)
                    .await
                {
                    debug!("Broadcast write returned: {}", e);
                }
                let reason = e.to_string();
                self.write = Some(WriteOutcome::BroadcastSent {
                    reason: reason.clone(),
                });
                ReassignEvent::BroadcastSent { value, reason }
            }
        };

        self.stage = Stage::PowerCycleBarrier;
        Step::Advanced(event)
    }

    async fn verify_new_address(&mut self) -> Step {
        let address = self.plan.new_address;
        let outcome = self.read(address, self.plan.verify_register).await;
        let write = self.write.clone().unwrap_or(WriteOutcome::Acknowledged);

        let conclusion = match outcome {
            ProbeOutcome::Found(values) => {
                info!("Device answered at new address {}", address);
                ReassignOutcome::Confirmed { write, values }
            }
            other => {
                warn!("No usable answer at new address {}: {}", address, other);
                ReassignOutcome::Unconfirmed {
                    write,
                    reason: other.to_string(),
                }
            }
        };
        self.finish(conclusion).await
    }

    async fn read(&mut self, address: u8, register: u16) -> ProbeOutcome {
        ProbeOutcome::from_read(self.read_raw(address, register).await)
    }

    async fn read_raw(&mut self, address: u8, register: u16) -> Result<Vec<u16>, LinkError> {
        match self.link.as_mut() {
            Some(link) => link.read_holding_registers(address, register, 1).await,
            None => Err(LinkError::Unavailable("link is not open".to_string())),
        }
    }

    async fn finish(&mut self, outcome: ReassignOutcome) -> Step {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.stage = Stage::Finished;
        self.outcome = Some(outcome.clone());
        Step::Finished(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_default_config() {
        let plan = ReassignPlan::from_config(&BusProbeConfig::default()).unwrap();
        assert_eq!(plan.old_address, 1);
        assert_eq!(plan.new_address, 21);
        assert_eq!(plan.address_register, 0x07D0);
        assert_eq!(plan.verify_register, 0);
        assert_eq!(plan.retry_delay, Duration::from_secs(2));
        assert_eq!(plan.recovery_candidates, vec![1, 2, 3, 21, 254]);
    }

    #[test]
    fn test_plan_rejects_broadcast_target() {
        let mut config = BusProbeConfig::default();
        config.reassign.new_address = 0;
        assert!(ReassignPlan::from_config(&config).is_err());
    }

    #[test]
    fn test_write_outcome_wording() {
        assert_eq!(WriteOutcome::Acknowledged.to_string(), "write acknowledged");
        let broadcast = WriteOutcome::BroadcastSent {
            reason: "no response within timeout".to_string(),
        };
        assert!(broadcast.to_string().contains("broadcast sent"));
        assert!(!broadcast.to_string().contains("acknowledged"));
    }
}
