//! Scripted in-memory transport shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use busprobe::{LinkError, Link, ParityConfig, SerialConfig, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One interaction with the transport, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open { port: String, baud_rate: u32, parity: ParityConfig },
    OpenFailed { port: String },
    Read { unit: u8, register: u16, count: u16 },
    Write { unit: u8, register: u16, value: u16 },
    Close,
}

type OpenScript = dyn Fn(&SerialConfig) -> Result<(), LinkError> + Send + Sync;
type ReadScript = dyn Fn(&SerialConfig, u8, u16) -> Result<Vec<u16>, LinkError> + Send + Sync;
type WriteScript = dyn Fn(u8, u16, u16) -> Result<(), LinkError> + Send + Sync;

fn always_open(_: &SerialConfig) -> Result<(), LinkError> {
    Ok(())
}

fn never_answers(_: &SerialConfig, _: u8, _: u16) -> Result<Vec<u16>, LinkError> {
    Err(LinkError::Timeout)
}

fn never_acknowledges(_: u8, _: u16, _: u16) -> Result<(), LinkError> {
    Err(LinkError::Timeout)
}

/// Transport whose replies come from closures; every call is journaled
#[derive(Clone)]
pub struct ScriptedTransport {
    journal: Arc<Mutex<Vec<Call>>>,
    open: Arc<OpenScript>,
    read: Arc<ReadScript>,
    write: Arc<WriteScript>,
}

impl ScriptedTransport {
    /// Every port opens; nothing ever answers
    pub fn silent() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(always_open),
            read: Arc::new(never_answers),
            write: Arc::new(never_acknowledges),
        }
    }

    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&SerialConfig) -> Result<(), LinkError> + Send + Sync + 'static,
    {
        self.open = Arc::new(f);
        self
    }

    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&SerialConfig, u8, u16) -> Result<Vec<u16>, LinkError> + Send + Sync + 'static,
    {
        self.read = Arc::new(f);
        self
    }

    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(u8, u16, u16) -> Result<(), LinkError> + Send + Sync + 'static,
    {
        self.write = Arc::new(f);
        self
    }

    pub fn shared(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn opens(&self) -> usize {
        self.count(|c| matches!(c, Call::Open { .. }))
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close))
    }

    /// Unit ids of every read, in order
    pub fn read_units(&self) -> Vec<u8> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Read { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn Link>, LinkError> {
        if let Err(e) = (self.open)(config) {
            self.record(Call::OpenFailed {
                port: config.port.clone(),
            });
            return Err(e);
        }
        self.record(Call::Open {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            parity: config.parity,
        });
        Ok(Box::new(ScriptedLink {
            transport: self.clone(),
            config: config.clone(),
        }))
    }
}

struct ScriptedLink {
    transport: ScriptedTransport,
    config: SerialConfig,
}

#[async_trait]
impl Link for ScriptedLink {
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        self.transport.record(Call::Read { unit, register, count });
        (self.transport.read)(&self.config, unit, register)
    }

    async fn write_single_register(
        &mut self,
        unit: u8,
        register: u16,
        value: u16,
    ) -> Result<(), LinkError> {
        self.transport.record(Call::Write { unit, register, value });
        (self.transport.write)(unit, register, value)
    }

    async fn close(&mut self) {
        self.transport.record(Call::Close);
    }
}

/// Serial configuration used by the integration tests
pub fn test_config() -> SerialConfig {
    SerialConfig {
        port: "/dev/ttyTEST0".to_string(),
        baud_rate: 4800,
        parity: ParityConfig::None,
        stop_bits: 1,
        data_bits: 8,
        timeout: Duration::from_millis(50),
    }
}
