use crate::cli::args::{
    Args, Command, ConfigArgs, ConfigCommand, OutputFormat, ProbeArgs, ScanArgs,
};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::discovery::{discover, DiscoveryPlan};
use crate::core::prober::DeviceProber;
use crate::core::reassign::{OperatorBarrier, ReassignEvent, ReassignOutcome, ReassignPlan, Reassignment};
use crate::core::scan::{scan, scannable, ScanPlan};
use crate::domain::config::BusProbeConfig;
use crate::domain::error::{BusProbeError, BusProbeResult, LinkError};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{list_ports, RtuTransport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

const SCAN_HINTS: &[&str] = &[
    "Device not powered on",
    "A+ and B- wires not connected or reversed",
    "Baud rate mismatch (try 9600 instead of 4800)",
    "USB driver not installed",
    "Serial port is incorrect (check the `ports` command)",
];

const OLD_ADDRESS_HINTS: &[&str] = &[
    "Device not powered on",
    "A+ and B- wires reversed or not connected",
    "Device address is not the expected one (see the recovery scan below)",
    "RS485 bus needs a termination resistor (120 ohm)",
];

const NEW_ADDRESS_HINTS: &[&str] = &[
    "Device was not power cycled after the write",
    "The write never reached the device",
    "Check wiring, parity and baud rate",
];

/// Execute CLI command
pub async fn execute_command(args: Args) -> BusProbeResult<()> {
    let writer = ConsoleWriter::new(args.output);

    // Load configuration using ConfigManager
    let config_manager = ConfigManager::new()?;
    let mut config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    // Initialize logging
    if !args.quiet {
        init_logging(&config.global.log_level, args.verbose)?;
    }

    let prober = DeviceProber::new(Arc::new(RtuTransport::new()));

    match args.command {
        Command::Ports => execute_ports(&writer),
        Command::Probe(probe_args) => {
            probe_args.serial.apply(&mut config);
            config.validate_serial()?;
            execute_probe(probe_args, &writer, &config, &prober).await
        }
        Command::Scan(scan_args) => {
            scan_args.apply(&mut config);
            config.validate_serial()?;
            config.validate_scan()?;
            execute_scan(scan_args, &writer, &config, &prober).await
        }
        Command::Discover(discover_args) => {
            discover_args.apply(&mut config);
            config.validate_serial()?;
            config.validate_discovery()?;
            execute_discover(&writer, &config, &prober).await
        }
        Command::Reassign(reassign_args) => {
            reassign_args.apply(&mut config);
            config.validate_serial()?;
            config.validate_reassign()?;
            execute_reassign(&writer, &config, &prober).await
        }
        Command::Config(config_args) => {
            execute_config_command(config_args, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("busprobe {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

fn execute_ports(writer: &ConsoleWriter) -> BusProbeResult<()> {
    let ports = list_ports()?;
    writer.write_banner("Available serial ports:")?;
    writer.write_ports(&ports)?;
    Ok(())
}

async fn execute_probe(
    args: ProbeArgs,
    writer: &ConsoleWriter,
    config: &BusProbeConfig,
    prober: &DeviceProber,
) -> BusProbeResult<()> {
    if args.count == 0 || args.count > 125 {
        return Err(BusProbeError::InvalidInput(format!(
            "register count {} must be between 1 and 125",
            args.count
        )));
    }

    let serial = config.serial_config();
    let result = prober.probe(&serial, args.unit, args.register, args.count).await;
    writer.write_probe(&serial.to_string(), args.register, &result)?;
    Ok(())
}

async fn execute_scan(
    args: ScanArgs,
    writer: &ConsoleWriter,
    config: &BusProbeConfig,
    prober: &DeviceProber,
) -> BusProbeResult<()> {
    let serial = config.serial_config();
    let register = args.register.unwrap_or(config.registers.channel_register);
    let plan = ScanPlan::from_settings(&config.scan, register);
    let addresses = scannable(&plan.addresses);

    writer.write_banner(&format!(
        "Scanning Modbus addresses {}-{} on {}...",
        addresses.start(),
        addresses.end(),
        serial
    ))?;

    if let Err(e) = prober.check_port(&serial).await {
        writer.write_banner("Check if device is connected and drivers are installed")?;
        return Err(BusProbeError::PortUnavailable {
            port: serial.port.clone(),
            message: match e {
                LinkError::Unavailable(reason) => reason,
                other => other.to_string(),
            },
        });
    }
    writer.write_banner(&format!("Connected to {}", serial.port))?;
    writer.write_banner("This may take a few minutes...")?;

    let report = scan(prober, &serial, &plan, &mut |event| {
        if let Err(e) = writer.write_scan_event(&event) {
            warn!("Failed to print scan progress: {}", e);
        }
    })
    .await;

    writer.write_scan_report(&report)?;
    if report.found_count() == 0 {
        writer.write_hints(SCAN_HINTS)?;
    }
    Ok(())
}

async fn execute_discover(
    writer: &ConsoleWriter,
    config: &BusProbeConfig,
    prober: &DeviceProber,
) -> BusProbeResult<()> {
    let ports = if config.discovery.ports.is_empty() {
        let found = list_ports()?;
        if writer.format() == OutputFormat::Text {
            writer.write_banner("Available serial ports:")?;
            writer.write_ports(&found)?;
        }
        found.into_iter().map(|p| p.name).collect::<Vec<_>>()
    } else {
        config.discovery.ports.clone()
    };

    if ports.is_empty() {
        return Err(BusProbeError::InvalidInput("no serial ports to test".to_string()));
    }

    let plan = DiscoveryPlan::from_config(config);
    writer.write_banner(&format!(
        "Testing device {} (address register 0x{:04X}, fallback register 0x{:04X})",
        plan.unit, plan.address_register, plan.channel_register
    ))?;

    let report = discover(prober, &config.serial_config(), &ports, &plan, &mut |event| {
        if let Err(e) = writer.write_discovery_event(&event) {
            warn!("Failed to print discovery progress: {}", e);
        }
    })
    .await;

    writer.write_discovery_report(&report)?;
    Ok(())
}

async fn execute_reassign(
    writer: &ConsoleWriter,
    config: &BusProbeConfig,
    prober: &DeviceProber,
) -> BusProbeResult<()> {
    let plan = ReassignPlan::from_config(config)?;
    writer.write_banner(&format!(
        "Changing device address {} -> {} on {}",
        plan.old_address, plan.new_address, plan.config
    ))?;

    let mut workflow = Reassignment::new(prober.transport(), plan)?;
    let mut barrier = ConsoleBarrier;

    let outcome = workflow
        .run(&mut barrier, &mut |event| {
            if let Err(e) = render_reassign_event(writer, event) {
                warn!("Failed to print reassignment progress: {}", e);
            }
        })
        .await?;

    writer.write_reassign_outcome(&outcome)?;
    if matches!(outcome, ReassignOutcome::Unconfirmed { .. }) {
        writer.write_hints(NEW_ADDRESS_HINTS)?;
    }
    Ok(())
}

fn render_reassign_event(writer: &ConsoleWriter, event: &ReassignEvent) -> BusProbeResult<()> {
    match event {
        ReassignEvent::Connected { .. } => {
            writer.write_reassign_event(event)?;
            writer.write_banner("\n[1] Checking device at old address...")?;
        }
        ReassignEvent::OldAddressVerified { .. } => {
            writer.write_reassign_event(event)?;
            writer.write_banner("\n[2] Writing new address...")?;
        }
        ReassignEvent::OldAddressSilent { .. } => {
            writer.write_reassign_event(event)?;
            writer.write_hints(OLD_ADDRESS_HINTS)?;
            writer.write_banner("\n   Scanning for devices on the bus...")?;
        }
        _ => writer.write_reassign_event(event)?,
    }
    Ok(())
}

/// Waits for the operator to confirm the power cycle on stdin
struct ConsoleBarrier;

#[async_trait]
impl OperatorBarrier for ConsoleBarrier {
    async fn wait_for_power_cycle(&mut self) -> BusProbeResult<()> {
        // Prompt on stderr so structured stdout stays parseable
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(b"\nPower OFF/ON device, then press Enter...")
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(BusProbeError::Workflow(
                "stdin closed before the power cycle was confirmed".to_string(),
            ));
        }
        Ok(())
    }
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &BusProbeConfig,
    config_manager: &ConfigManager,
) -> BusProbeResult<()> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Validate { file } => {
            let candidate = match file {
                Some(path) => config_manager.load_config_from_path(Path::new(&path))?,
                None => config.clone(),
            };
            candidate.validate()?;
            writer.write_message("Configuration is valid")?;
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            let created = if global {
                config_manager.init_global_config()?
            } else {
                let dir = match dir {
                    Some(dir) => PathBuf::from(dir),
                    None => std::env::current_dir()?,
                };
                config_manager.init_project_config(&dir)?
            };
            writer.write_message(&format!("Configuration created at {}", created.display()))?;
            Ok(())
        }
    }
}
