// Core module - Probing, scanning, discovery and reassignment
pub mod discovery;
pub mod prober;
pub mod reassign;
pub mod scan;
pub mod transport;

pub use discovery::{discover, DiscoveryEvent, DiscoveryOutcome, DiscoveryPlan, DiscoveryReport};
pub use prober::DeviceProber;
pub use reassign::{OperatorBarrier, ReassignEvent, ReassignOutcome, ReassignPlan, Reassignment, Stage, Step, WriteOutcome};
pub use scan::{scan, ScanEvent, ScanPlan};
pub use transport::{Link, Transport};
