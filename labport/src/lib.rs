//! Host-side acquisition driver for LabPort multi-channel lab interfaces.
//!
//! The [`Session`] object owns everything for a run: the transport, the
//! per-device channel registry, and the per-channel overflow buffers.
//! Hardware access is abstracted behind [`Transport`], so the whole
//! acquisition pipeline can run against the in-tree [`MockTransport`].

pub mod buffer;
pub mod calibration;
pub mod logging;
pub mod poll;
pub mod registry;
pub mod resistor;
pub mod session;
pub mod transport;

pub use calibration::{CalEquation, Calibration};
pub use logging::init_logging;
pub use registry::{AnalogMode, ChannelAssignments, DigitalMode, ModeFlags};
pub use session::{ChannelInfo, Session};
pub use transport::{DeviceHandle, MockTransport, Sample, SensorRecord, Transport};

// Wire vocabulary re-exported for convenience
pub use labport_shared::{Channel, DeviceType};
