//! The interface the acquisition core requires from the hardware layer.
//!
//! A real implementation wraps the vendor's device library (enumeration,
//! handles, command/response exchange, raw measurement reads). The core
//! never talks to hardware directly; everything goes through
//! [`Transport`], which keeps the driver testable with [`MockTransport`].

use serde::{Deserialize, Serialize};

use labport_shared::{Channel, DeviceType, ParameterBlock, VoltageProbe};

pub mod mock;
pub use mock::MockTransport;

/// Opaque handle to one open device, issued by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(pub u64);

/// One raw measurement as produced by the hardware: a signed count and a
/// device-clock timestamp in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    pub raw: i32,
    pub timestamp: i64,
}

/// One stored calibration coefficient set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalPage {
    pub k0: f64,
    pub k1: f64,
    pub k2: f64,
    pub units: String,
}

/// Host-side copy of an analog channel's sensor descriptor memory.
///
/// For auto-ID sensors this is read off the sensor itself; for
/// resistor-coded sensors the host writes it from the bundled lookup
/// table; for raw-voltage mode the host overwrites it with
/// [`SensorRecord::raw_voltage`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub long_name: String,
    pub short_name: String,
    pub operation_type: u8,
    pub calibration_equation: u8,
    /// Index of the last valid calibration page (a sensor with two pages
    /// has highest index 1).
    pub highest_cal_page: u8,
    pub active_cal_page: u8,
    pub pages: [CalPage; 3],
}

impl SensorRecord {
    /// Operation type indicating a +/-10V sensor; everything else reads
    /// on the 5V range.
    pub const OP_TYPE_10V: u8 = 2;

    /// Operation type written for raw-voltage mode.
    pub const OP_TYPE_RAW_VOLTAGE: u8 = 14;

    /// Descriptor that makes a channel report its raw potential in volts.
    pub fn raw_voltage() -> Self {
        Self {
            long_name: "Potential".to_owned(),
            short_name: "Pot".to_owned(),
            operation_type: Self::OP_TYPE_RAW_VOLTAGE,
            calibration_equation: 1,
            highest_cal_page: 0,
            active_cal_page: 0,
            pages: [
                CalPage {
                    k0: 0.0,
                    k1: 1.0,
                    k2: 0.0,
                    units: "(V)".to_owned(),
                },
                CalPage::default(),
                CalPage::default(),
            ],
        }
    }

    /// The currently selected calibration page.
    pub fn active_page(&self) -> &CalPage {
        &self.pages[(self.active_cal_page as usize).min(self.pages.len() - 1)]
    }

    /// Probe selector for raw-to-voltage conversion on this sensor.
    pub fn voltage_probe(&self) -> VoltageProbe {
        if self.operation_type == Self::OP_TYPE_10V {
            VoltageProbe::Probe10V
        } else {
            VoltageProbe::Probe5V
        }
    }
}

/// Blocking hardware access used by the acquisition core.
///
/// All calls are synchronous; the core issues them from a single thread
/// and never retries a transport-level failure (only data availability
/// is retried, by the poller).
pub trait Transport {
    /// Enumerate and open every attached device of one type, returning a
    /// handle per device. An empty list means none of this type found.
    fn open_devices(&mut self, device_type: DeviceType) -> Result<Vec<DeviceHandle>, String>;

    /// Close one device; the handle is invalid afterwards.
    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), String>;

    /// Take control from a device's built-in app (required on every
    /// device type except the Mini before streaming).
    fn acquire_exclusive_ownership(&mut self, handle: DeviceHandle) -> Result<(), String>;

    /// Send one command plus parameter block, returning the response
    /// payload.
    fn send_command(
        &mut self,
        handle: DeviceHandle,
        command: u8,
        params: &ParameterBlock,
    ) -> Result<Vec<u8>, String>;

    /// How many raw measurements are buffered on the device for a channel.
    fn available_count(&mut self, handle: DeviceHandle, channel: Channel)
        -> Result<usize, String>;

    /// Fetch up to `max_count` raw measurements with timestamps,
    /// consuming them from the device buffer.
    fn read_raw(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        max_count: usize,
    ) -> Result<Vec<Sample>, String>;

    /// Convert one raw analog count to volts for the given probe range.
    fn voltage_from_raw(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        raw: i32,
        probe: VoltageProbe,
    ) -> Result<f64, String>;

    /// Set the measurement period in seconds; `None` applies to all
    /// channels.
    fn set_measurement_period(
        &mut self,
        handle: DeviceHandle,
        channel: Option<Channel>,
        period_s: f64,
    ) -> Result<(), String>;

    /// Read back the measurement period actually in effect.
    fn measurement_period(
        &mut self,
        handle: DeviceHandle,
        channel: Option<Channel>,
    ) -> Result<f64, String>;

    /// Pull the descriptor stored on the sensor hardware into the
    /// host-side record for this channel.
    fn read_sensor_record(&mut self, handle: DeviceHandle, channel: Channel)
        -> Result<(), String>;

    /// The host-side descriptor record for this channel.
    fn sensor_record(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
    ) -> Result<SensorRecord, String>;

    /// Overwrite the host-side descriptor record for this channel.
    fn write_sensor_record(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        record: &SensorRecord,
    ) -> Result<(), String>;

    /// Select the active calibration page for this channel.
    fn set_active_cal_page(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        page: u8,
    ) -> Result<(), String>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_raw_voltage_record() {
        let rec = SensorRecord::raw_voltage();
        assert_eq!(rec.operation_type, SensorRecord::OP_TYPE_RAW_VOLTAGE);
        assert_eq!(rec.voltage_probe(), VoltageProbe::Probe5V);
        assert_eq!(rec.active_page().k1, 1.0);
        assert_eq!(rec.active_page().units, "(V)");
    }

    #[test]
    fn test_active_page_clamps() {
        let mut rec = SensorRecord::raw_voltage();
        rec.active_cal_page = 7;
        // Out-of-range page selection reads the last stored page rather
        // than panicking
        assert_eq!(rec.active_page(), &rec.pages[2]);
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let rec = SensorRecord::raw_voltage();
        let json = serde_json::to_string(&rec).unwrap();
        let back: SensorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
