//! Channel assignment and per-device configuration.
//!
//! Maps the user's requested use of each channel onto what is actually
//! plugged in: sensors are identified (auto-ID or resistor-coded), their
//! descriptors loaded, and calibrations bound. The result is a
//! [`DeviceConfig`] holding everything the measurement pipeline needs,
//! including the enable mask for periodic sampling.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use labport_shared::commands::{command_ids, SensorIdQuery};
use labport_shared::{Channel, CommandFrame, SamplingMode, VoltageProbe};

use crate::calibration::Calibration;
use crate::resistor;
use crate::transport::{DeviceHandle, SensorRecord, Transport};

/// Requested use of one analog channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalogMode {
    #[default]
    NoSensor,
    /// Attached sensor with whatever calibration page it defaults to.
    Sensor,
    /// Attached sensor with an explicit calibration page.
    SensorCal(u8),
    /// Report the channel's raw potential in volts; no sensor required.
    RawVoltage,
}

/// Requested use of one digital channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitalMode {
    #[default]
    NoSensor,
    /// Ultrasonic motion detector, reported as distance in meters.
    Motion,
    /// Photogate in event-counting mode.
    PhotogateCount,
    /// Photogate in edge-timestamp mode, read via gate timing.
    PhotogateTiming,
    /// Rotary motion sensor, angle in degrees.
    RotaryMotion,
    /// Rotary motion sensor at quadrature resolution.
    RotaryMotionHighRes,
    /// Digital control unit driving output lines.
    Dcu,
    /// Digital control unit driving a PWM waveform.
    DcuPwm,
}

impl DigitalMode {
    /// Firmware sampling mode for this use, `None` when the channel is
    /// unused.
    pub fn sampling_mode(&self) -> Option<SamplingMode> {
        match self {
            DigitalMode::NoSensor => None,
            DigitalMode::Motion => Some(SamplingMode::PeriodicMotionDetect),
            DigitalMode::PhotogateCount => Some(SamplingMode::PeriodicPulseCount),
            DigitalMode::PhotogateTiming => Some(SamplingMode::AperiodicEdgeDetect),
            DigitalMode::RotaryMotion => Some(SamplingMode::PeriodicRotationCounter),
            DigitalMode::RotaryMotionHighRes => Some(SamplingMode::PeriodicRotationCounterX4),
            DigitalMode::Dcu | DigitalMode::DcuPwm => Some(SamplingMode::Custom),
        }
    }

    /// True for sensor inputs, which contribute to the channel enable
    /// mask. Output modes do not.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            DigitalMode::Motion
                | DigitalMode::PhotogateCount
                | DigitalMode::PhotogateTiming
                | DigitalMode::RotaryMotion
                | DigitalMode::RotaryMotionHighRes
        )
    }

    /// True for modes backed by the hardware event counter, which is
    /// zeroed before a run.
    pub fn uses_counter(&self) -> bool {
        matches!(
            self,
            DigitalMode::PhotogateCount
                | DigitalMode::RotaryMotion
                | DigitalMode::RotaryMotionHighRes
        )
    }

    /// True for output modes, which need the IO lines in output
    /// direction.
    pub fn is_output(&self) -> bool {
        matches!(self, DigitalMode::Dcu | DigitalMode::DcuPwm)
    }

    /// Input modes read by the periodic `read()` path. Gate timing has
    /// its own aperiodic read.
    pub fn reads_periodically(&self) -> bool {
        matches!(
            self,
            DigitalMode::Motion
                | DigitalMode::PhotogateCount
                | DigitalMode::RotaryMotion
                | DigitalMode::RotaryMotionHighRes
        )
    }
}

/// Requested use of all five channels on one device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelAssignments {
    pub ch1: AnalogMode,
    pub ch2: AnalogMode,
    pub ch3: AnalogMode,
    pub dig1: DigitalMode,
    pub dig2: DigitalMode,
}

impl ChannelAssignments {
    pub fn analog(&self) -> [(Channel, AnalogMode); 3] {
        [
            (Channel::Ch1, self.ch1),
            (Channel::Ch2, self.ch2),
            (Channel::Ch3, self.ch3),
        ]
    }

    pub fn digital(&self) -> [(Channel, DigitalMode); 2] {
        [(Channel::Dig1, self.dig1), (Channel::Dig2, self.dig2)]
    }
}

/// One configured analog channel: identified sensor, probe range, and
/// bound calibration.
#[derive(Clone, Debug)]
pub struct AnalogChannelConfig {
    pub channel: Channel,
    pub probe: VoltageProbe,
    pub calibration: Calibration,
    pub record: SensorRecord,
}

/// One configured digital channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DigitalChannelConfig {
    pub channel: Channel,
    pub mode: DigitalMode,
}

/// Everything the pipeline needs to run one device.
#[derive(Clone, Debug, Default)]
pub struct DeviceConfig {
    pub analog: Vec<AnalogChannelConfig>,
    pub digital: Vec<DigitalChannelConfig>,
}

impl DeviceConfig {
    /// Enable mask for periodic sampling: every configured analog
    /// channel plus digital inputs. Output channels contribute nothing.
    pub fn channel_mask(&self) -> u32 {
        let analog: u32 = self.analog.iter().map(|c| c.channel.mask_bit()).sum();
        let digital: u32 = self
            .digital
            .iter()
            .filter(|c| c.mode.is_input())
            .map(|c| c.channel.mask_bit())
            .sum();
        analog | digital
    }

    /// True when any channel is configured at all.
    pub fn is_active(&self) -> bool {
        !self.analog.is_empty() || !self.digital.is_empty()
    }

    pub fn digital_with_mode(&self, mode: DigitalMode) -> impl Iterator<Item = Channel> + '_ {
        self.digital
            .iter()
            .filter(move |c| c.mode == mode)
            .map(|c| c.channel)
    }
}

/// Feature summary across every configured device, used to route reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeFlags {
    pub motion: bool,
    pub photogate_count: bool,
    pub photogate_timing: bool,
    pub rotary: bool,
    pub dcu: bool,
    pub dcu_pwm: bool,
}

impl ModeFlags {
    pub fn collect(configs: &[DeviceConfig]) -> Self {
        let mut flags = Self::default();
        for config in configs {
            for dig in &config.digital {
                match dig.mode {
                    DigitalMode::Motion => flags.motion = true,
                    DigitalMode::PhotogateCount => flags.photogate_count = true,
                    DigitalMode::PhotogateTiming => flags.photogate_timing = true,
                    DigitalMode::RotaryMotion | DigitalMode::RotaryMotionHighRes => {
                        flags.rotary = true
                    }
                    DigitalMode::Dcu => flags.dcu = true,
                    DigitalMode::DcuPwm => flags.dcu_pwm = true,
                    DigitalMode::NoSensor => {}
                }
            }
        }
        flags
    }
}

/// Identify and bind whatever the assignments ask for on one device.
///
/// A channel asking for a sensor that is not plugged in is disabled with
/// a warning rather than failing the whole device; an unimplementable
/// calibration equation is an error.
pub fn configure_device(
    transport: &mut dyn Transport,
    handle: DeviceHandle,
    device_index: usize,
    assignments: &ChannelAssignments,
) -> Result<DeviceConfig, String> {
    let mut config = DeviceConfig::default();

    for (channel, mode) in assignments.analog() {
        match mode {
            AnalogMode::NoSensor => continue,
            AnalogMode::RawVoltage => {
                transport.write_sensor_record(handle, channel, &SensorRecord::raw_voltage())?;
            }
            AnalogMode::Sensor | AnalogMode::SensorCal(_) => {
                if !load_sensor_record(transport, handle, device_index, channel)? {
                    continue;
                }
                if let AnalogMode::SensorCal(page) = mode {
                    let record = transport.sensor_record(handle, channel)?;
                    if page > record.highest_cal_page {
                        warn!(
                            "calibration page {page} out of range on {} of device \
                             {device_index}, keeping page {}",
                            channel.label(),
                            record.active_cal_page
                        );
                    } else {
                        transport.set_active_cal_page(handle, channel, page)?;
                    }
                }
            }
        }

        let record = transport.sensor_record(handle, channel)?;
        let calibration = Calibration::from_record(&record)?;
        info!(
            "device {device_index} {}: {} {}",
            channel.label(),
            record.long_name,
            calibration.units
        );
        config.analog.push(AnalogChannelConfig {
            channel,
            probe: record.voltage_probe(),
            calibration,
            record,
        });
    }

    for (channel, mode) in assignments.digital() {
        if mode == DigitalMode::NoSensor {
            continue;
        }
        info!("device {device_index} {}: {mode:?}", channel.label());
        config.digital.push(DigitalChannelConfig { channel, mode });
    }

    Ok(config)
}

/// Query the sensor id and load the matching descriptor. Returns false
/// when nothing usable is plugged in.
fn load_sensor_record(
    transport: &mut dyn Transport,
    handle: DeviceHandle,
    device_index: usize,
    channel: Channel,
) -> Result<bool, String> {
    let query = SensorIdQuery::new(channel);
    let response =
        transport.send_command(handle, command_ids::GET_SENSOR_ID, &query.to_parameter_block())?;
    let sensor_id = SensorIdQuery::parse_response(&response);

    if sensor_id <= 0 {
        warn!(
            "no sensor detected on {} of device {device_index}, channel disabled",
            channel.label()
        );
        return Ok(false);
    }

    if sensor_id >= resistor::AUTO_ID_THRESHOLD {
        transport.read_sensor_record(handle, channel)?;
    } else {
        match resistor::record_for_id(sensor_id) {
            Some(record) => transport.write_sensor_record(handle, channel, &record)?,
            None => {
                warn!(
                    "sensor id {sensor_id} on {} of device {device_index} has no table \
                     entry, channel disabled",
                    channel.label()
                );
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::MockTransport;
    use labport_shared::DeviceType;

    fn auto_id_record() -> SensorRecord {
        SensorRecord {
            long_name: "Force".to_owned(),
            short_name: "F".to_owned(),
            operation_type: 14,
            calibration_equation: 1,
            highest_cal_page: 1,
            active_cal_page: 0,
            pages: Default::default(),
        }
    }

    fn open_one(t: &mut MockTransport) -> DeviceHandle {
        t.open_devices(DeviceType::Mini).unwrap()[0]
    }

    #[test]
    fn test_auto_id_sensor_binds() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        {
            let ch = t.device_mut(0).channel_mut(Channel::Ch1);
            ch.sensor_id = 33;
            ch.onboard = auto_id_record();
        }
        let handle = open_one(&mut t);
        let assignments = ChannelAssignments {
            ch1: AnalogMode::Sensor,
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &assignments).unwrap();
        assert_eq!(config.analog.len(), 1);
        assert_eq!(config.analog[0].record.long_name, "Force");
        assert_eq!(config.channel_mask(), 0x02);
    }

    #[test]
    fn test_resistor_sensor_loads_table_row() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        t.device_mut(0).channel_mut(Channel::Ch2).sensor_id = 10;

        let handle = open_one(&mut t);
        let assignments = ChannelAssignments {
            ch2: AnalogMode::Sensor,
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &assignments).unwrap();
        assert_eq!(config.analog.len(), 1);
        assert_eq!(config.analog[0].record.long_name, "Temperature");
        assert_eq!(config.analog[0].calibration.units, "(C)");
    }

    #[test]
    fn test_missing_sensor_disables_channel() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        let handle = open_one(&mut t);
        let assignments = ChannelAssignments {
            ch1: AnalogMode::Sensor,
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &assignments).unwrap();
        assert!(config.analog.is_empty());
        assert!(!config.is_active());
    }

    #[test]
    fn test_cal_page_selection_and_out_of_range() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        {
            let ch = t.device_mut(0).channel_mut(Channel::Ch1);
            ch.sensor_id = 33;
            ch.onboard = auto_id_record();
        }
        let handle = open_one(&mut t);

        let good = ChannelAssignments {
            ch1: AnalogMode::SensorCal(1),
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &good).unwrap();
        assert_eq!(config.analog[0].record.active_cal_page, 1);

        // Page beyond the sensor's highest: keep whatever the freshly
        // loaded descriptor was active on
        let bad = ChannelAssignments {
            ch1: AnalogMode::SensorCal(2),
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &bad).unwrap();
        assert_eq!(config.analog[0].record.active_cal_page, 0);
    }

    #[test]
    fn test_raw_voltage_needs_no_sensor() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        let handle = open_one(&mut t);
        let assignments = ChannelAssignments {
            ch3: AnalogMode::RawVoltage,
            ..Default::default()
        };
        let config = configure_device(&mut t, handle, 0, &assignments).unwrap();
        assert_eq!(config.analog.len(), 1);
        assert_eq!(config.analog[0].record.long_name, "Potential");
        assert_eq!(config.analog[0].calibration.units, "(V)");
    }

    #[test]
    fn test_mask_excludes_outputs() {
        let config = DeviceConfig {
            analog: Vec::new(),
            digital: vec![
                DigitalChannelConfig {
                    channel: Channel::Dig1,
                    mode: DigitalMode::PhotogateTiming,
                },
                DigitalChannelConfig {
                    channel: Channel::Dig2,
                    mode: DigitalMode::Dcu,
                },
            ],
        };
        assert_eq!(config.channel_mask(), 0x20);
    }

    #[test]
    fn test_mode_flags_collect() {
        let configs = vec![
            DeviceConfig {
                analog: Vec::new(),
                digital: vec![DigitalChannelConfig {
                    channel: Channel::Dig1,
                    mode: DigitalMode::Motion,
                }],
            },
            DeviceConfig {
                analog: Vec::new(),
                digital: vec![DigitalChannelConfig {
                    channel: Channel::Dig1,
                    mode: DigitalMode::DcuPwm,
                }],
            },
        ];
        let flags = ModeFlags::collect(&configs);
        assert!(flags.motion);
        assert!(flags.dcu_pwm);
        assert!(!flags.rotary);
    }

    #[test]
    fn test_assignments_serde() {
        let assignments: ChannelAssignments = serde_json::from_str(
            r#"{"ch1": "sensor", "ch2": {"sensor_cal": 1}, "dig1": "photogate_count"}"#,
        )
        .unwrap();
        assert_eq!(assignments.ch1, AnalogMode::Sensor);
        assert_eq!(assignments.ch2, AnalogMode::SensorCal(1));
        assert_eq!(assignments.ch3, AnalogMode::NoSensor);
        assert_eq!(assignments.dig1, DigitalMode::PhotogateCount);
    }
}
