//! The acquisition session: device discovery, channel configuration,
//! and run lifecycle.
//!
//! A [`Session`] owns the transport and every piece of per-run state.
//! The lifecycle is open, configure, start, read (any number of times),
//! stop, close; start after stop is allowed for another run with the
//! same configuration.

mod dcu;
mod pipeline;
mod timing;

use std::thread::sleep;
use std::time::Duration;

use tracing::{info, warn};

use labport_shared::commands::{
    AnalogInputSelect, ChannelEnableMask, DigitalCounterReset, IoDirectionConfig, IoWrite,
    LedState, SamplingModeSelect, StartMeasurements, StopMeasurements,
};
use labport_shared::{
    AnalogInputRange, Channel, CommandFrame, DeviceType, MAX_DEVICES,
};

use crate::buffer::OverflowBuffers;
use crate::registry::{
    self, AnalogChannelConfig, ChannelAssignments, DeviceConfig, DigitalMode, ModeFlags,
};
use crate::transport::{DeviceHandle, SensorRecord, Transport};

/// Settle time between stopping measurements and draining what the
/// device buffered.
const STOP_DRAIN_DELAY: Duration = Duration::from_secs(1);

/// Pack and send one typed command frame.
pub(crate) fn send_frame<F: CommandFrame>(
    transport: &mut dyn Transport,
    handle: DeviceHandle,
    frame: &F,
) -> Result<(), String> {
    transport.send_command(handle, F::COMMAND, &frame.to_parameter_block())?;
    Ok(())
}

/// Input range selection follows the sensor's operation type.
fn analog_range(config: &AnalogChannelConfig) -> AnalogInputRange {
    if config.record.operation_type == SensorRecord::OP_TYPE_10V {
        AnalogInputRange::Range10V
    } else {
        AnalogInputRange::Range5V
    }
}

/// Description of one enabled channel, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: Channel,
    pub name: String,
    pub units: String,
}

/// One acquisition session over every attached device of one type.
pub struct Session<T: Transport> {
    transport: T,
    device_type: DeviceType,
    handles: Vec<DeviceHandle>,
    configs: Vec<DeviceConfig>,
    flags: ModeFlags,
    buffers: OverflowBuffers,
    sample_period: Duration,
    running: bool,
}

impl<T: Transport> Session<T> {
    /// Scan for attached devices and open every one of the first type
    /// found. Fails when nothing is attached.
    pub fn open(mut transport: T) -> Result<Self, String> {
        let mut found: Option<(DeviceType, Vec<DeviceHandle>)> = None;
        for device_type in DeviceType::ALL {
            let handles = transport.open_devices(device_type)?;
            if !handles.is_empty() {
                info!("found {} {} device(s)", handles.len(), device_type.name());
                found = Some((device_type, handles));
                break;
            }
        }
        let (device_type, mut handles) =
            found.ok_or_else(|| "no attached devices found".to_owned())?;

        if handles.len() > MAX_DEVICES {
            warn!(
                "{} devices attached, only the first {MAX_DEVICES} will be used",
                handles.len()
            );
            for extra in handles.split_off(MAX_DEVICES) {
                transport.close_device(extra)?;
            }
        }

        // The Mini has no built-in app to take control from; its LED
        // signals a healthy connection instead
        for &handle in &handles {
            if device_type == DeviceType::Mini {
                send_frame(&mut transport, handle, &LedState::green())?;
            } else {
                transport.acquire_exclusive_ownership(handle)?;
            }
        }

        Ok(Self {
            transport,
            device_type,
            handles,
            configs: Vec::new(),
            flags: ModeFlags::default(),
            buffers: OverflowBuffers::new(),
            sample_period: Duration::from_secs(1),
            running: false,
        })
    }

    /// Identify sensors and bind calibrations per the assignments, one
    /// entry per device. Devices beyond the slice are left unconfigured.
    pub fn configure(&mut self, assignments: &[ChannelAssignments]) -> Result<(), String> {
        if assignments.len() > self.handles.len() {
            warn!(
                "{} channel assignments for {} device(s), extras ignored",
                assignments.len(),
                self.handles.len()
            );
        }

        self.configs.clear();
        for (index, (&handle, assignment)) in
            self.handles.iter().zip(assignments.iter()).enumerate()
        {
            let config =
                registry::configure_device(&mut self.transport, handle, index, assignment)?;
            self.configs.push(config);
        }

        self.flags = ModeFlags::collect(&self.configs);
        if !self.configs.iter().any(|c| c.is_active()) {
            warn!("no channels enabled on any device");
        }
        Ok(())
    }

    /// Program the hardware and begin periodic sampling.
    ///
    /// `reset_counters` zeroes the event counters of counting channels,
    /// which is wanted for a fresh run but not when resuming.
    pub fn start(&mut self, period: Duration, reset_counters: bool) -> Result<(), String> {
        if self.configs.is_empty() {
            return Err("configure() must run before start()".to_owned());
        }

        for (&handle, config) in self.handles.iter().zip(self.configs.iter()) {
            self.transport
                .set_measurement_period(handle, None, period.as_secs_f64())?;
            let actual = self.transport.measurement_period(handle, None)?;
            info!(
                "sampling at {:.3} s/sample ({:.1} samples/s)",
                actual,
                1.0 / actual
            );

            for analog in &config.analog {
                send_frame(
                    &mut self.transport,
                    handle,
                    &AnalogInputSelect::new(analog.channel, analog_range(analog)),
                )?;
            }

            send_frame(
                &mut self.transport,
                handle,
                &ChannelEnableMask {
                    mask: config.channel_mask(),
                },
            )?;

            for dig in &config.digital {
                if let Some(mode) = dig.mode.sampling_mode() {
                    send_frame(
                        &mut self.transport,
                        handle,
                        &SamplingModeSelect::new(dig.channel, mode),
                    )?;
                }
            }

            if reset_counters {
                for dig in config.digital.iter().filter(|d| d.mode.uses_counter()) {
                    send_frame(
                        &mut self.transport,
                        handle,
                        &DigitalCounterReset::zero(dig.channel),
                    )?;
                }
            }

            for dig in config.digital.iter().filter(|d| d.mode.is_output()) {
                send_frame(&mut self.transport, handle, &IoWrite::new(dig.channel, 0))?;
                send_frame(
                    &mut self.transport,
                    handle,
                    &IoDirectionConfig::outputs(dig.channel),
                )?;
                // Plain output mode gets the lines driven low once more
                // after direction config; PWM leaves them to the waveform
                if dig.mode == DigitalMode::Dcu {
                    send_frame(&mut self.transport, handle, &IoWrite::new(dig.channel, 0))?;
                }
            }

            send_frame(&mut self.transport, handle, &StartMeasurements)?;
        }

        self.sample_period = period;
        self.running = true;
        Ok(())
    }

    /// Stop sampling, drain everything still buffered on the devices,
    /// and quiesce outputs.
    pub fn stop(&mut self) -> Result<(), String> {
        for &handle in &self.handles {
            send_frame(&mut self.transport, handle, &StopMeasurements)?;
        }

        // Let in-flight measurements land before draining
        sleep(STOP_DRAIN_DELAY);
        self.drain_device_buffers()?;
        self.buffers.clear();

        if self.flags.dcu {
            self.dcu_all_off()?;
        }
        if self.flags.dcu_pwm {
            self.halt_pwm()?;
        }

        self.running = false;
        Ok(())
    }

    /// Close every device handle, consuming the session. Stops the run
    /// first if one is still going.
    pub fn close(mut self) -> Result<(), String> {
        if self.running {
            self.stop()?;
        }
        for &handle in &self.handles {
            self.transport.close_device(handle)?;
        }
        Ok(())
    }

    /// The full sensor descriptor currently loaded for a channel, read
    /// back from the transport.
    pub fn sensor_record(
        &mut self,
        device: usize,
        channel: Channel,
    ) -> Result<SensorRecord, String> {
        let &handle = self
            .handles
            .get(device)
            .ok_or_else(|| format!("no open device at index {device}"))?;
        self.transport.sensor_record(handle, channel)
    }

    /// Read out and discard whatever the devices still hold for the
    /// sampled input channels.
    fn drain_device_buffers(&mut self) -> Result<(), String> {
        for (&handle, config) in self.handles.iter().zip(self.configs.iter()) {
            let mut channels: Vec<Channel> =
                config.analog.iter().map(|a| a.channel).collect();
            channels.extend(
                config
                    .digital
                    .iter()
                    .filter(|d| d.mode.is_input())
                    .map(|d| d.channel),
            );
            for channel in channels {
                let available = self.transport.available_count(handle, channel)?;
                if available > 0 {
                    self.transport.read_raw(handle, channel, available)?;
                }
            }
        }
        Ok(())
    }

    /// Names and units of every enabled channel, per device, in read
    /// column order within each group.
    pub fn channel_info(&self) -> Vec<Vec<ChannelInfo>> {
        self.configs
            .iter()
            .map(|config| {
                let mut info: Vec<ChannelInfo> = config
                    .analog
                    .iter()
                    .map(|a| ChannelInfo {
                        channel: a.channel,
                        name: a.record.long_name.clone(),
                        units: a.calibration.units.clone(),
                    })
                    .collect();
                info.extend(config.digital.iter().map(|d| ChannelInfo {
                    channel: d.channel,
                    name: format!("{:?}", d.mode),
                    units: digital_units(d.mode).to_owned(),
                }));
                info
            })
            .collect()
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Direct transport access, for tests and diagnostics.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn digital_units(mode: DigitalMode) -> &'static str {
    match mode {
        DigitalMode::Motion => "(m)",
        DigitalMode::PhotogateCount => "(count)",
        DigitalMode::PhotogateTiming => "(s)",
        DigitalMode::RotaryMotion | DigitalMode::RotaryMotionHighRes => "(deg)",
        DigitalMode::Dcu | DigitalMode::DcuPwm | DigitalMode::NoSensor => "",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::AnalogMode;
    use crate::transport::MockTransport;
    use labport_shared::commands::command_ids;

    fn force_record() -> SensorRecord {
        SensorRecord {
            long_name: "Force".to_owned(),
            short_name: "F".to_owned(),
            operation_type: 14,
            calibration_equation: 1,
            highest_cal_page: 0,
            active_cal_page: 0,
            pages: Default::default(),
        }
    }

    #[test]
    fn test_open_fails_with_no_devices() {
        let transport = MockTransport::new(DeviceType::Mini, 0);
        assert!(Session::open(transport).is_err());
    }

    #[test]
    fn test_open_mini_lights_led() {
        let transport = MockTransport::new(DeviceType::Mini, 1);
        let mut session = Session::open(transport).unwrap();
        let sent = session.transport_mut().sent_with_command(command_ids::SET_LED_STATE);
        assert_eq!(sent.len(), 1);
        assert!(!session.transport_mut().devices[0].owned);
    }

    #[test]
    fn test_open_stream_takes_ownership() {
        let transport = MockTransport::new(DeviceType::Stream, 2);
        let mut session = Session::open(transport).unwrap();
        assert_eq!(session.device_type(), DeviceType::Stream);
        assert!(session.transport_mut().devices.iter().all(|d| d.owned));
    }

    #[test]
    fn test_start_requires_configuration() {
        let transport = MockTransport::new(DeviceType::Mini, 1);
        let mut session = Session::open(transport).unwrap();
        assert!(session.start(Duration::from_millis(100), true).is_err());
    }

    #[test]
    fn test_start_command_sequence() {
        let mut transport = MockTransport::new(DeviceType::Mini, 1);
        {
            let ch = transport.device_mut(0).channel_mut(Channel::Ch1);
            ch.sensor_id = 33;
            ch.onboard = force_record();
        }
        let mut session = Session::open(transport).unwrap();
        session
            .configure(&[ChannelAssignments {
                ch1: AnalogMode::Sensor,
                dig1: DigitalMode::PhotogateCount,
                dig2: DigitalMode::Dcu,
                ..Default::default()
            }])
            .unwrap();
        session.start(Duration::from_millis(50), true).unwrap();
        assert!(session.is_running());

        let t = session.transport_mut();
        assert!((t.devices[0].period_s - 0.05).abs() < 1e-12);

        // 5V sensor selects the narrow range
        let analog = t.sent_with_command(command_ids::SET_ANALOG_INPUT);
        assert_eq!(analog[0].payload, vec![1, 0]);

        // Mask: ch1 plus dig1 input; the DCU on dig2 contributes nothing
        let mask = t.sent_with_command(command_ids::SET_SENSOR_CHANNEL_ENABLE_MASK);
        assert_eq!(mask[0].payload, vec![0x22, 0, 0, 0]);

        let modes = t.sent_with_command(command_ids::SET_SAMPLING_MODE);
        assert_eq!(modes[0].payload, vec![5, 2]);
        assert_eq!(modes[1].payload, vec![6, 6]);

        // Counter reset for the photogate, not the DCU
        let resets = t.sent_with_command(command_ids::SET_DIGITAL_COUNTER);
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].payload, vec![5, 0]);

        // DCU lines: write low, direction to output, write low again
        assert_eq!(t.sent_with_command(command_ids::WRITE_IO).len(), 2);
        assert_eq!(t.sent_with_command(command_ids::WRITE_IO_CONFIG).len(), 1);

        assert_eq!(t.sent_with_command(command_ids::START_MEASUREMENTS).len(), 1);
    }

    #[test]
    fn test_channel_info() {
        let mut transport = MockTransport::new(DeviceType::Mini, 1);
        {
            let ch = transport.device_mut(0).channel_mut(Channel::Ch1);
            ch.sensor_id = 33;
            ch.onboard = force_record();
        }
        let mut session = Session::open(transport).unwrap();
        session
            .configure(&[ChannelAssignments {
                ch1: AnalogMode::Sensor,
                dig1: DigitalMode::Motion,
                ..Default::default()
            }])
            .unwrap();

        let info = session.channel_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0][0].name, "Force");
        assert_eq!(info[0][1].channel, Channel::Dig1);
        assert_eq!(info[0][1].units, "(m)");
    }
}
