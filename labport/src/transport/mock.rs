//! Scriptable in-memory transport for tests and hardware-free development.

use std::collections::VecDeque;

use labport_shared::commands::command_ids;
use labport_shared::{Channel, DeviceType, ParameterBlock, VoltageProbe};

use super::{DeviceHandle, Sample, SensorRecord, Transport};

/// Record of one command sent through the mock, for assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentCommand {
    pub handle: DeviceHandle,
    pub command: u8,
    pub payload: Vec<u8>,
}

/// Scripted state for one channel of a mock device.
#[derive(Debug, Default)]
pub struct MockChannel {
    /// Sensor id reported by the 0x28 query. 0 = nothing plugged in,
    /// 1..=19 resistor-coded, >=20 auto-ID.
    pub sensor_id: i32,

    /// Descriptor "stored on the sensor", pulled by `read_sensor_record`.
    pub onboard: SensorRecord,

    /// Host-side descriptor record.
    pub record: SensorRecord,

    /// Scripted responses for `available_count`, consumed front to back.
    /// When exhausted, the current sample queue length is reported.
    pub counts: VecDeque<usize>,

    /// Raw measurements served by `read_raw`.
    pub samples: VecDeque<Sample>,
}

impl MockChannel {
    pub fn push_samples(&mut self, samples: &[(i32, i64)]) {
        for &(raw, timestamp) in samples {
            self.samples.push_back(Sample { raw, timestamp });
        }
    }

    pub fn script_counts(&mut self, counts: &[usize]) {
        self.counts.extend(counts.iter().copied());
    }
}

/// One mock device: five channels plus device-level state.
#[derive(Debug, Default)]
pub struct MockDevice {
    channels: [MockChannel; 5],
    pub period_s: f64,
    pub owned: bool,
    pub closed: bool,
}

impl MockDevice {
    pub fn channel_mut(&mut self, channel: Channel) -> &mut MockChannel {
        &mut self.channels[channel.slot()]
    }
}

/// In-memory [`Transport`] with per-channel scripting and a log of every
/// command frame sent, so tests can assert on the wire traffic.
#[derive(Debug)]
pub struct MockTransport {
    device_type: DeviceType,
    pub devices: Vec<MockDevice>,
    pub sent: Vec<SentCommand>,
    /// Raw-to-voltage scale: one raw count is this many volts.
    pub volts_per_count: f64,
}

impl MockTransport {
    pub fn new(device_type: DeviceType, num_devices: usize) -> Self {
        let devices = (0..num_devices).map(|_| MockDevice::default()).collect();
        Self {
            device_type,
            devices,
            sent: Vec::new(),
            volts_per_count: 1e-3,
        }
    }

    pub fn device_mut(&mut self, index: usize) -> &mut MockDevice {
        &mut self.devices[index]
    }

    /// All logged sends of one command id, in order.
    pub fn sent_with_command(&self, command: u8) -> Vec<&SentCommand> {
        self.sent.iter().filter(|s| s.command == command).collect()
    }

    fn device_index(handle: DeviceHandle) -> usize {
        handle.0 as usize - 1
    }

    fn channel_state(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
    ) -> Result<&mut MockChannel, String> {
        let index = Self::device_index(handle);
        let device = self
            .devices
            .get_mut(index)
            .ok_or_else(|| format!("no device for handle {handle:?}"))?;
        if device.closed {
            return Err(format!("device {index} is closed"));
        }
        Ok(device.channel_mut(channel))
    }
}

impl Transport for MockTransport {
    fn open_devices(&mut self, device_type: DeviceType) -> Result<Vec<DeviceHandle>, String> {
        if device_type != self.device_type {
            return Ok(Vec::new());
        }
        Ok((1..=self.devices.len() as u64).map(DeviceHandle).collect())
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), String> {
        let index = Self::device_index(handle);
        let device = self
            .devices
            .get_mut(index)
            .ok_or_else(|| format!("no device for handle {handle:?}"))?;
        device.closed = true;
        Ok(())
    }

    fn acquire_exclusive_ownership(&mut self, handle: DeviceHandle) -> Result<(), String> {
        let index = Self::device_index(handle);
        self.devices
            .get_mut(index)
            .ok_or_else(|| format!("no device for handle {handle:?}"))?
            .owned = true;
        Ok(())
    }

    fn send_command(
        &mut self,
        handle: DeviceHandle,
        command: u8,
        params: &ParameterBlock,
    ) -> Result<Vec<u8>, String> {
        self.sent.push(SentCommand {
            handle,
            command,
            payload: params.payload().to_vec(),
        });

        if command == command_ids::GET_SENSOR_ID {
            let channel = Channel::from(params.bytes[0]);
            let id = self.channel_state(handle, channel)?.sensor_id;
            return Ok(id.to_le_bytes().to_vec());
        }

        Ok(Vec::new())
    }

    fn available_count(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
    ) -> Result<usize, String> {
        let state = self.channel_state(handle, channel)?;
        Ok(state
            .counts
            .pop_front()
            .unwrap_or_else(|| state.samples.len()))
    }

    fn read_raw(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        max_count: usize,
    ) -> Result<Vec<Sample>, String> {
        let state = self.channel_state(handle, channel)?;
        let n = max_count.min(state.samples.len());
        Ok(state.samples.drain(..n).collect())
    }

    fn voltage_from_raw(
        &mut self,
        _handle: DeviceHandle,
        _channel: Channel,
        raw: i32,
        _probe: VoltageProbe,
    ) -> Result<f64, String> {
        Ok(raw as f64 * self.volts_per_count)
    }

    fn set_measurement_period(
        &mut self,
        handle: DeviceHandle,
        _channel: Option<Channel>,
        period_s: f64,
    ) -> Result<(), String> {
        let index = Self::device_index(handle);
        self.devices
            .get_mut(index)
            .ok_or_else(|| format!("no device for handle {handle:?}"))?
            .period_s = period_s;
        Ok(())
    }

    fn measurement_period(
        &mut self,
        handle: DeviceHandle,
        _channel: Option<Channel>,
    ) -> Result<f64, String> {
        let index = Self::device_index(handle);
        Ok(self
            .devices
            .get(index)
            .ok_or_else(|| format!("no device for handle {handle:?}"))?
            .period_s)
    }

    fn read_sensor_record(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
    ) -> Result<(), String> {
        let state = self.channel_state(handle, channel)?;
        state.record = state.onboard.clone();
        Ok(())
    }

    fn sensor_record(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
    ) -> Result<SensorRecord, String> {
        Ok(self.channel_state(handle, channel)?.record.clone())
    }

    fn write_sensor_record(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        record: &SensorRecord,
    ) -> Result<(), String> {
        self.channel_state(handle, channel)?.record = record.clone();
        Ok(())
    }

    fn set_active_cal_page(
        &mut self,
        handle: DeviceHandle,
        channel: Channel,
        page: u8,
    ) -> Result<(), String> {
        self.channel_state(handle, channel)?.record.active_cal_page = page;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use labport_shared::commands::SensorIdQuery;
    use labport_shared::CommandFrame;

    #[test]
    fn test_open_wrong_type_is_empty() {
        let mut t = MockTransport::new(DeviceType::Mini, 2);
        assert!(t.open_devices(DeviceType::Stream).unwrap().is_empty());
        assert_eq!(t.open_devices(DeviceType::Mini).unwrap().len(), 2);
    }

    #[test]
    fn test_sensor_id_roundtrip() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        t.device_mut(0).channel_mut(Channel::Ch2).sensor_id = 33;

        let handle = t.open_devices(DeviceType::Mini).unwrap()[0];
        let query = SensorIdQuery::new(Channel::Ch2);
        let resp = t
            .send_command(handle, command_ids::GET_SENSOR_ID, &query.to_parameter_block())
            .unwrap();
        assert_eq!(SensorIdQuery::parse_response(&resp), 33);
    }

    #[test]
    fn test_scripted_counts_then_queue_len() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        {
            let ch = t.device_mut(0).channel_mut(Channel::Ch1);
            ch.script_counts(&[0, 0]);
            ch.push_samples(&[(1, 10), (2, 20)]);
        }
        let handle = DeviceHandle(1);
        assert_eq!(t.available_count(handle, Channel::Ch1).unwrap(), 0);
        assert_eq!(t.available_count(handle, Channel::Ch1).unwrap(), 0);
        assert_eq!(t.available_count(handle, Channel::Ch1).unwrap(), 2);

        let samples = t.read_raw(handle, Channel::Ch1, 10).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Sample { raw: 1, timestamp: 10 });
    }

    #[test]
    fn test_closed_device_errors() {
        let mut t = MockTransport::new(DeviceType::Mini, 1);
        let handle = DeviceHandle(1);
        t.close_device(handle).unwrap();
        assert!(t.available_count(handle, Channel::Ch1).is_err());
    }
}
