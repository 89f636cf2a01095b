//! Digital control unit outputs: line levels and PWM.

use tracing::{error, warn};

use labport_shared::commands::{IoWrite, PwmConfig, PwmHalt, PWM_DUTY_DENOMINATOR};
use labport_shared::Channel;

use crate::registry::DigitalMode;
use crate::session::{send_frame, Session};
use crate::transport::{DeviceHandle, Transport};

const NANOS_PER_SECOND: f64 = 1e9;

impl<T: Transport> Session<T> {
    /// Drive the output lines of each DCU channel, one value per
    /// channel in device order. Each value holds one bit per line
    /// (0-15). Asking with no DCU configured is a warning, not an error.
    pub fn set_dcu(&mut self, values: &[u8]) -> Result<(), String> {
        let targets = self.dcu_channels(DigitalMode::Dcu);
        if targets.is_empty() {
            warn!("set_dcu() called but no channel is configured as a DCU");
            return Ok(());
        }
        if values.len() < targets.len() {
            warn!(
                "{} output values for {} DCU channel(s), missing channels unchanged",
                values.len(),
                targets.len()
            );
        }

        for (&(handle, channel), &value) in targets.iter().zip(values.iter()) {
            send_frame(&mut self.transport, handle, &IoWrite::new(channel, value))?;
        }
        Ok(())
    }

    /// Drive every DCU output line low.
    pub fn dcu_all_off(&mut self) -> Result<(), String> {
        for (handle, channel) in self.dcu_channels(DigitalMode::Dcu) {
            send_frame(&mut self.transport, handle, &IoWrite::new(channel, 0))?;
        }
        Ok(())
    }

    /// Start a PWM waveform on each PWM-configured channel. Usable
    /// frequencies span 2.5 Hz to 1 MHz; duty cycle is in percent.
    pub fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), String> {
        let targets = self.dcu_channels(DigitalMode::DcuPwm);
        if targets.is_empty() {
            warn!("set_pwm() called but no channel is configured for PWM");
            return Ok(());
        }

        let period_ns = (NANOS_PER_SECOND / frequency_hz).abs().round() as u32;
        let numerator =
            ((duty_cycle / 100.0) * PWM_DUTY_DENOMINATOR as f64).abs().round() as u32;

        for (handle, channel) in targets {
            // The waveform generator only exists behind dig1
            if channel == Channel::Dig2 {
                error!("PWM output is only available from dig1, not dig2");
                continue;
            }
            send_frame(
                &mut self.transport,
                handle,
                &PwmConfig::new(channel, period_ns, numerator),
            )?;
        }
        Ok(())
    }

    /// Halt the PWM waveform on dig1.
    pub fn halt_pwm(&mut self) -> Result<(), String> {
        for (handle, channel) in self.dcu_channels(DigitalMode::DcuPwm) {
            if channel == Channel::Dig1 {
                send_frame(&mut self.transport, handle, &PwmHalt::new(channel))?;
            }
        }
        Ok(())
    }

    fn dcu_channels(&self, mode: DigitalMode) -> Vec<(DeviceHandle, Channel)> {
        self.handles
            .iter()
            .zip(self.configs.iter())
            .flat_map(|(&handle, config)| {
                config
                    .digital_with_mode(mode)
                    .map(move |channel| (handle, channel))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::registry::ChannelAssignments;
    use crate::transport::MockTransport;
    use labport_shared::commands::command_ids;
    use labport_shared::DeviceType;

    fn dcu_session(dig1: DigitalMode, dig2: DigitalMode) -> Session<MockTransport> {
        let transport = MockTransport::new(DeviceType::Mini, 1);
        let mut session = Session::open(transport).unwrap();
        session
            .configure(&[ChannelAssignments {
                dig1,
                dig2,
                ..Default::default()
            }])
            .unwrap();
        session.start(Duration::from_millis(1), true).unwrap();
        session
    }

    #[test]
    fn test_set_dcu_writes_lines() {
        let mut session = dcu_session(DigitalMode::Dcu, DigitalMode::NoSensor);
        session.set_dcu(&[0b1010]).unwrap();

        let t = session.transport_mut();
        let writes = t.sent_with_command(command_ids::WRITE_IO);
        assert_eq!(writes.last().unwrap().payload, vec![5, 0x0F, 0b1010]);
    }

    #[test]
    fn test_dcu_all_off() {
        let mut session = dcu_session(DigitalMode::Dcu, DigitalMode::Dcu);
        session.set_dcu(&[3, 7]).unwrap();
        session.dcu_all_off().unwrap();

        let t = session.transport_mut();
        let writes = t.sent_with_command(command_ids::WRITE_IO);
        let n = writes.len();
        assert_eq!(writes[n - 2].payload, vec![5, 0x0F, 0]);
        assert_eq!(writes[n - 1].payload, vec![6, 0x0F, 0]);
    }

    #[test]
    fn test_set_dcu_without_dcu_is_noop() {
        let mut session = dcu_session(DigitalMode::NoSensor, DigitalMode::NoSensor);
        session.set_dcu(&[1]).unwrap();
        assert!(session
            .transport_mut()
            .sent_with_command(command_ids::WRITE_IO)
            .is_empty());
    }

    #[test]
    fn test_pwm_frame_contents() {
        let mut session = dcu_session(DigitalMode::DcuPwm, DigitalMode::NoSensor);
        // 100 Hz at 25%: 10 ms period, numerator 2500 of 10000
        session.set_pwm(100.0, 25.0).unwrap();

        let t = session.transport_mut();
        let pwm = t.sent_with_command(command_ids::SET_PWM_CONFIG);
        let mut expected = vec![5, 1];
        expected.extend_from_slice(&10_000_000_u32.to_le_bytes());
        expected.extend_from_slice(&2_500_u32.to_le_bytes());
        expected.extend_from_slice(&PWM_DUTY_DENOMINATOR.to_le_bytes());
        assert_eq!(pwm[0].payload, expected);
    }

    #[test]
    fn test_pwm_on_dig2_is_noop() {
        let mut session = dcu_session(DigitalMode::NoSensor, DigitalMode::DcuPwm);
        session.set_pwm(100.0, 50.0).unwrap();
        session.halt_pwm().unwrap();

        let t = session.transport_mut();
        assert!(t.sent_with_command(command_ids::SET_PWM_CONFIG).is_empty());
    }

    #[test]
    fn test_halt_pwm() {
        let mut session = dcu_session(DigitalMode::DcuPwm, DigitalMode::NoSensor);
        session.set_pwm(1000.0, 50.0).unwrap();
        session.halt_pwm().unwrap();

        let t = session.transport_mut();
        let pwm = t.sent_with_command(command_ids::SET_PWM_CONFIG);
        assert_eq!(pwm.last().unwrap().payload, vec![5, 0]);
    }
}
