//! Photogate gate timing: intervals between successive blocked and
//! unblocked edges.
//!
//! Edge timestamps arrive aperiodically, so the wait is bounded by a
//! caller-supplied timeout rather than the sampling period. The first
//! timestamp only anchors the series; `n` intervals need `n + 2` edges.

use tracing::warn;

use crate::poll::wait_for_samples;
use crate::registry::DigitalMode;
use crate::session::Session;
use crate::transport::Transport;

const MICROS_PER_SECOND: f64 = 1e6;

impl<T: Transport> Session<T> {
    /// Block until `intervals` gate intervals are captured, or until
    /// roughly `timeout` has elapsed. Values alternate blocked and
    /// unblocked durations in seconds, concatenated across every gate
    /// timing channel.
    pub fn photogate_timing(
        &mut self,
        intervals: usize,
        timeout: std::time::Duration,
    ) -> Option<Vec<f64>> {
        if !self.running {
            warn!("photogate_timing() called before start()");
            return None;
        }

        let Self {
            transport,
            configs,
            handles,
            ..
        } = self;
        // The bounded poller spans three times its period; a third of
        // the timeout makes the total wait come out at the timeout
        let poll_period = timeout / 3;
        let edges_needed = intervals + 2;

        let mut values = Vec::new();
        let mut saw_channel = false;
        for (&handle, config) in handles.iter().zip(configs.iter()) {
            for channel in config.digital_with_mode(DigitalMode::PhotogateTiming) {
                saw_channel = true;
                let available =
                    wait_for_samples(transport, handle, channel, poll_period, edges_needed);
                if available < edges_needed {
                    warn!(
                        "timed out waiting for {edges_needed} edges on {}",
                        channel.label()
                    );
                    return None;
                }
                let samples = match transport.read_raw(handle, channel, available) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", channel.label());
                        return None;
                    }
                };
                let timestamps: Vec<i64> = samples.iter().map(|s| s.timestamp).collect();
                values.extend(to_intervals(&timestamps));
            }
        }

        if !saw_channel {
            warn!("no channel is configured for gate timing");
            return None;
        }
        Some(values)
    }
}

/// Successive differences in seconds, skipping the anchoring first edge.
fn to_intervals(timestamps: &[i64]) -> Vec<f64> {
    timestamps
        .iter()
        .skip(1)
        .zip(timestamps.iter().skip(2))
        .map(|(a, b)| (b - a) as f64 / MICROS_PER_SECOND)
        .collect()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::registry::ChannelAssignments;
    use crate::transport::MockTransport;
    use labport_shared::{Channel, DeviceType};

    #[test]
    fn test_intervals_drop_anchor_edge() {
        // Anchor 100, then edges at 200, 450, 950
        let intervals = to_intervals(&[100, 200, 450, 950]);
        assert_eq!(intervals, vec![0.00025, 0.0005]);
    }

    #[test]
    fn test_gate_timing_read() {
        let mut transport = MockTransport::new(DeviceType::Mini, 1);
        transport.device_mut(0).channel_mut(Channel::Dig1).push_samples(&[
            (1, 0),
            (0, 1_000_000),
            (1, 1_250_000),
            (0, 1_750_000),
        ]);
        let mut session = Session::open(transport).unwrap();
        session
            .configure(&[ChannelAssignments {
                dig1: DigitalMode::PhotogateTiming,
                ..Default::default()
            }])
            .unwrap();
        session.start(Duration::from_millis(1), true).unwrap();

        let values = session
            .photogate_timing(2, Duration::from_millis(3))
            .unwrap();
        assert_eq!(values, vec![0.25, 0.5]);
    }

    #[test]
    fn test_gate_timing_timeout() {
        let transport = MockTransport::new(DeviceType::Mini, 1);
        let mut session = Session::open(transport).unwrap();
        session
            .configure(&[ChannelAssignments {
                dig1: DigitalMode::PhotogateTiming,
                ..Default::default()
            }])
            .unwrap();
        session.start(Duration::from_millis(1), true).unwrap();
        assert_eq!(session.photogate_timing(2, Duration::from_millis(3)), None);
    }

    #[test]
    fn test_gate_timing_without_gate_channel() {
        let transport = MockTransport::new(DeviceType::Mini, 1);
        let mut session = Session::open(transport).unwrap();
        session.configure(&[ChannelAssignments::default()]).unwrap();
        session.start(Duration::from_millis(1), true).unwrap();
        assert_eq!(session.photogate_timing(2, Duration::from_millis(3)), None);
    }
}
