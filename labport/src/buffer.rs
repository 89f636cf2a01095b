//! Per-channel overflow buffering for multi-point reads.
//!
//! A multi-point read asks every enabled channel for N measurements, but
//! the device may hand back more than N for a fast channel. The extras
//! are parked here and drained first on the next read, so column
//! alignment across channels is preserved.

use std::collections::VecDeque;

use labport_shared::{Channel, MAX_DEVICES, NUM_ANALOG_CHANNELS, NUM_DIG_CHANNELS};

const SLOTS: usize = NUM_ANALOG_CHANNELS + NUM_DIG_CHANNELS;

/// Fixed arena of measurement queues, one per channel slot per device.
#[derive(Clone, Debug)]
pub struct OverflowBuffers {
    queues: [[VecDeque<f64>; SLOTS]; MAX_DEVICES],
}

impl Default for OverflowBuffers {
    fn default() -> Self {
        Self {
            queues: std::array::from_fn(|_| std::array::from_fn(|_| VecDeque::new())),
        }
    }
}

impl OverflowBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, device: usize, channel: Channel) -> &mut VecDeque<f64> {
        &mut self.queues[device][channel.slot()]
    }

    /// Take the oldest buffered value for a channel, if any.
    pub fn pop(&mut self, device: usize, channel: Channel) -> Option<f64> {
        self.queue_mut(device, channel).pop_front()
    }

    /// Park values that arrived beyond what the current read consumed.
    pub fn push_excess(&mut self, device: usize, channel: Channel, values: &[f64]) {
        self.queue_mut(device, channel).extend(values.iter().copied());
    }

    /// Number of buffered values for one channel.
    pub fn pending(&self, device: usize, channel: Channel) -> usize {
        self.queues[device][channel.slot()].len()
    }

    /// True when no channel on any device has buffered values.
    pub fn is_empty(&self) -> bool {
        self.queues
            .iter()
            .all(|device| device.iter().all(|q| q.is_empty()))
    }

    /// Drop everything, for session stop.
    pub fn clear(&mut self) {
        for device in self.queues.iter_mut() {
            for queue in device.iter_mut() {
                queue.clear();
            }
        }
    }
}
