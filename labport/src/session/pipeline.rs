//! The periodic measurement pipeline: raw counts to calibrated values.
//!
//! `read()` returns one value per enabled input channel, or `None` for
//! the whole cycle when any channel times out or fails. Partial rows are
//! never returned, so column alignment across channels always holds.

use tracing::{debug, warn};

use crate::poll::{wait_for_samples, wait_for_samples_multi_pt};
use crate::registry::DigitalMode;
use crate::session::Session;
use crate::transport::Transport;

/// Ultrasonic pulse speed at room temperature, meters per millisecond.
const SPEED_OF_SOUND_M_PER_MS: f64 = 0.34;

/// Quadrature counts per degree on the high-resolution rotary setting.
const HIGH_RES_COUNTS_PER_DEGREE: f64 = 4.0;

impl<T: Transport> Session<T> {
    /// One measurement cycle: a value per enabled input channel, analog
    /// first, then motion, rotary, and photogate counts.
    ///
    /// `None` means the cycle produced nothing usable: not started,
    /// a channel timed out, or the transport failed mid-read. With only
    /// output or timing channels configured there are no periodic inputs
    /// and the cycle succeeds with an empty row.
    pub fn read(&mut self) -> Option<Vec<f64>> {
        if !self.running {
            warn!("read() called before start()");
            return None;
        }

        let mut row = Vec::new();
        if self.configs.iter().any(|c| !c.analog.is_empty()) {
            row.extend(self.read_analog()?);
        }
        if self.flags.motion {
            row.extend(self.read_motion()?);
        }
        if self.flags.rotary {
            row.extend(self.read_rotary()?);
        }
        if self.flags.photogate_count {
            row.extend(self.read_photogate_counts()?);
        }
        Some(row)
    }

    /// A block of `count` consecutive measurements per enabled analog
    /// channel, one inner vector per channel in column order.
    pub fn read_multi_pt(&mut self, count: usize) -> Option<Vec<Vec<f64>>> {
        if !self.running {
            warn!("read_multi_pt() called before start()");
            return None;
        }

        let Self {
            transport,
            configs,
            handles,
            sample_period,
            ..
        } = self;
        let period = *sample_period;

        let mut columns = Vec::new();
        for (&handle, config) in handles.iter().zip(configs.iter()) {
            for analog in &config.analog {
                let available =
                    wait_for_samples_multi_pt(transport, handle, analog.channel, period, count);
                if available < count {
                    warn!(
                        "timed out waiting for {count} measurements on {}",
                        analog.channel.label()
                    );
                    return None;
                }

                let samples = match transport.read_raw(handle, analog.channel, count) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", analog.channel.label());
                        return None;
                    }
                };
                let mut column = Vec::with_capacity(samples.len());
                for sample in samples {
                    let volts = match transport.voltage_from_raw(
                        handle,
                        analog.channel,
                        sample.raw,
                        analog.probe,
                    ) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("voltage conversion failed on {}: {e}", analog.channel.label());
                            return None;
                        }
                    };
                    column.push(analog.calibration.apply(volts));
                }
                columns.push(column);
            }
        }
        Some(columns)
    }

    /// One calibrated value per analog channel. Each channel drains its
    /// overflow buffer before the hardware is touched, so values stay in
    /// arrival order even when per-channel counts run uneven.
    fn read_analog(&mut self) -> Option<Vec<f64>> {
        let Self {
            transport,
            buffers,
            configs,
            handles,
            sample_period,
            ..
        } = self;
        let period = *sample_period;

        let mut row = Vec::new();
        for (device, (&handle, config)) in handles.iter().zip(configs.iter()).enumerate() {
            for analog in &config.analog {
                if let Some(value) = buffers.pop(device, analog.channel) {
                    debug!("serving {} from the overflow buffer", analog.channel.label());
                    row.push(value);
                    continue;
                }

                let available = wait_for_samples(transport, handle, analog.channel, period, 1);
                if available == 0 {
                    warn!(
                        "timed out waiting for a measurement on {}",
                        analog.channel.label()
                    );
                    return None;
                }
                let samples = match transport.read_raw(handle, analog.channel, available) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", analog.channel.label());
                        return None;
                    }
                };
                if samples.is_empty() {
                    warn!("no measurements returned on {}", analog.channel.label());
                    return None;
                }

                let mut calibrated = Vec::with_capacity(samples.len());
                for sample in samples {
                    let volts = match transport.voltage_from_raw(
                        handle,
                        analog.channel,
                        sample.raw,
                        analog.probe,
                    ) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(
                                "voltage conversion failed on {}: {e}",
                                analog.channel.label()
                            );
                            return None;
                        }
                    };
                    calibrated.push(analog.calibration.apply(volts));
                }
                row.push(calibrated[0]);
                buffers.push_excess(device, analog.channel, &calibrated[1..]);
            }
        }
        Some(row)
    }

    /// Distance in meters per motion channel, from the paired trigger
    /// and echo timestamps.
    fn read_motion(&mut self) -> Option<Vec<f64>> {
        let Self {
            transport,
            configs,
            handles,
            sample_period,
            ..
        } = self;
        let period = *sample_period;

        let mut row = Vec::new();
        for (&handle, config) in handles.iter().zip(configs.iter()) {
            for channel in config.digital_with_mode(DigitalMode::Motion) {
                let available = wait_for_samples(transport, handle, channel, period, 2);
                if available < 2 {
                    warn!("timed out waiting for an echo pair on {}", channel.label());
                    return None;
                }
                let samples = match transport.read_raw(handle, channel, available) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", channel.label());
                        return None;
                    }
                };

                let mut trigger = None;
                let mut echo = None;
                for sample in &samples {
                    match sample.raw {
                        0 => trigger = Some(sample.timestamp),
                        1 => echo = Some(sample.timestamp),
                        other => debug!("unexpected motion tag {other} on {}", channel.label()),
                    }
                }
                let (Some(trigger), Some(echo)) = (trigger, echo) else {
                    warn!("unpaired echo measurements on {}", channel.label());
                    return None;
                };

                // Round trip time in ms; halve for the one-way distance
                let round_trip_ms = (echo - trigger) as f64 / 1000.0;
                row.push(SPEED_OF_SOUND_M_PER_MS * round_trip_ms / 2.0);
            }
        }
        Some(row)
    }

    /// Angle in degrees per rotary channel, buffered like analog values.
    fn read_rotary(&mut self) -> Option<Vec<f64>> {
        let Self {
            transport,
            buffers,
            configs,
            handles,
            sample_period,
            ..
        } = self;
        let period = *sample_period;

        let mut row = Vec::new();
        for (device, (&handle, config)) in handles.iter().zip(configs.iter()).enumerate() {
            for dig in config.digital.iter().filter(|d| {
                matches!(
                    d.mode,
                    DigitalMode::RotaryMotion | DigitalMode::RotaryMotionHighRes
                )
            }) {
                if let Some(value) = buffers.pop(device, dig.channel) {
                    row.push(value);
                    continue;
                }

                let available = wait_for_samples(transport, handle, dig.channel, period, 1);
                if available == 0 {
                    warn!("timed out waiting for a measurement on {}", dig.channel.label());
                    return None;
                }
                let samples = match transport.read_raw(handle, dig.channel, available) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", dig.channel.label());
                        return None;
                    }
                };

                let angles: Vec<f64> = samples
                    .iter()
                    .map(|s| {
                        if dig.mode == DigitalMode::RotaryMotionHighRes {
                            s.raw as f64 / HIGH_RES_COUNTS_PER_DEGREE
                        } else {
                            s.raw as f64
                        }
                    })
                    .collect();
                row.push(angles[0]);
                buffers.push_excess(device, dig.channel, &angles[1..]);
            }
        }
        Some(row)
    }

    /// Most recent event count per photogate counting channel.
    fn read_photogate_counts(&mut self) -> Option<Vec<f64>> {
        let Self {
            transport,
            configs,
            handles,
            sample_period,
            ..
        } = self;
        let period = *sample_period;

        let mut row = Vec::new();
        for (&handle, config) in handles.iter().zip(configs.iter()) {
            for channel in config.digital_with_mode(DigitalMode::PhotogateCount) {
                let available = wait_for_samples(transport, handle, channel, period, 1);
                if available == 0 {
                    warn!("timed out waiting for a count on {}", channel.label());
                    return None;
                }
                let samples = match transport.read_raw(handle, channel, available) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("raw read failed on {}: {e}", channel.label());
                        return None;
                    }
                };
                // The counter is cumulative; only the newest value matters
                let last = samples.last()?;
                row.push(last.raw as f64);
            }
        }
        Some(row)
    }
}
