//! Bounded polling for measurement availability.
//!
//! The device buffers measurements on its own clock, so a read first
//! waits for enough to accumulate. The wait is a bounded retry loop
//! keyed to the sampling period; transport failures are not retried.

use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, warn};

use labport_shared::Channel;

use crate::transport::{DeviceHandle, Transport};

/// Availability checks per wait before giving up.
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// Wait until at least `needed` measurements are buffered for a channel,
/// checking up to [`MAX_POLL_ATTEMPTS`] times and sleeping a tenth of the
/// sampling period between checks. Returns the last observed count, which
/// is below `needed` when the wait timed out.
pub fn wait_for_samples(
    transport: &mut dyn Transport,
    handle: DeviceHandle,
    channel: Channel,
    sample_period: Duration,
    needed: usize,
) -> usize {
    let pause = sample_period / 10;
    let mut count = 0;
    for attempt in 0..MAX_POLL_ATTEMPTS {
        count = match transport.available_count(handle, channel) {
            Ok(n) => n,
            Err(e) => {
                debug!("availability check failed on {}: {e}", channel.label());
                return 0;
            }
        };
        if count >= needed {
            return count;
        }
        if attempt + 1 < MAX_POLL_ATTEMPTS {
            sleep(pause);
        }
    }
    warn!(
        "timed out waiting for {needed} measurements on {}, have {count}",
        channel.label()
    );
    count
}

/// Multi-point variant: sleep through the expected capture window first,
/// then fall into the bounded poll. Avoids burning the retry budget while
/// the device is still mid-capture.
pub fn wait_for_samples_multi_pt(
    transport: &mut dyn Transport,
    handle: DeviceHandle,
    channel: Channel,
    sample_period: Duration,
    needed: usize,
) -> usize {
    sleep(sample_period * needed as u32);
    wait_for_samples(transport, handle, channel, sample_period, needed)
}
