//! Channel ids, enable-mask bits, and the numeric vocabulary the device
//! firmware understands for sampling modes and analog input ranges.

use crate::enum_with_unknown;

enum_with_unknown!(
    /// One of the five sensor channels on a device.
    ///
    /// The id space is fixed by the hardware: analog channels are 1-3,
    /// the two digital channels are 5 and 6.
    pub enum Channel(u8) {
        Ch1 = 1,
        Ch2 = 2,
        Ch3 = 3,
        Dig1 = 5,
        Dig2 = 6,
    }
);

impl Channel {
    /// The three analog input channels in id order.
    pub const ANALOG: [Channel; 3] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];

    /// The two digital channels in id order.
    pub const DIGITAL: [Channel; 2] = [Channel::Dig1, Channel::Dig2];

    /// Bit contributed to the channel enable mask (command 0x2C)
    /// when this channel participates in periodic sampling.
    pub fn mask_bit(&self) -> u32 {
        match self {
            Channel::Ch1 => 0x02,
            Channel::Ch2 => 0x04,
            Channel::Ch3 => 0x08,
            Channel::Dig1 => 0x20,
            Channel::Dig2 => 0x40,
            Channel::Unknown(_) => 0,
        }
    }

    pub fn is_analog(&self) -> bool {
        matches!(self, Channel::Ch1 | Channel::Ch2 | Channel::Ch3)
    }

    /// Dense 0..5 index for per-channel storage arenas. Only the five
    /// known channels have a slot.
    pub fn slot(&self) -> usize {
        match self {
            Channel::Ch1 => 0,
            Channel::Ch2 => 1,
            Channel::Ch3 => 2,
            Channel::Dig1 => 3,
            Channel::Dig2 => 4,
            Channel::Unknown(id) => {
                debug_assert!(false, "no storage slot for unknown channel id {id}");
                0
            }
        }
    }

    /// Human-readable channel label as it appears on the device faceplate.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Ch1 => "ch1",
            Channel::Ch2 => "ch2",
            Channel::Ch3 => "ch3",
            Channel::Dig1 => "dig1",
            Channel::Dig2 => "dig2",
            Channel::Unknown(_) => "unknown",
        }
    }
}

enum_with_unknown!(
    /// Digital channel sampling mode selector (command 0x29).
    pub enum SamplingMode(u8) {
        AperiodicEdgeDetect = 1,
        PeriodicPulseCount = 2,
        PeriodicMotionDetect = 3,
        PeriodicRotationCounter = 4,
        PeriodicRotationCounterX4 = 5,
        Custom = 6,
    }
);

enum_with_unknown!(
    /// Analog input range selector (command 0x21, second payload byte).
    pub enum AnalogInputRange(u8) {
        Range5V = 0,
        Range10V = 4,
    }
);

enum_with_unknown!(
    /// Probe selector passed to the transport's raw-to-voltage conversion.
    ///
    /// Distinct from [`AnalogInputRange`]: the firmware uses different
    /// numeric codes for range selection and voltage conversion.
    pub enum VoltageProbe(u8) {
        Probe5V = 2,
        Probe10V = 3,
    }
);

enum_with_unknown!(
    /// Device family members, in the order they are scanned for.
    pub enum DeviceType(u8) {
        Classic = 5,
        Mini = 12,
        Port2 = 14,
        Stream = 17,
        Port3 = 19,
    }
);

impl DeviceType {
    /// Scan order when searching for attached devices.
    pub const ALL: [DeviceType; 5] = [
        DeviceType::Classic,
        DeviceType::Mini,
        DeviceType::Port2,
        DeviceType::Stream,
        DeviceType::Port3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Classic => "Classic",
            DeviceType::Mini => "Mini",
            DeviceType::Port2 => "Port 2",
            DeviceType::Stream => "Stream",
            DeviceType::Port3 => "Port 3",
            DeviceType::Unknown(_) => "unknown",
        }
    }
}
