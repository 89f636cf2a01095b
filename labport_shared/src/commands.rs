//! Byte-packed command frames for the device's command/response channel.
//!
//! The transport carries every command as an id byte plus a fixed 14-byte
//! parameter block, of which only a prefix is meaningful. Rather than
//! passing around one 14-slot array for every command, each command gets
//! its own frame type that encodes exactly the fields the command uses;
//! [`CommandFrame::to_parameter_block`] produces the padded block and the
//! used length for the wire.

use byte_struct::*;
pub use byte_struct::{ByteStruct, ByteStructLen};

use crate::channels::{AnalogInputRange, Channel, SamplingMode};

/// Command ids understood by the device family.
pub mod command_ids {
    pub const START_MEASUREMENTS: u8 = 0x18;
    pub const STOP_MEASUREMENTS: u8 = 0x19;
    pub const SET_LED_STATE: u8 = 0x1D;
    pub const SET_ANALOG_INPUT: u8 = 0x21;
    pub const GET_SENSOR_ID: u8 = 0x28;
    pub const SET_SAMPLING_MODE: u8 = 0x29;
    pub const SET_SENSOR_CHANNEL_ENABLE_MASK: u8 = 0x2C;
    pub const SET_DIGITAL_COUNTER: u8 = 0x32;
    pub const WRITE_IO_CONFIG: u8 = 0x37;
    pub const WRITE_IO: u8 = 0x39;
    pub const SET_PWM_CONFIG: u8 = 0x40;
}

/// Fixed size of the command parameter block on the wire.
pub const PARAMETER_BLOCK_LEN: usize = 14;

/// A command's parameter bytes, zero-padded to the wire's fixed width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterBlock {
    pub bytes: [u8; PARAMETER_BLOCK_LEN],
    /// Number of meaningful leading bytes.
    pub used: usize,
}

impl ParameterBlock {
    /// The meaningful prefix of the block.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.used]
    }
}

/// A typed command frame that knows its command id and how to pack
/// itself into the parameter block.
pub trait CommandFrame: ByteStruct + ByteStructLen {
    const COMMAND: u8;

    fn to_parameter_block(&self) -> ParameterBlock {
        let mut bytes = [0_u8; PARAMETER_BLOCK_LEN];
        self.write_bytes(&mut bytes[..Self::BYTE_LEN]);
        ParameterBlock {
            bytes,
            used: Self::BYTE_LEN,
        }
    }
}

/// Enable periodic sampling for the masked channels (see
/// [`Channel::mask_bit`]).
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct ChannelEnableMask {
    pub mask: u32,
}

impl CommandFrame for ChannelEnableMask {
    const COMMAND: u8 = command_ids::SET_SENSOR_CHANNEL_ENABLE_MASK;
}

/// Select the input range for one analog channel.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct AnalogInputSelect {
    pub channel: u8,
    pub range: u8,
}

impl AnalogInputSelect {
    pub fn new(channel: Channel, range: AnalogInputRange) -> Self {
        Self {
            channel: channel.into(),
            range: range.into(),
        }
    }
}

impl CommandFrame for AnalogInputSelect {
    const COMMAND: u8 = command_ids::SET_ANALOG_INPUT;
}

/// Select the sampling mode for one digital channel.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct SamplingModeSelect {
    pub channel: u8,
    pub mode: u8,
}

impl SamplingModeSelect {
    pub fn new(channel: Channel, mode: SamplingMode) -> Self {
        Self {
            channel: channel.into(),
            mode: mode.into(),
        }
    }
}

impl CommandFrame for SamplingModeSelect {
    const COMMAND: u8 = command_ids::SET_SAMPLING_MODE;
}

/// Set a digital channel's event counter, typically to zero it before a run.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct DigitalCounterReset {
    pub channel: u8,
    pub value: u8,
}

impl DigitalCounterReset {
    pub fn zero(channel: Channel) -> Self {
        Self {
            channel: channel.into(),
            value: 0,
        }
    }
}

impl CommandFrame for DigitalCounterReset {
    const COMMAND: u8 = command_ids::SET_DIGITAL_COUNTER;
}

/// Mask covering all four output lines of a digital channel.
pub const ALL_IO_LINES: u8 = 0x0F;

/// Drive the output lines of a digital channel. `value` holds one bit per
/// line (0-15).
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct IoWrite {
    pub channel: u8,
    pub line_mask: u8,
    pub value: u8,
}

impl IoWrite {
    pub fn new(channel: Channel, value: u8) -> Self {
        Self {
            channel: channel.into(),
            line_mask: ALL_IO_LINES,
            value,
        }
    }
}

impl CommandFrame for IoWrite {
    const COMMAND: u8 = command_ids::WRITE_IO;
}

/// Configure the direction of a digital channel's IO lines. A zero
/// direction word puts the masked lines into output mode.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct IoDirectionConfig {
    pub channel: u8,
    pub line_mask: u8,
    pub directions: u16,
}

impl IoDirectionConfig {
    pub fn outputs(channel: Channel) -> Self {
        Self {
            channel: channel.into(),
            line_mask: ALL_IO_LINES,
            directions: 0,
        }
    }
}

impl CommandFrame for IoDirectionConfig {
    const COMMAND: u8 = command_ids::WRITE_IO_CONFIG;
}

/// Denominator against which PWM duty-cycle numerators are expressed.
pub const PWM_DUTY_DENOMINATOR: u32 = 10_000;

/// Start a PWM waveform on a digital channel. Fills the whole parameter
/// block: channel, running flag, then period/numerator/denominator as
/// little-endian u32s.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct PwmConfig {
    pub channel: u8,
    pub running: u8,
    pub period_ns: u32,
    pub numerator: u32,
    pub denominator: u32,
}

impl PwmConfig {
    pub fn new(channel: Channel, period_ns: u32, numerator: u32) -> Self {
        Self {
            channel: channel.into(),
            running: 1,
            period_ns,
            numerator,
            denominator: PWM_DUTY_DENOMINATOR,
        }
    }
}

impl CommandFrame for PwmConfig {
    const COMMAND: u8 = command_ids::SET_PWM_CONFIG;
}

/// Halt a running PWM waveform: same command id as [`PwmConfig`] with the
/// running flag cleared and no waveform parameters.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct PwmHalt {
    pub channel: u8,
    pub running: u8,
}

impl PwmHalt {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: channel.into(),
            running: 0,
        }
    }
}

impl CommandFrame for PwmHalt {
    const COMMAND: u8 = command_ids::SET_PWM_CONFIG;
}

/// Begin periodic sampling on every masked channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartMeasurements;

/// Stop periodic sampling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopMeasurements;

macro_rules! empty_frame {
    ($name:ident, $command:expr) => {
        impl ByteStructLen for $name {
            const BYTE_LEN: usize = 0;
        }

        impl ByteStruct for $name {
            fn read_bytes(_bytes: &[u8]) -> Self {
                Self
            }

            fn write_bytes(&self, _bytes: &mut [u8]) {}
        }

        impl CommandFrame for $name {
            const COMMAND: u8 = $command;
        }
    };
}

empty_frame!(StartMeasurements, command_ids::START_MEASUREMENTS);
empty_frame!(StopMeasurements, command_ids::STOP_MEASUREMENTS);

/// Ask which sensor is plugged into an analog channel. The response
/// carries the sensor id as a little-endian i32 in its first four bytes.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct SensorIdQuery {
    pub channel: u8,
}

impl SensorIdQuery {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Parse the sensor id out of a query response. Short responses read
    /// as "nothing detected".
    pub fn parse_response(response: &[u8]) -> i32 {
        match response.get(..4) {
            Some(bytes) => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0,
        }
    }
}

impl CommandFrame for SensorIdQuery {
    const COMMAND: u8 = command_ids::GET_SENSOR_ID;
}

/// Green at medium brightness, the "connected and healthy" indication.
pub const LED_COLOR_GREEN: u8 = 0x80;

/// Set the state of the device's indicator LED (Mini only).
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct LedState {
    pub index: u8,
    pub color: u8,
    pub brightness: u8,
}

impl LedState {
    pub fn green() -> Self {
        Self {
            index: 0,
            color: LED_COLOR_GREEN,
            brightness: 8,
        }
    }
}

impl CommandFrame for LedState {
    const COMMAND: u8 = command_ids::SET_LED_STATE;
}

// Every frame must fit the wire's parameter block
const _: () = assert!(ChannelEnableMask::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(AnalogInputSelect::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(SamplingModeSelect::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(DigitalCounterReset::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(IoWrite::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(IoDirectionConfig::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(PwmConfig::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(PwmHalt::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(SensorIdQuery::BYTE_LEN <= PARAMETER_BLOCK_LEN);
const _: () = assert!(LedState::BYTE_LEN <= PARAMETER_BLOCK_LEN);
