#![doc = include_str!("../README.md")]

pub mod channels;
pub mod commands;

pub use channels::{AnalogInputRange, Channel, DeviceType, SamplingMode, VoltageProbe};
pub use commands::{CommandFrame, ParameterBlock, PARAMETER_BLOCK_LEN};

/// Number of analog input channels per device.
pub const NUM_ANALOG_CHANNELS: usize = 3;

/// Number of digital channels per device.
pub const NUM_DIG_CHANNELS: usize = 2;

/// Maximum number of devices serviced by one session.
pub const MAX_DEVICES: usize = 2;

/// Derive To/From with an added "Unknown" variant catch-all for converting
/// from numerical values that do not match a valid variant in order to
/// avoid either panicking or cumbersome error handling.
///
/// Adapted (with some modification) from smoltcp.
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// Catch-all for values that do not match a variant
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}
