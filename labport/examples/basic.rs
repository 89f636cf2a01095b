//! Acquisition walkthrough against the in-tree mock transport: a
//! temperature sensor on ch1, a photogate counting on dig1, and a DCU
//! on dig2. Swap the mock for a real transport to run on hardware.

use std::time::Duration;

use labport::{
    init_logging, AnalogMode, Channel, ChannelAssignments, DeviceType, DigitalMode,
    MockTransport, Session,
};

fn main() -> Result<(), String> {
    init_logging(std::path::Path::new("."))?;

    // Script a resistor-coded temperature sensor and some measurements
    let mut transport = MockTransport::new(DeviceType::Mini, 1);
    {
        let device = transport.device_mut(0);
        device.channel_mut(Channel::Ch1).sensor_id = 10;
        device
            .channel_mut(Channel::Ch1)
            .push_samples(&[(1500, 0), (1510, 100_000), (1490, 200_000)]);
        device.channel_mut(Channel::Ch1).script_counts(&[1, 1, 1]);
        device
            .channel_mut(Channel::Dig1)
            .push_samples(&[(2, 0), (5, 100_000), (9, 200_000)]);
        device.channel_mut(Channel::Dig1).script_counts(&[1, 1, 1]);
    }

    let mut session = Session::open(transport)?;
    session.configure(&[ChannelAssignments {
        ch1: AnalogMode::Sensor,
        dig1: DigitalMode::PhotogateCount,
        dig2: DigitalMode::Dcu,
        ..Default::default()
    }])?;

    for (index, device) in session.channel_info().iter().enumerate() {
        for info in device {
            println!(
                "device {index} {}: {} {}",
                info.channel.label(),
                info.name,
                info.units
            );
        }
    }

    session.start(Duration::from_millis(100), true)?;

    // Turn DCU lines 1 and 3 on while sampling
    session.set_dcu(&[0b0101])?;

    for _ in 0..3 {
        match session.read() {
            Some(row) => println!("{row:?}"),
            None => println!("cycle timed out"),
        }
    }

    session.stop()?;
    session.close()?;
    Ok(())
}
