mod common;

use aqualogic::{config::SessionConfig, protocol::{codec::AquaLogicCodec, frames::{Frame, FrameType}}, AquaLogic, Disconnect, State};
use common::{capture, display, leds};
use tokio::io::{duplex, AsyncWriteExt};
use tokio_util::codec::Framed;


async fn replay(bytes: Vec<u8>) -> (AquaLogic, usize) {
    let aq = AquaLogic::new(SessionConfig::default());

    let (mut bus, theirs) = duplex(bytes.len() + 1);
    bus.write_all(&bytes).await.unwrap();
    drop(bus);

    let mut changes = 0;
    let result = aq.process(Framed::new(theirs, AquaLogicCodec::new()), |_| changes += 1).await;
    assert_eq!(result.unwrap(), Disconnect::EndOfStream);

    (aq, changes)
}

fn pool_on() -> Vec<u8> {
    capture(&[
        Frame::keep_alive(),
        leds(&[State::Pool, State::Filter], &[]),
        display("   Air Temp    -6°C"),
        Frame::keep_alive(),
        display("  Pool Temp    -7°C"),
        Frame::new(FrameType::Unknown(0x0509), vec![0x00, 0x10, 0x42]),
        leds(&[State::Pool, State::Filter], &[]),
        display("  Spa Chlorinator 3%"),
        Frame::keep_alive(),
        display("  Salt Level 3.1 g/L"),
        Frame::new(FrameType::RemoteWiredKeyEvent, vec![0x02, 0x00, 0x02, 0x00]),
        Frame::keep_alive(),
    ])
}

fn spa_on() -> Vec<u8> {
    capture(&[
        Frame::keep_alive(),
        leds(&[State::Spa, State::Filter], &[]),
        display("   Air Temp    -6°C"),
        Frame::keep_alive(),
        display("   Spa Temp    -7°C"),
        Frame::keep_alive(),
        leds(&[State::Spa, State::Filter], &[]),
    ])
}

#[tokio::test]
async fn test_pool_on() {
    let (aq, changes) = replay(pool_on()).await;

    // Yes it was cold out when this was captured
    assert_eq!(aq.air_temp(), Some(-6));
    assert_eq!(aq.pool_temp(), Some(-7));
    assert_eq!(aq.spa_temp(), None);
    assert_eq!(aq.spa_chlorinator(), Some(3));
    assert_eq!(aq.salt_level(), Some(3.1));
    assert!(aq.is_metric());

    assert!(aq.get_state(State::Pool));
    assert!(aq.get_state(State::Filter));
    assert!(!aq.get_state(State::Spa));
    assert!(!aq.get_state(State::FilterLowSpeed));

    // leds, air, pool, chlorinator, salt
    assert_eq!(changes, 5);
}

#[tokio::test]
async fn test_spa_on() {
    let (aq, _) = replay(spa_on()).await;

    assert_eq!(aq.air_temp(), Some(-6));
    assert_eq!(aq.pool_temp(), None);
    assert_eq!(aq.spa_temp(), Some(-7));

    assert!(aq.get_state(State::Spa));
    assert!(aq.get_state(State::Filter));
    assert!(!aq.get_state(State::Pool));
    assert_eq!(aq.status(), "OK");
}

#[tokio::test]
async fn test_low_speed_filter() {
    let bytes = capture(&[
        leds(&[State::Pool, State::Filter], &[State::Filter]),
        Frame::new(FrameType::PumpStatus, vec![0x00, 0x00, 0x32, 0x21, 0x05]),
    ]);

    let (aq, changes) = replay(bytes).await;

    let states = aq.states();
    assert!(states.contains(&State::Pool));
    assert!(states.contains(&State::Filter));
    assert!(states.contains(&State::FilterLowSpeed));

    assert!(aq.multi_speed_pump());
    assert_eq!(aq.pump_speed(), Some(50));
    assert_eq!(aq.pump_power(), Some(2105));
    assert_eq!(changes, 2);
}

#[tokio::test]
async fn test_check_system() {
    let bytes = capture(&[
        display("Check System Low Salt"),
        leds(&[State::CheckSystem, State::Pool], &[]),
    ]);

    let (aq, _) = replay(bytes).await;

    assert_eq!(aq.check_system_msg().as_deref(), Some("Low Salt"));
    assert_eq!(aq.status(), "Low Salt");
}
