#![allow(dead_code)]

use aqualogic::{protocol::{codec::AquaLogicCodec, frames::{Frame, FrameType}}, State, AQUALOGIC};
use bytes::BytesMut;
use tokio_util::codec::Encoder;


pub fn encode(frames: &[Frame]) -> Vec<u8> {
    let mut codec = AquaLogicCodec::new();
    let mut buf = BytesMut::new();
    for frame in frames {
        codec.encode(frame.clone(), &mut buf).expect("encode");
    }
    buf.to_vec()
}

pub fn leds(on: &[State], flashing: &[State]) -> Frame {
    let mask = |states: &[State]| states.iter()
        .map(|s| AQUALOGIC.led_mask(*s).expect("led state"))
        .fold(0u32, |acc, bit| acc | bit);

    let mut payload = mask(on).to_le_bytes().to_vec();
    payload.extend(mask(flashing).to_le_bytes());
    Frame::new(FrameType::Leds, payload)
}

/// A display line as the controller sends it: fixed width, vendor degree sign.
pub fn display(line: &str) -> Frame {
    let mut payload: Vec<u8> = line.chars()
        .map(|c| if c == '°' { 0xdf } else { c as u8 })
        .collect();
    payload.resize(32, b' ');
    Frame::new(FrameType::DisplayUpdate, payload)
}

/// A capture starting part way through a frame, as a real one would.
pub fn capture(frames: &[Frame]) -> Vec<u8> {
    let mut bytes = vec![0x2c, 0x00, 0x10, 0x03, 0x10];
    bytes.extend(encode(frames));
    bytes
}
