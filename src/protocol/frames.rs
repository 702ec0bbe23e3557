use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};
use packed_struct::prelude::*;


/// Frame type tags seen on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// `0x0002`
    LocalWiredKeyEvent,
    /// `0x0003`
    RemoteWiredKeyEvent,
    /// `0x0005`. Seems to only work for some keys
    OnOffEvent,
    /// `0x000c`. Sent by Hayward VSP pumps
    PumpStatus,
    /// `0x0083`
    WirelessKeyEvent,
    /// `0x0101`
    KeepAlive,
    /// `0x0102`
    Leds,
    /// `0x0103`
    DisplayUpdate,
    /// `0x040a`
    LongDisplayUpdate,
    /// `0x0c01`
    PumpSpeedRequest,

    Unknown(u16),
}

impl From<u16> for FrameType {
    fn from(tag: u16) -> Self {
        match tag {
            0x0002 => Self::LocalWiredKeyEvent,
            0x0003 => Self::RemoteWiredKeyEvent,
            0x0005 => Self::OnOffEvent,
            0x000c => Self::PumpStatus,
            0x0083 => Self::WirelessKeyEvent,
            0x0101 => Self::KeepAlive,
            0x0102 => Self::Leds,
            0x0103 => Self::DisplayUpdate,
            0x040a => Self::LongDisplayUpdate,
            0x0c01 => Self::PumpSpeedRequest,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u16 {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::LocalWiredKeyEvent => 0x0002,
            FrameType::RemoteWiredKeyEvent => 0x0003,
            FrameType::OnOffEvent => 0x0005,
            FrameType::PumpStatus => 0x000c,
            FrameType::WirelessKeyEvent => 0x0083,
            FrameType::KeepAlive => 0x0101,
            FrameType::Leds => 0x0102,
            FrameType::DisplayUpdate => 0x0103,
            FrameType::LongDisplayUpdate => 0x040a,
            FrameType::PumpSpeedRequest => 0x0c01,
            FrameType::Unknown(tag) => tag,
        }
    }
}

impl FrameType {
    pub fn is_key_event(&self) -> bool {
        matches!(self,
            FrameType::LocalWiredKeyEvent
            | FrameType::RemoteWiredKeyEvent
            | FrameType::WirelessKeyEvent
            | FrameType::OnOffEvent)
    }
}


/// A decoded frame, without start/end markers, stuffing or checksum.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Largest payload the controller sends.
    pub const MAX_PAYLOAD: usize = 59;

    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    pub fn keep_alive() -> Self {
        Self::new(FrameType::KeepAlive, Bytes::new())
    }

    /// Build the key event frame for a key code.
    ///
    /// Codes wider than 16 bits only exist on the wireless remote, so
    /// those are sent as wireless key events.
    pub fn key_event(code: u32) -> Self {
        match u16::try_from(code) {
            Ok(code) => {
                let mut payload = BytesMut::with_capacity(4);
                payload.put_u16_le(code);
                payload.put_u16_le(code);

                Self::new(FrameType::LocalWiredKeyEvent, payload.freeze())
            },
            Err(_) => {
                let mut payload = BytesMut::with_capacity(10);
                payload.put_u8(0x01);
                payload.put_u32_le(code);
                payload.put_u32_le(code);
                payload.put_u8(0x00);

                Self::new(FrameType::WirelessKeyEvent, payload.freeze())
            }
        }
    }

    /// Key code carried by a key event frame.
    pub fn key_code(&self) -> Option<u32> {
        let payload = &self.payload[..];

        match self.frame_type {
            FrameType::LocalWiredKeyEvent | FrameType::RemoteWiredKeyEvent | FrameType::OnOffEvent => {
                let [lo, hi, ..] = payload else { return None };
                Some(u16::from_le_bytes([*lo, *hi]) as u32)
            },
            FrameType::WirelessKeyEvent => {
                let [_, code @ .., _] = payload else { return None };
                let code: [u8; 4] = code.get(..4)?.try_into().ok()?;
                Some(u32::from_le_bytes(code))
            },
            _ => None
        }
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag: u16 = self.frame_type.into();
        write!(f, "{:?} ({tag:04x}): {:02x?}", self.frame_type, &self.payload[..])
    }
}


/// Payload of a [`FrameType::Leds`] frame.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct LedsPayload {
    /// LEDs that are on
    #[packed_field(bytes="0..=3", endian="lsb")]
    pub on: u32,

    /// LEDs that are flashing
    #[packed_field(bytes="4..=7", endian="lsb")]
    pub flashing: u32,
}

/// Payload of a [`FrameType::PumpStatus`] frame.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct PumpStatusPayload {
    #[packed_field(bytes="0..=1")]
    pub unknown: [u8; 2],

    /// Speed in percent
    #[packed_field(bytes="2")]
    pub speed: u8,

    /// Power in watts, packed BCD
    #[packed_field(bytes="3..=4")]
    pub power_bcd: [u8; 2],
}

impl PumpStatusPayload {
    pub fn power(&self) -> u16 {
        bcd(self.power_bcd)
    }
}

/// Decode two packed BCD bytes (high nibble first) into 0..=9999.
pub fn bcd(bytes: [u8; 2]) -> u16 {
    bytes.iter()
        .flat_map(|b| [b >> 4, b & 0x0f])
        .fold(0u16, |acc, digit| acc * 10 + digit as u16)
}
