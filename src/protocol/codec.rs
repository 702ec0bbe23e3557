use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use super::frames::{Frame, FrameType};


pub const FRAME_DLE: u8 = 0x10;
pub const FRAME_STX: u8 = 0x02;
pub const FRAME_ETX: u8 = 0x03;

/// type (2) + payload + checksum (2)
const MAX_FRAME_BODY: usize = 2 + Frame::MAX_PAYLOAD + 2;


trait Checksum {
    fn checksum(&mut self) -> u16;
}

impl<'a> Checksum for std::slice::Iter<'a, u8> {
    /// Sum of the frame start marker and every unstuffed byte.
    fn checksum(&mut self) -> u16 {
        self.fold((FRAME_DLE as u16) + (FRAME_STX as u16), |acc, byte| acc.wrapping_add(*byte as u16))
    }
}


#[derive(Error, Debug, PartialEq, Eq)]
enum FramingError {
    #[error("frame too short ({len} bytes)")]
    TooShort {
        len: usize
    },
    #[error("no end marker within the maximum frame length")]
    TooLong,
    #[error("invalid checksum (expected {expected:04x}, actual: {actual:04x}) for frame {frame:02x?}")]
    InvalidChecksum {
        expected: u16,
        actual: u16,
        frame: Vec<u8>
    },
}

/// Outcome of scanning the buffer for the body of a frame.
enum Body {
    /// Unstuffed body and the number of buffer bytes it occupied (markers included)
    Complete(Vec<u8>, usize),
    Incomplete,
    Invalid(FramingError),
}


/// Framing for the AquaLogic bus: `DLE STX <type> <payload> <checksum> DLE ETX`,
/// with every `DLE` inside the frame followed by a stuffed `0x00`.
#[derive(Debug, Default)]
pub struct AquaLogicCodec {}

impl AquaLogicCodec {
    pub fn new() -> Self {
        Self {}
    }

    /// Drop everything up to the next `DLE STX`. Returns false if more data is needed.
    fn sync(src: &mut BytesMut) -> bool {
        loop {
            match src.iter().position(|b| *b == FRAME_DLE) {
                Some(idx) => src.advance(idx),
                None => {
                    src.clear();
                    return false;
                }
            }

            let Some(&next) = src.get(1) else {
                // lone DLE at the end of the buffer
                return false;
            };

            match next {
                FRAME_STX => return true,
                // a DLE DLE pair can still be followed by STX
                FRAME_DLE => src.advance(1),
                // not a frame start; the byte following the DLE is dropped along with it
                other => {
                    trace!("skipping DLE {other:02x}");
                    src.advance(2);
                }
            }
        }
    }

    /// Read the body of the frame that starts at the beginning of `src`, without consuming it.
    fn scan_body(src: &BytesMut) -> Body {
        let mut body = Vec::with_capacity(MAX_FRAME_BODY);
        let mut idx = 2; // skip DLE STX

        loop {
            let Some(&byte) = src.get(idx) else {
                return Body::Incomplete
            };

            if byte == FRAME_DLE {
                // should be ETX or 0 according to the AQ-CO-SERIAL manual
                let Some(&next) = src.get(idx + 1) else {
                    return Body::Incomplete
                };

                if next == FRAME_ETX {
                    return Body::Complete(body, idx + 2);
                }

                if next != 0x00 {
                    warn!("unexpected byte {next:02x} following DLE");
                }

                idx += 2;
            } else {
                idx += 1;
            }

            body.push(byte);

            if body.len() > MAX_FRAME_BODY {
                return Body::Invalid(FramingError::TooLong);
            }
        }
    }

    fn parse_body(mut body: Vec<u8>) -> Result<Frame, FramingError> {
        if body.len() < 4 {
            return Err(FramingError::TooShort { len: body.len() });
        }

        let checksum = body.split_off(body.len() - 2);
        let actual = u16::from_be_bytes([checksum[0], checksum[1]]);

        let expected = body.iter().checksum();
        if expected != actual {
            return Err(FramingError::InvalidChecksum { expected, actual, frame: body });
        }

        let mut body = BytesMut::from(&body[..]);
        let frame_type = FrameType::from(body.get_u16());

        Ok(Frame::new(frame_type, body.freeze()))
    }
}

impl Decoder for AquaLogicCodec {
    type Item = Frame;

    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if !Self::sync(src) {
                return Ok(None);
            }

            match Self::scan_body(src) {
                Body::Incomplete => return Ok(None),

                Body::Invalid(err) => {
                    // resync after this frame start marker
                    warn!("discarding frame: {err}");
                    src.advance(2);
                }

                Body::Complete(body, len) => {
                    src.advance(len);

                    match Self::parse_body(body) {
                        Ok(frame) => return Ok(Some(frame)),
                        Err(err) => warn!("discarding frame: {err}"),
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // a partial frame at the end of the stream is just noise
                if !buf.is_empty() {
                    trace!("discarding {} trailing bytes", buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for AquaLogicCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.payload.len() > Frame::MAX_PAYLOAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("payload of {} bytes exceeds {}", frame.payload.len(), Frame::MAX_PAYLOAD),
            ));
        }

        let tag: u16 = frame.frame_type.into();

        let mut body = Vec::with_capacity(frame.payload.len() + 4);
        body.extend_from_slice(&tag.to_be_bytes());
        body.extend_from_slice(&frame.payload);

        let checksum = body.iter().checksum();
        body.extend_from_slice(&checksum.to_be_bytes());

        dst.reserve(body.len() * 2 + 4);

        dst.put_u8(FRAME_DLE);
        dst.put_u8(FRAME_STX);

        for byte in body {
            dst.put_u8(byte);
            if byte == FRAME_DLE {
                dst.put_u8(0x00);
            }
        }

        dst.put_u8(FRAME_DLE);
        dst.put_u8(FRAME_ETX);

        Ok(())
    }
}
