//! Frame-level codec for the Balboa bus.
//!
//! On the wire a frame is
//! `7E | LEN | CH | MAGIC | MT | payload | CRC | 7E`, where `LEN`
//! counts every byte between the two delimiters except itself minus
//! nothing: `LEN = payload length + 5`, so a whole frame is `LEN + 2`
//! bytes. The CRC covers `LEN` through the last payload byte.

use arrayvec::ArrayVec;
use log::warn;
use snafu::{ensure, Snafu};

use crate::crc8;
use crate::types::Channel;

/// Start and end marker; the two directions share the byte.
pub(crate) const DELIMITER: u8 = 0x7e;
/// Magic byte stamped on every frame a client sends.
pub(crate) const MAGIC: u8 = 0xbf;
/// Magic byte mainboards stamp on broadcast status frames.
pub(crate) const MAGIC_BROADCAST: u8 = 0xaf;

/// Longest frame observed on the bus, delimiters included.
pub(crate) const MAX_FRAME_LEN: usize = 35;

pub(crate) const MT_NEW_CLIENT_QUERY: u8 = 0x00;
pub(crate) const MT_NEW_CLIENT_REQUEST: u8 = 0x01;
pub(crate) const MT_ASSIGN_ID: u8 = 0x02;
pub(crate) const MT_ID_ACK: u8 = 0x03;
pub(crate) const MT_CLEAR_TO_SEND: u8 = 0x06;
pub(crate) const MT_NOTHING_TO_SEND: u8 = 0x07;
pub(crate) const MT_TOGGLE_ITEM: u8 = 0x11;
pub(crate) const MT_STATUS_UPDATE: u8 = 0x13;
pub(crate) const MT_SET_TEMPERATURE: u8 = 0x20;
pub(crate) const MT_REQUEST_INFO: u8 = 0x22;
pub(crate) const MT_FILTER_CYCLE_REPORT: u8 = 0x23;
pub(crate) const MT_FAULT_LOG_REPORT: u8 = 0x28;
pub(crate) const MT_CONFIG_REPORT: u8 = 0x2e;

/// One complete frame, delimiters included.
pub type Frame = ArrayVec<u8, MAX_FRAME_LEN>;

/// Error type for the frame encoder.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum EncodeError {
    /// The payload does not fit in a single bus frame.
    #[snafu(display("Payload of {len} bytes does not fit in a frame"))]
    PayloadTooLong { len: usize },
}

/// Accumulates raw bus bytes and yields complete, CRC-verified frames.
///
/// The bus is lossy; everything that does not line up into a valid
/// frame is dropped and the reader resynchronizes on the next `0x7E`.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Frame,
}

impl FrameReader {
    pub fn new() -> Self {
        Default::default()
    }

    /// Feed one byte from the bus, returning a frame once the byte
    /// completes one.
    ///
    /// A returned frame has a verified checksum; nothing else about it
    /// has been validated.
    pub fn accept(&mut self, byte: u8) -> Option<Frame> {
        if self.buf.try_push(byte).is_err() {
            warn!("Frame buffer overflow, resynchronizing");
            self.buf.clear();
            if byte == DELIMITER {
                self.buf.push(byte);
            }
            return None;
        }

        // Drop bytes until a start delimiter is seen
        if self.buf[0] != DELIMITER {
            self.buf.clear();
            return None;
        }

        // Back-to-back delimiters: the previous frame's end marker is
        // this frame's start marker
        if self.buf.len() == 2 && self.buf[1] == DELIMITER {
            self.buf.pop();
            return None;
        }

        let len = self.buf.len();
        if byte == DELIMITER && len > 2 && len == usize::from(self.buf[1]) + 2 {
            let frame = std::mem::take(&mut self.buf);
            if crc8(&frame[1..len - 2]) == frame[len - 2] {
                return Some(frame);
            }
            warn!("CRC mismatch, dropping frame");
        }
        None
    }
}

/// Encode one frame ready to be written to the bus.
pub fn encode_frame(
    channel: Channel,
    message_type: u8,
    payload: &[u8],
) -> Result<Frame, EncodeError> {
    let length = payload.len() + 5;
    ensure!(
        length + 2 <= MAX_FRAME_LEN,
        PayloadTooLongSnafu { len: payload.len() }
    );

    let mut frame = Frame::new();
    frame.push(DELIMITER);
    frame.push(length as u8);
    frame.push(channel.into());
    frame.push(channel.magic_byte());
    frame.push(message_type);
    frame
        .try_extend_from_slice(payload)
        .expect("BUG: frame buffer too small");
    frame.push(crc8(&frame[1..]));
    frame.push(DELIMITER);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reader: &mut FrameReader, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|b| reader.accept(*b)).collect()
    }

    #[test]
    fn test_precise_happy_path() {
        let encoded = b"\x7e\x08\xfe\xbf\x01\x02\xf2\x47\x0a\x7e";
        let mut reader = FrameReader::new();
        for byte in &encoded[..encoded.len() - 1] {
            assert_eq!(reader.accept(*byte), None);
        }
        let frame = reader.accept(encoded[encoded.len() - 1]).unwrap();
        assert_eq!(frame.as_slice(), encoded);
    }

    #[test]
    fn test_encode_against_ref() {
        let frame = encode_frame(Channel::from(0x10), MT_NOTHING_TO_SEND, &[]).unwrap();
        assert_eq!(
            frame.as_slice(),
            [0x7e, 0x05, 0x10, 0xbf, 0x07, 0x5b, 0x7e]
        );

        let frame =
            encode_frame(Channel::MulticastDiscovery, MT_NEW_CLIENT_REQUEST, &[0x02, 0xf1, 0x73])
                .unwrap();
        assert_eq!(
            frame.as_slice(),
            [0x7e, 0x08, 0xfe, 0xbf, 0x01, 0x02, 0xf1, 0x73, 0xb9, 0x7e]
        );
    }

    #[test]
    fn broadcast_frames_use_the_broadcast_magic() {
        let frame = encode_frame(Channel::BroadcastStatus, MT_STATUS_UPDATE, &[0; 24]).unwrap();
        assert_eq!(frame[3], MAGIC_BROADCAST);
    }

    #[test]
    fn test_reflexive_simple() {
        let encoded = encode_frame(Channel::from(0x10), 0x01, &[0x02, 0x03, 0x04]).unwrap();
        let mut reader = FrameReader::new();
        let frames = read_all(&mut reader, &encoded);
        assert_eq!(frames, vec![encoded]);
    }

    #[test]
    fn junk_before_the_start_marker_is_dropped() {
        let mut bytes = vec![0x00, 0x13, 0xfe, 0x42];
        let encoded = encode_frame(Channel::from(0x10), MT_ID_ACK, &[]).unwrap();
        bytes.extend_from_slice(&encoded);
        let mut reader = FrameReader::new();
        assert_eq!(read_all(&mut reader, &bytes), vec![encoded]);
    }

    #[test]
    fn doubled_delimiter_is_collapsed() {
        // one 7E ends the previous frame, the next one opens ours
        let mut bytes = vec![DELIMITER];
        let encoded = encode_frame(Channel::from(0x10), MT_ID_ACK, &[]).unwrap();
        bytes.extend_from_slice(&encoded);
        let mut reader = FrameReader::new();
        assert_eq!(read_all(&mut reader, &bytes), vec![encoded]);
    }

    #[test]
    fn delimiter_bytes_inside_the_payload_do_not_terminate() {
        let encoded = encode_frame(Channel::from(0x10), 0x20, &[DELIMITER]).unwrap();
        let mut reader = FrameReader::new();
        assert_eq!(read_all(&mut reader, &encoded), vec![encoded]);
    }

    #[test]
    fn corrupted_crc_drops_the_frame_and_resynchronizes() {
        let mut corrupted = encode_frame(Channel::from(0x10), MT_CLEAR_TO_SEND, &[])
            .unwrap()
            .to_vec();
        corrupted[4] ^= 0x01;
        let intact = encode_frame(Channel::from(0x10), MT_CLEAR_TO_SEND, &[]).unwrap();
        corrupted.extend_from_slice(&intact);

        let mut reader = FrameReader::new();
        assert_eq!(read_all(&mut reader, &corrupted), vec![intact]);
    }

    #[test]
    fn overflow_recovers_on_the_next_frame() {
        let mut bytes = vec![DELIMITER, 0xfa];
        bytes.extend_from_slice(&[0x55; 40]);
        let encoded = encode_frame(Channel::from(0x10), MT_ID_ACK, &[]).unwrap();
        bytes.extend_from_slice(&encoded);
        let mut reader = FrameReader::new();
        assert_eq!(read_all(&mut reader, &bytes), vec![encoded]);
    }

    #[test]
    fn oversized_payloads_are_refused() {
        assert!(encode_frame(Channel::from(0x10), 0x20, &[0; 29]).is_err());
        assert!(encode_frame(Channel::from(0x10), 0x20, &[0; 28]).is_ok());
    }
}
