use nom::bytes::complete::{tag, take};
use nom::combinator::{map, verify};
use nom::IResult;
use snafu::{ensure, Snafu};

use crate::codec::{
    DELIMITER, MAGIC, MAGIC_BROADCAST, MT_ASSIGN_ID, MT_CLEAR_TO_SEND, MT_CONFIG_REPORT,
    MT_FAULT_LOG_REPORT, MT_FILTER_CYCLE_REPORT, MT_NEW_CLIENT_QUERY, MT_STATUS_UPDATE,
};
use crate::types::Channel;

type Buf = [u8];

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub(crate) enum Error {
    /// Header, length or delimiter structure does not line up.
    #[snafu(display("Malformed frame"))]
    Malformed,
    #[snafu(display("Unsupported magic byte {magic:#04x}"))]
    BadMagic { magic: u8 },
}

/// Classification of a complete, CRC-verified frame.
#[derive(PartialEq, Debug, Copy, Clone)]
pub(crate) enum MessageToken {
    NewClientQuery,
    AssignId { proposed_id: u8 },
    ClearToSend,
    StatusUpdate,
    FilterCycleReport,
    FaultLogReport,
    ConfigReport,
    Unknown { message_type: u8 },
}

#[derive(PartialEq, Debug)]
pub(crate) struct Inbound {
    pub channel: Channel,
    pub token: MessageToken,
    /// The frame's checksum byte, kept as a cheap change detector.
    pub crc: u8,
}

pub(crate) fn parse_message(frame: &Buf) -> Result<Inbound, Error> {
    ensure!(frame.len() >= 7, MalformedSnafu);
    let channel = Channel::from(frame[2]);
    let magic = frame[3];
    ensure!(
        magic == MAGIC || (channel == Channel::BroadcastStatus && magic == MAGIC_BROADCAST),
        BadMagicSnafu { magic }
    );
    match inbound(frame) {
        Ok((_, parsed)) => Ok(parsed),
        Err(_) => MalformedSnafu.fail(),
    }
}

fn inbound(frame: &Buf) -> IResult<&Buf, Inbound> {
    let (buf, _) = tag(&[DELIMITER][..])(frame)?;
    let (buf, length) = verify(any_byte, |l| usize::from(*l) + 2 == frame.len())(buf)?;
    let (buf, channel) = map(any_byte, Channel::from)(buf)?;
    let (buf, _magic) = any_byte(buf)?;
    let (buf, message_type) = any_byte(buf)?;
    let (buf, payload) = take(usize::from(length) - 5)(buf)?;
    let (buf, crc) = any_byte(buf)?;
    let (buf, _) = tag(&[DELIMITER][..])(buf)?;
    Ok((
        buf,
        Inbound {
            channel,
            token: classify(message_type, payload),
            crc,
        },
    ))
}

fn classify(message_type: u8, payload: &Buf) -> MessageToken {
    match message_type {
        MT_NEW_CLIENT_QUERY => MessageToken::NewClientQuery,
        MT_ASSIGN_ID => match payload.first() {
            Some(&proposed_id) => MessageToken::AssignId { proposed_id },
            None => MessageToken::Unknown { message_type },
        },
        MT_CLEAR_TO_SEND => MessageToken::ClearToSend,
        MT_STATUS_UPDATE => MessageToken::StatusUpdate,
        MT_FILTER_CYCLE_REPORT => MessageToken::FilterCycleReport,
        MT_FAULT_LOG_REPORT => MessageToken::FaultLogReport,
        MT_CONFIG_REPORT => MessageToken::ConfigReport,
        message_type => MessageToken::Unknown { message_type },
    }
}

fn any_byte(buf: &Buf) -> IResult<&Buf, u8> {
    map(take(1usize), |b: &Buf| b[0])(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    fn parse(channel: u8, message_type: u8, payload: &[u8]) -> Inbound {
        let frame = encode_frame(Channel::from(channel), message_type, payload).unwrap();
        parse_message(&frame).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            parse(0xfe, 0x00, &[]),
            Inbound {
                channel: Channel::MulticastDiscovery,
                token: MessageToken::NewClientQuery,
                crc: 0xac,
            }
        );
        assert_eq!(
            parse(0xfe, 0x02, &[0x10]).token,
            MessageToken::AssignId { proposed_id: 0x10 }
        );
        assert_eq!(parse(0x10, 0x06, &[]).token, MessageToken::ClearToSend);
        assert_eq!(parse(0xff, 0x13, &[0; 24]).token, MessageToken::StatusUpdate);
        assert_eq!(
            parse(0x10, 0x44, &[]).token,
            MessageToken::Unknown { message_type: 0x44 }
        );
    }

    #[test]
    fn test_assignment_without_an_id_is_unknown() {
        assert_eq!(
            parse(0xfe, 0x02, &[]).token,
            MessageToken::Unknown { message_type: 0x02 }
        );
    }

    #[test]
    fn test_magic_byte_is_checked() {
        let mut frame = encode_frame(Channel::from(0x10), 0x06, &[]).unwrap();
        frame[3] = 0x00;
        assert!(matches!(
            parse_message(&frame),
            Err(Error::BadMagic { magic: 0x00 })
        ));

        // the broadcast magic is only valid on the broadcast channel
        let mut frame = encode_frame(Channel::from(0x10), 0x06, &[]).unwrap();
        frame[3] = MAGIC_BROADCAST;
        assert!(parse_message(&frame).is_err());
    }

    #[test]
    fn test_length_must_match_the_frame() {
        let mut frame = encode_frame(Channel::from(0x10), 0x06, &[]).unwrap();
        frame[1] = 0x09;
        assert!(matches!(parse_message(&frame), Err(Error::Malformed)));
    }
}
