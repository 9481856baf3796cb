//! AMQP frame layer: `type(1) channel(2) length(4) payload(length) 0xCE`.

use super::{put_u16, put_u32, ContentHeader, Method};
use crate::errors::*;
use byteorder::{BigEndian, ByteOrder};

/// Every frame ends with this octet; anything else is a fatal connection
/// error.
pub const FRAME_END: u8 = 0xCE;

/// The eight bytes a client sends before any frame.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

/// Bytes of frame overhead around a payload: 7-byte header plus end marker.
pub const FRAME_OVERHEAD: usize = 8;

const FRAME_METHOD: u8 = 1;
const FRAME_HEADER: u8 = 2;
const FRAME_BODY: u8 = 3;
const FRAME_HEARTBEAT: u8 = 8;

/// A parsed frame, tagged with the channel it arrived on.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Method(u16, Method),
    Header(u16, ContentHeader),
    Body(u16, Vec<u8>),
    Heartbeat(u16),
}

impl Frame {
    pub fn channel_id(&self) -> u16 {
        match self {
            Frame::Method(channel_id, _)
            | Frame::Header(channel_id, _)
            | Frame::Body(channel_id, _)
            | Frame::Heartbeat(channel_id) => *channel_id,
        }
    }

    /// Returns the total size of the next frame if enough bytes are buffered
    /// to know it, or `None` if more bytes are needed. Used by the frame
    /// buffer to avoid parsing partial frames.
    pub fn required_size(buf: &[u8]) -> Option<usize> {
        if buf.len() < 7 {
            None
        } else {
            Some(BigEndian::read_u32(&buf[3..7]) as usize + FRAME_OVERHEAD)
        }
    }

    /// Parses one complete frame. `buf` must be exactly the size previously
    /// returned by [`required_size`](#method.required_size).
    pub fn parse(buf: &[u8]) -> Result<Frame> {
        if buf.len() < FRAME_OVERHEAD {
            return TruncatedBufferSnafu.fail();
        }
        let frame_type = buf[0];
        let channel_id = BigEndian::read_u16(&buf[1..3]);
        let length = BigEndian::read_u32(&buf[3..7]) as usize;
        if buf.len() != length + FRAME_OVERHEAD {
            return LengthMismatchSnafu {
                declared: length + FRAME_OVERHEAD,
                consumed: buf.len(),
            }
            .fail();
        }
        if buf[buf.len() - 1] != FRAME_END {
            return FrameEndMissingSnafu.fail();
        }
        let payload = &buf[7..buf.len() - 1];

        Ok(match frame_type {
            FRAME_METHOD => Frame::Method(channel_id, Method::decode(payload)?),
            FRAME_HEADER => Frame::Header(channel_id, ContentHeader::decode(payload)?),
            FRAME_BODY => Frame::Body(channel_id, payload.to_vec()),
            FRAME_HEARTBEAT => Frame::Heartbeat(channel_id),
            frame_type => return UnknownFrameTypeSnafu { frame_type }.fail(),
        })
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Method(channel_id, method) => {
                let mut payload = Vec::new();
                method.encode(&mut payload);
                write_frame(buf, FRAME_METHOD, *channel_id, &payload);
            }
            Frame::Header(channel_id, header) => {
                let mut payload = Vec::new();
                header.encode(&mut payload);
                write_frame(buf, FRAME_HEADER, *channel_id, &payload);
            }
            Frame::Body(channel_id, body) => {
                write_frame(buf, FRAME_BODY, *channel_id, body);
            }
            Frame::Heartbeat(channel_id) => {
                write_frame(buf, FRAME_HEARTBEAT, *channel_id, &[]);
            }
        }
    }
}

pub(crate) fn write_frame(buf: &mut Vec<u8>, frame_type: u8, channel_id: u16, payload: &[u8]) {
    buf.push(frame_type);
    put_u16(buf, channel_id);
    put_u32(buf, payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.push(FRAME_END);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::method::{ConnectionMethod, ConnectionOpen};
    use crate::wire::BasicProperties;

    fn round_trip(frame: &Frame) -> Frame {
        let mut buf = Vec::new();
        frame.serialize(&mut buf);
        assert_eq!(Frame::required_size(&buf), Some(buf.len()));
        Frame::parse(&buf).unwrap()
    }

    #[test]
    fn round_trip_method_frame() {
        let frame = Frame::Method(
            0,
            ConnectionMethod::Open(ConnectionOpen {
                virtual_host: "/".to_string(),
                capabilities: String::new(),
                insist: false,
            })
            .into(),
        );
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn round_trip_header_frame() {
        let frame = Frame::Header(
            5,
            ContentHeader {
                class_id: crate::wire::method::CLASS_BASIC,
                body_size: 3,
                properties: BasicProperties::default().with_delivery_mode(2),
            },
        );
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn round_trip_body_and_heartbeat() {
        let body = Frame::Body(5, b"payload".to_vec());
        assert_eq!(round_trip(&body), body);
        let heartbeat = Frame::Heartbeat(0);
        assert_eq!(round_trip(&heartbeat), heartbeat);
    }

    #[test]
    fn bad_end_marker_rejected() {
        let mut buf = Vec::new();
        Frame::Heartbeat(0).serialize(&mut buf);
        let last = buf.len() - 1;
        buf[last] = 0x00;
        match Frame::parse(&buf) {
            Err(Error::FrameEndMissing) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn unknown_frame_type_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 9, 0, &[]);
        match Frame::parse(&buf) {
            Err(Error::UnknownFrameType { frame_type }) => assert_eq!(frame_type, 9),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn required_size_needs_seven_bytes() {
        let mut buf = Vec::new();
        Frame::Body(1, vec![0; 16]).serialize(&mut buf);
        assert_eq!(Frame::required_size(&buf[..6]), None);
        assert_eq!(Frame::required_size(&buf[..7]), Some(16 + FRAME_OVERHEAD));
    }
}
