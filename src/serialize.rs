//! Outbound byte buffering. An [`OutputBuffer`] accumulates serialized
//! frames; the I/O thread drains it to the socket as the socket becomes
//! writable.

use crate::wire::content::{BasicProperties, ContentHeader};
use crate::wire::frame::{write_frame, FRAME_OVERHEAD, PROTOCOL_HEADER};
use crate::wire::method::Method;
use std::ops::{Index, RangeFrom};

const FRAME_TYPE_METHOD: u8 = 1;
const FRAME_TYPE_HEADER: u8 = 2;
const FRAME_TYPE_BODY: u8 = 3;
const FRAME_TYPE_HEARTBEAT: u8 = 8;

#[derive(Clone)]
pub(crate) struct OutputBuffer(Vec<u8>);

impl OutputBuffer {
    pub(crate) fn with_protocol_header() -> OutputBuffer {
        OutputBuffer(PROTOCOL_HEADER.to_vec())
    }

    pub(crate) fn empty() -> OutputBuffer {
        OutputBuffer(Vec::new())
    }

    pub(crate) fn push_method<M: Into<Method>>(&mut self, channel_id: u16, method: M) {
        let mut payload = Vec::new();
        method.into().encode(&mut payload);
        write_frame(&mut self.0, FRAME_TYPE_METHOD, channel_id, &payload);
    }

    pub(crate) fn push_content_header(
        &mut self,
        channel_id: u16,
        class_id: u16,
        body_size: usize,
        properties: &BasicProperties,
    ) {
        let header = ContentHeader {
            class_id,
            body_size: body_size as u64,
            properties: properties.clone(),
        };
        let mut payload = Vec::new();
        header.encode(&mut payload);
        write_frame(&mut self.0, FRAME_TYPE_HEADER, channel_id, &payload);
    }

    /// Pushes `content` as one or more body frames, none exceeding the
    /// negotiated `frame_max` on the wire.
    pub(crate) fn push_content_body(&mut self, channel_id: u16, content: &[u8], frame_max: usize) {
        debug_assert!(frame_max > FRAME_OVERHEAD);
        let max_payload = frame_max - FRAME_OVERHEAD;
        if content.is_empty() {
            return;
        }
        for chunk in content.chunks(max_payload) {
            write_frame(&mut self.0, FRAME_TYPE_BODY, channel_id, chunk);
        }
    }

    pub(crate) fn push_heartbeat(&mut self) {
        write_frame(&mut self.0, FRAME_TYPE_HEARTBEAT, 0, &[]);
    }

    /// Moves our contents into a fresh buffer, leaving self empty. Used by
    /// channel handles that serialize into a scratch buffer and then ship
    /// the bytes to the I/O thread.
    pub(crate) fn drain_into_new_buf(&mut self) -> OutputBuffer {
        let mut buf = OutputBuffer::empty();
        std::mem::swap(&mut buf.0, &mut self.0);
        buf
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.0.clear()
    }

    #[inline]
    pub(crate) fn drain_written(&mut self, n: usize) {
        self.0.drain(0..n);
    }

    #[inline]
    pub(crate) fn append(&mut self, mut other: OutputBuffer) {
        self.0.append(&mut other.0)
    }
}

impl Index<RangeFrom<usize>> for OutputBuffer {
    type Output = [u8];

    #[inline]
    fn index(&self, index: RangeFrom<usize>) -> &[u8] {
        &self.0[index]
    }
}

/// An output buffer that can be sealed once a connection `close` or
/// `close-ok` has been enqueued; writes pushed after sealing are silently
/// discarded, since nothing may follow a close on the wire.
pub(crate) struct SealableOutputBuffer {
    buf: OutputBuffer,
    sealed: bool,
}

impl SealableOutputBuffer {
    pub(crate) fn new(buf: OutputBuffer) -> SealableOutputBuffer {
        SealableOutputBuffer { buf, sealed: false }
    }

    #[inline]
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn push_method<M: Into<Method>>(&mut self, channel_id: u16, method: M) {
        if !self.sealed {
            self.buf.push_method(channel_id, method);
        }
    }

    pub(crate) fn push_heartbeat(&mut self) {
        if !self.sealed {
            self.buf.push_heartbeat();
        }
    }

    pub(crate) fn append(&mut self, other: OutputBuffer) {
        if !self.sealed {
            self.buf.append(other);
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.buf.clear()
    }

    #[inline]
    pub(crate) fn drain_written(&mut self, n: usize) {
        self.buf.drain_written(n)
    }
}

impl Index<RangeFrom<usize>> for SealableOutputBuffer {
    type Output = [u8];

    #[inline]
    fn index(&self, index: RangeFrom<usize>) -> &[u8] {
        &self.buf[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::frame::Frame;
    use crate::wire::method::ConnectionMethod;

    fn parse_all(mut bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        while !bytes.is_empty() {
            let size = Frame::required_size(bytes).unwrap();
            frames.push(Frame::parse(&bytes[..size]).unwrap());
            bytes = &bytes[size..];
        }
        frames
    }

    #[test]
    fn protocol_header_comes_first() {
        let buf = OutputBuffer::with_protocol_header();
        assert_eq!(&buf[0..], &PROTOCOL_HEADER[..]);
    }

    #[test]
    fn large_body_splits_at_frame_max() {
        let frame_max = 4096;
        let content = vec![0xab; 10_000];
        let mut buf = OutputBuffer::empty();
        buf.push_content_body(7, &content, frame_max);

        let frames = parse_all(&buf[0..]);
        assert_eq!(frames.len(), 3);
        let mut reassembled = Vec::new();
        for frame in frames {
            match frame {
                Frame::Body(7, chunk) => {
                    assert!(chunk.len() <= frame_max - FRAME_OVERHEAD);
                    reassembled.extend_from_slice(&chunk);
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(reassembled, content);
    }

    #[test]
    fn empty_body_emits_no_frames() {
        let mut buf = OutputBuffer::empty();
        buf.push_content_body(7, &[], 4096);
        assert!(buf.is_empty());
    }

    #[test]
    fn sealed_buffer_discards_writes() {
        let mut buf = SealableOutputBuffer::new(OutputBuffer::empty());
        buf.push_method(0, ConnectionMethod::CloseOk);
        buf.seal();
        let len = buf.len();
        buf.push_heartbeat();
        buf.push_method(0, ConnectionMethod::CloseOk);
        assert_eq!(buf.len(), len);
    }
}
