//! Hand-written AMQP 0-9-1 wire codec: frames, methods, field tables, and
//! content headers. All multi-byte integers are network byte order.

use crate::errors::*;
use byteorder::{BigEndian, ByteOrder};

pub mod content;
pub mod field_table;
pub mod frame;
pub mod method;

pub use content::{BasicProperties, ContentHeader};
pub use field_table::{AmqpString, Decimal, FieldArray, FieldTable, FieldValue};
pub use frame::{Frame, FRAME_END, PROTOCOL_HEADER};
pub use method::Method;

/// Minimum frame_max a peer may negotiate, per the AMQP 0-9-1 spec.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Decoding cursor over a borrowed byte slice. Every read either consumes
/// exactly the bytes it claims or fails with `TruncatedBuffer` without
/// consuming anything.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Decoder<'a> {
        Decoder { buf }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return TruncatedBufferSnafu.fail();
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    /// Reads a shortstr as a lossy UTF-8 `String`. Used for method fields,
    /// which are protocol identifiers; field-table strings go through
    /// [`AmqpString`] instead, which preserves raw bytes.
    pub(crate) fn short_string(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub(crate) fn long_string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub(crate) fn short_str_raw(&mut self) -> Result<&'a [u8]> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    pub(crate) fn long_str_raw(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

#[inline]
pub(crate) fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

#[inline]
pub(crate) fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_i8(buf: &mut Vec<u8>, v: i8) {
    buf.push(v as u8);
}

#[inline]
pub(crate) fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_f32(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Writes a length-prefixed shortstr. AMQP limits shortstr payloads to 255
/// bytes; identifiers past that limit are rejected by the broker anyway, so
/// the length octet simply truncates (mirroring the wider ecosystem).
pub(crate) fn put_short_string(buf: &mut Vec<u8>, s: &[u8]) {
    debug_assert!(s.len() <= 255, "shortstr longer than 255 bytes");
    let len = s.len().min(255);
    buf.push(len as u8);
    buf.extend_from_slice(&s[..len]);
}

pub(crate) fn put_long_string(buf: &mut Vec<u8>, s: &[u8]) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s);
}
