//! AMQP field tables: the typed name/value maps carried by method arguments,
//! message headers, and client/server properties.
//!
//! A table is a 4-byte length prefix followed by entries of
//! `{name: shortstr, type tag: u8, value}`. Type tags follow the RabbitMQ
//! dialect of AMQP 0-9-1.

use super::{put_short_string, put_u32, Decoder};
use crate::errors::*;
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;

/// A length-prefixed AMQP string.
///
/// AMQP strings are byte strings. They are UTF-8 in practice, but a
/// misbehaving peer can send anything, so decoding preserves the raw bytes
/// losslessly instead of rejecting; [`utf8_warning`](#method.utf8_warning)
/// flags values that were not valid UTF-8.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AmqpString(Vec<u8>);

impl AmqpString {
    pub fn new() -> AmqpString {
        AmqpString(Vec::new())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The string as UTF-8, or `None` if the bytes are not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// True if this value arrived as (or was built from) invalid UTF-8.
    pub fn utf8_warning(&self) -> bool {
        std::str::from_utf8(&self.0).is_err()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Debug for AmqpString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for AmqpString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl From<&str> for AmqpString {
    fn from(s: &str) -> AmqpString {
        AmqpString(s.as_bytes().to_vec())
    }
}

impl From<String> for AmqpString {
    fn from(s: String) -> AmqpString {
        AmqpString(s.into_bytes())
    }
}

impl From<Vec<u8>> for AmqpString {
    fn from(bytes: Vec<u8>) -> AmqpString {
        AmqpString(bytes)
    }
}

/// AMQP decimal: a scale (number of decimal digits after the point) and a
/// raw mantissa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decimal {
    pub scale: u8,
    pub value: i32,
}

/// A single field-table (or field-array) value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// `t`
    Boolean(bool),
    /// `b`
    ShortShortInt(i8),
    /// `B`
    ShortShortUint(u8),
    /// `U`
    ShortInt(i16),
    /// `u`
    ShortUint(u16),
    /// `I`
    LongInt(i32),
    /// `i`
    LongUint(u32),
    /// `L`
    LongLongInt(i64),
    /// `l`
    LongLongUint(u64),
    /// `f`
    Float(f32),
    /// `d`
    Double(f64),
    /// `D`
    Decimal(Decimal),
    /// `s`
    ShortString(AmqpString),
    /// `S`
    LongString(AmqpString),
    /// `A`
    Array(FieldArray),
    /// `T`
    Timestamp(u64),
    /// `F`
    Table(FieldTable),
    /// `V`
    Void,
    /// `x`
    ByteArray(Vec<u8>),
}

impl FieldValue {
    fn type_tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::ShortShortInt(_) => b'b',
            FieldValue::ShortShortUint(_) => b'B',
            FieldValue::ShortInt(_) => b'U',
            FieldValue::ShortUint(_) => b'u',
            FieldValue::LongInt(_) => b'I',
            FieldValue::LongUint(_) => b'i',
            FieldValue::LongLongInt(_) => b'L',
            FieldValue::LongLongUint(_) => b'l',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::ShortString(_) => b's',
            FieldValue::LongString(_) => b'S',
            FieldValue::Array(_) => b'A',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::Table(_) => b'F',
            FieldValue::Void => b'V',
            FieldValue::ByteArray(_) => b'x',
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.type_tag());
        match self {
            FieldValue::Boolean(v) => buf.push(*v as u8),
            FieldValue::ShortShortInt(v) => super::put_i8(buf, *v),
            FieldValue::ShortShortUint(v) => super::put_u8(buf, *v),
            FieldValue::ShortInt(v) => super::put_i16(buf, *v),
            FieldValue::ShortUint(v) => super::put_u16(buf, *v),
            FieldValue::LongInt(v) => super::put_i32(buf, *v),
            FieldValue::LongUint(v) => super::put_u32(buf, *v),
            FieldValue::LongLongInt(v) => super::put_i64(buf, *v),
            FieldValue::LongLongUint(v) => super::put_u64(buf, *v),
            FieldValue::Float(v) => super::put_f32(buf, *v),
            FieldValue::Double(v) => super::put_f64(buf, *v),
            FieldValue::Decimal(v) => {
                buf.push(v.scale);
                super::put_i32(buf, v.value);
            }
            FieldValue::ShortString(v) => put_short_string(buf, v.as_bytes()),
            FieldValue::LongString(v) => super::put_long_string(buf, v.as_bytes()),
            FieldValue::Array(v) => v.encode(buf),
            FieldValue::Timestamp(v) => super::put_u64(buf, *v),
            FieldValue::Table(v) => v.encode(buf),
            FieldValue::Void => (),
            FieldValue::ByteArray(v) => {
                put_u32(buf, v.len() as u32);
                buf.extend_from_slice(v);
            }
        }
    }

    fn decode(decoder: &mut Decoder) -> Result<FieldValue> {
        let tag = decoder.u8()?;
        Ok(match tag {
            b't' => FieldValue::Boolean(decoder.u8()? != 0),
            b'b' => FieldValue::ShortShortInt(decoder.i8()?),
            b'B' => FieldValue::ShortShortUint(decoder.u8()?),
            b'U' => FieldValue::ShortInt(decoder.i16()?),
            b'u' => FieldValue::ShortUint(decoder.u16()?),
            b'I' => FieldValue::LongInt(decoder.i32()?),
            b'i' => FieldValue::LongUint(decoder.u32()?),
            b'L' => FieldValue::LongLongInt(decoder.i64()?),
            b'l' => FieldValue::LongLongUint(decoder.u64()?),
            b'f' => FieldValue::Float(decoder.f32()?),
            b'd' => FieldValue::Double(decoder.f64()?),
            b'D' => FieldValue::Decimal(Decimal {
                scale: decoder.u8()?,
                value: decoder.i32()?,
            }),
            b's' => FieldValue::ShortString(decoder.short_str_raw()?.to_vec().into()),
            b'S' => FieldValue::LongString(decoder.long_str_raw()?.to_vec().into()),
            b'A' => FieldValue::Array(FieldArray::decode(decoder)?),
            b'T' => FieldValue::Timestamp(decoder.u64()?),
            b'F' => FieldValue::Table(FieldTable::decode(decoder)?),
            b'V' => FieldValue::Void,
            b'x' => {
                let len = decoder.u32()? as usize;
                FieldValue::ByteArray(decoder.take(len)?.to_vec())
            }
            tag => return UnknownTypeTagSnafu { tag }.fail(),
        })
    }
}

/// An ordered sequence of tagged values: 4-byte byte-length prefix, then
/// values back to back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldArray(pub Vec<FieldValue>);

impl FieldArray {
    pub fn new() -> FieldArray {
        FieldArray(Vec::new())
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let len_pos = buf.len();
        put_u32(buf, 0);
        for value in &self.0 {
            value.encode(buf);
        }
        patch_length(buf, len_pos);
    }

    pub(crate) fn decode(decoder: &mut Decoder) -> Result<FieldArray> {
        let len = decoder.u32()? as usize;
        let mut inner = Decoder::new(decoder.take(len)?);
        let mut values = Vec::new();
        while !inner.is_empty() {
            values.push(FieldValue::decode(&mut inner)?);
        }
        Ok(FieldArray(values))
    }
}

/// An AMQP field table. Entries keep insertion order so encoding is
/// deterministic and round-trips byte for byte.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTable(IndexMap<AmqpString, FieldValue>);

impl FieldTable {
    pub fn new() -> FieldTable {
        FieldTable(IndexMap::new())
    }

    pub fn insert<K: Into<AmqpString>>(&mut self, name: K, value: FieldValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(&AmqpString::from(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.shift_remove(&AmqpString::from(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AmqpString, &FieldValue)> {
        self.0.iter()
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let len_pos = buf.len();
        put_u32(buf, 0);
        for (name, value) in &self.0 {
            put_short_string(buf, name.as_bytes());
            value.encode(buf);
        }
        patch_length(buf, len_pos);
    }

    /// Encodes into a fresh buffer. Handy for argument fingerprinting.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    pub(crate) fn decode(decoder: &mut Decoder) -> Result<FieldTable> {
        let len = decoder.u32()? as usize;
        let mut inner = Decoder::new(decoder.take(len)?);
        let mut table = FieldTable::new();
        while !inner.is_empty() {
            let name: AmqpString = inner.short_str_raw()?.to_vec().into();
            let value = FieldValue::decode(&mut inner)?;
            table.0.insert(name, value);
        }
        Ok(table)
    }
}

/// Backfills a 4-byte length prefix written as a placeholder at `len_pos`.
fn patch_length(buf: &mut Vec<u8>, len_pos: usize) {
    let len = (buf.len() - len_pos - 4) as u32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(table: &FieldTable) -> FieldTable {
        let mut buf = Vec::new();
        table.encode(&mut buf);
        let mut decoder = Decoder::new(&buf);
        let decoded = FieldTable::decode(&mut decoder).unwrap();
        assert!(decoder.is_empty(), "decode left trailing bytes");
        decoded
    }

    fn table_with(name: &str, value: FieldValue) -> FieldTable {
        let mut t = FieldTable::new();
        t.insert(name, value);
        t
    }

    #[test]
    fn round_trip_every_tag() {
        let mut inner = FieldTable::new();
        inner.insert("nested", FieldValue::Boolean(true));

        let cases = vec![
            FieldValue::Boolean(false),
            FieldValue::ShortShortInt(-5),
            FieldValue::ShortShortUint(250),
            FieldValue::ShortInt(-1000),
            FieldValue::ShortUint(65000),
            FieldValue::LongInt(-1 << 20),
            FieldValue::LongUint(1 << 31),
            FieldValue::LongLongInt(-1 << 40),
            FieldValue::LongLongUint(1 << 63),
            FieldValue::Float(1.25),
            FieldValue::Double(-2.5e300),
            FieldValue::Decimal(Decimal {
                scale: 2,
                value: -12345,
            }),
            FieldValue::ShortString("short".into()),
            FieldValue::LongString("a longer string value".into()),
            FieldValue::Array(FieldArray(vec![
                FieldValue::LongInt(1),
                FieldValue::LongString("two".into()),
                FieldValue::Void,
            ])),
            FieldValue::Timestamp(1_234_567_890),
            FieldValue::Table(inner),
            FieldValue::Void,
            FieldValue::ByteArray(vec![0, 1, 2, 0xff]),
        ];

        for value in cases {
            let table = table_with("k", value);
            assert_eq!(round_trip(&table), table);
        }
    }

    #[test]
    fn round_trip_multiple_entries_keeps_order() {
        let mut table = FieldTable::new();
        table.insert("zeta", FieldValue::Boolean(true));
        table.insert("alpha", FieldValue::LongInt(7));
        table.insert("mid", FieldValue::LongString("x".into()));

        let decoded = round_trip(&table);
        let keys: Vec<String> = decoded.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut buf = Vec::new();
        FieldTable::new().encode(&mut buf);
        assert_eq!(buf, vec![0, 0, 0, 0]);
    }

    #[test]
    fn unknown_tag_rejected() {
        // table of 4 bytes: name "a", tag '?'
        let buf = [0, 0, 0, 3, 1, b'a', b'?'];
        let mut decoder = Decoder::new(&buf);
        match FieldTable::decode(&mut decoder) {
            Err(Error::UnknownTypeTag { tag }) => assert_eq!(tag, b'?'),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn truncated_value_rejected() {
        // declares a boolean but the table region ends before its byte
        let buf = [0, 0, 0, 3, 1, b'a', b't'];
        let mut decoder = Decoder::new(&buf);
        match FieldTable::decode(&mut decoder) {
            Err(Error::TruncatedBuffer) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn truncated_length_prefix_rejected() {
        let buf = [0, 0];
        let mut decoder = Decoder::new(&buf);
        match FieldTable::decode(&mut decoder) {
            Err(Error::TruncatedBuffer) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_preserved_not_rejected() {
        let raw: AmqpString = vec![0xff, 0xfe, b'a'].into();
        let table = table_with("k", FieldValue::LongString(raw.clone()));

        let decoded = round_trip(&table);
        match decoded.get("k") {
            Some(FieldValue::LongString(s)) => {
                assert!(s.utf8_warning());
                assert_eq!(s.as_bytes(), raw.as_bytes());
                assert_eq!(s.as_str(), None);
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn valid_utf8_has_no_warning() {
        let s = AmqpString::from("héllo");
        assert!(!s.utf8_warning());
        assert_eq!(s.as_str(), Some("héllo"));
    }
}
