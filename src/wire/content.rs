//! Content headers and the `basic` class property list.
//!
//! A content header frame carries `class-id(2) weight(2) body-size(8)` and a
//! 16-bit property flag mask, MSB first; a set bit means the corresponding
//! property is present, in the order AMQP 0-9-1 declares for
//! `basic.properties`.

use super::{put_short_string, put_u16, put_u64, Decoder, FieldTable};
use crate::errors::*;

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;

/// Properties attached to published and delivered messages.
///
/// Build with the `with_*` methods:
///
/// ```rust
/// use duramq::BasicProperties;
///
/// let props = BasicProperties::default()
///     .with_content_type("application/json")
///     .with_delivery_mode(2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicProperties {
    content_type: Option<String>,
    content_encoding: Option<String>,
    headers: Option<FieldTable>,
    delivery_mode: Option<u8>,
    priority: Option<u8>,
    correlation_id: Option<String>,
    expiration: Option<String>,
    reply_to: Option<String>,
    message_id: Option<String>,
    timestamp: Option<u64>,
    type_: Option<String>,
    user_id: Option<String>,
    app_id: Option<String>,
    cluster_id: Option<String>,
}

macro_rules! property_accessors {
    ($field:ident, $with:ident, $ty:ty) => {
        pub fn $with<T: Into<$ty>>(mut self, $field: T) -> Self {
            self.$field = Some($field.into());
            self
        }

        pub fn $field(&self) -> Option<&$ty> {
            self.$field.as_ref()
        }
    };
}

impl BasicProperties {
    property_accessors!(content_type, with_content_type, String);
    property_accessors!(content_encoding, with_content_encoding, String);
    property_accessors!(headers, with_headers, FieldTable);
    property_accessors!(correlation_id, with_correlation_id, String);
    property_accessors!(expiration, with_expiration, String);
    property_accessors!(reply_to, with_reply_to, String);
    property_accessors!(message_id, with_message_id, String);
    property_accessors!(type_, with_type, String);
    property_accessors!(user_id, with_user_id, String);
    property_accessors!(app_id, with_app_id, String);
    property_accessors!(cluster_id, with_cluster_id, String);

    /// Delivery mode: 1 transient, 2 persistent.
    pub fn with_delivery_mode(mut self, delivery_mode: u8) -> Self {
        self.delivery_mode = Some(delivery_mode);
        self
    }

    pub fn delivery_mode(&self) -> Option<u8> {
        self.delivery_mode
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    /// Seconds since the UNIX epoch.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    /// Merges a header into the (possibly absent) headers table.
    pub(crate) fn insert_header<K: Into<super::AmqpString>>(
        &mut self,
        name: K,
        value: super::FieldValue,
    ) {
        self.headers
            .get_or_insert_with(FieldTable::new)
            .insert(name, value);
    }

    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut flag_if = |present: bool, flag: u16| {
            if present {
                flags |= flag;
            }
        };
        flag_if(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        flag_if(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        flag_if(self.headers.is_some(), FLAG_HEADERS);
        flag_if(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        flag_if(self.priority.is_some(), FLAG_PRIORITY);
        flag_if(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        flag_if(self.reply_to.is_some(), FLAG_REPLY_TO);
        flag_if(self.expiration.is_some(), FLAG_EXPIRATION);
        flag_if(self.message_id.is_some(), FLAG_MESSAGE_ID);
        flag_if(self.timestamp.is_some(), FLAG_TIMESTAMP);
        flag_if(self.type_.is_some(), FLAG_TYPE);
        flag_if(self.user_id.is_some(), FLAG_USER_ID);
        flag_if(self.app_id.is_some(), FLAG_APP_ID);
        flag_if(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        fn put_opt_str(buf: &mut Vec<u8>, s: &Option<String>) {
            if let Some(s) = s {
                put_short_string(buf, s.as_bytes());
            }
        }

        put_u16(buf, self.flags());
        put_opt_str(buf, &self.content_type);
        put_opt_str(buf, &self.content_encoding);
        if let Some(headers) = &self.headers {
            headers.encode(buf);
        }
        if let Some(delivery_mode) = self.delivery_mode {
            buf.push(delivery_mode);
        }
        if let Some(priority) = self.priority {
            buf.push(priority);
        }
        put_opt_str(buf, &self.correlation_id);
        put_opt_str(buf, &self.reply_to);
        put_opt_str(buf, &self.expiration);
        put_opt_str(buf, &self.message_id);
        if let Some(timestamp) = self.timestamp {
            put_u64(buf, timestamp);
        }
        put_opt_str(buf, &self.type_);
        put_opt_str(buf, &self.user_id);
        put_opt_str(buf, &self.app_id);
        put_opt_str(buf, &self.cluster_id);
    }

    pub(crate) fn decode(d: &mut Decoder) -> Result<BasicProperties> {
        let flags = d.u16()?;
        let mut props = BasicProperties::default();
        if flags & FLAG_CONTENT_TYPE != 0 {
            props.content_type = Some(d.short_string()?);
        }
        if flags & FLAG_CONTENT_ENCODING != 0 {
            props.content_encoding = Some(d.short_string()?);
        }
        if flags & FLAG_HEADERS != 0 {
            props.headers = Some(FieldTable::decode(d)?);
        }
        if flags & FLAG_DELIVERY_MODE != 0 {
            props.delivery_mode = Some(d.u8()?);
        }
        if flags & FLAG_PRIORITY != 0 {
            props.priority = Some(d.u8()?);
        }
        if flags & FLAG_CORRELATION_ID != 0 {
            props.correlation_id = Some(d.short_string()?);
        }
        if flags & FLAG_REPLY_TO != 0 {
            props.reply_to = Some(d.short_string()?);
        }
        if flags & FLAG_EXPIRATION != 0 {
            props.expiration = Some(d.short_string()?);
        }
        if flags & FLAG_MESSAGE_ID != 0 {
            props.message_id = Some(d.short_string()?);
        }
        if flags & FLAG_TIMESTAMP != 0 {
            props.timestamp = Some(d.u64()?);
        }
        if flags & FLAG_TYPE != 0 {
            props.type_ = Some(d.short_string()?);
        }
        if flags & FLAG_USER_ID != 0 {
            props.user_id = Some(d.short_string()?);
        }
        if flags & FLAG_APP_ID != 0 {
            props.app_id = Some(d.short_string()?);
        }
        if flags & FLAG_CLUSTER_ID != 0 {
            props.cluster_id = Some(d.short_string()?);
        }
        Ok(props)
    }
}

/// The payload of a content header frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentHeader {
    pub class_id: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeader {
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.class_id);
        put_u16(buf, 0); // weight; reserved, must be zero
        put_u64(buf, self.body_size);
        self.properties.encode(buf);
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<ContentHeader> {
        let mut d = Decoder::new(payload);
        let class_id = d.u16()?;
        let _weight = d.u16()?;
        let body_size = d.u64()?;
        let properties = BasicProperties::decode(&mut d)?;
        if !d.is_empty() {
            return LengthMismatchSnafu {
                declared: payload.len(),
                consumed: payload.len() - d.remaining(),
            }
            .fail();
        }
        Ok(ContentHeader {
            class_id,
            body_size,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::method::CLASS_BASIC;
    use crate::wire::FieldValue;

    fn round_trip(header: &ContentHeader) -> ContentHeader {
        let mut buf = Vec::new();
        header.encode(&mut buf);
        ContentHeader::decode(&buf).unwrap()
    }

    #[test]
    fn round_trip_empty_properties() {
        let header = ContentHeader {
            class_id: CLASS_BASIC,
            body_size: 12,
            properties: BasicProperties::default(),
        };
        assert_eq!(round_trip(&header), header);
    }

    #[test]
    fn round_trip_all_properties() {
        let mut headers = FieldTable::new();
        headers.insert("x-guid", FieldValue::LongString("abc".into()));
        let properties = BasicProperties::default()
            .with_content_type("application/json")
            .with_content_encoding("identity")
            .with_headers(headers)
            .with_delivery_mode(2)
            .with_priority(5)
            .with_correlation_id("corr-1")
            .with_reply_to("amq.rabbitmq.reply-to")
            .with_expiration("60000")
            .with_message_id("msg-1")
            .with_timestamp(1_600_000_000)
            .with_type("event")
            .with_user_id("guest")
            .with_app_id("app")
            .with_cluster_id("cluster");
        let header = ContentHeader {
            class_id: CLASS_BASIC,
            body_size: u64::max_value(),
            properties,
        };
        assert_eq!(round_trip(&header), header);
    }

    #[test]
    fn flag_mask_is_msb_first() {
        let properties = BasicProperties::default().with_content_type("text/plain");
        let mut buf = Vec::new();
        properties.encode(&mut buf);
        // only bit 15 set
        assert_eq!(&buf[..2], &[0x80, 0x00]);
    }

    #[test]
    fn skipped_properties_leave_no_hole() {
        // content_type absent, delivery_mode present: the field follows the
        // mask directly.
        let properties = BasicProperties::default().with_delivery_mode(1);
        let mut buf = Vec::new();
        properties.encode(&mut buf);
        assert_eq!(buf, vec![0x10, 0x00, 1]);
    }

    #[test]
    fn truncated_header_rejected() {
        let header = ContentHeader {
            class_id: CLASS_BASIC,
            body_size: 0,
            properties: BasicProperties::default().with_message_id("msg"),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        buf.truncate(buf.len() - 2);
        assert!(ContentHeader::decode(&buf).is_err());
    }
}
