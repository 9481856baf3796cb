use crate::wire::method;
use crate::wire::BasicProperties;

/// An unroutable message returned to the publisher by the broker
/// (`basic.return`).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Return {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
    pub content: Vec<u8>,
    pub properties: BasicProperties,
}

impl Return {
    pub(crate) fn new(
        ret: method::Return,
        content: Vec<u8>,
        properties: BasicProperties,
    ) -> Return {
        Return {
            reply_code: ret.reply_code,
            reply_text: ret.reply_text,
            exchange: ret.exchange,
            routing_key: ret.routing_key,
            content,
            properties,
        }
    }
}
