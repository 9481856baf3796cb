use crate::wire::method::{Deliver, GetOk};
use crate::wire::BasicProperties;

/// A message delivered to a consumer (or fetched with `basic.get`).
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    delivery_tag: u64,
    /// True if this message was delivered before on a previous channel and
    /// went unacknowledged.
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub content: Vec<u8>,
    pub properties: BasicProperties,
}

impl Delivery {
    pub(crate) fn new(
        deliver: Deliver,
        content: Vec<u8>,
        properties: BasicProperties,
    ) -> (String, Delivery) {
        (
            deliver.consumer_tag,
            Delivery {
                delivery_tag: deliver.delivery_tag,
                redelivered: deliver.redelivered,
                exchange: deliver.exchange,
                routing_key: deliver.routing_key,
                content,
                properties,
            },
        )
    }

    pub(crate) fn new_get_ok(
        get_ok: GetOk,
        content: Vec<u8>,
        properties: BasicProperties,
    ) -> Delivery {
        Delivery {
            delivery_tag: get_ok.delivery_tag,
            redelivered: get_ok.redelivered,
            exchange: get_ok.exchange,
            routing_key: get_ok.routing_key,
            content,
            properties,
        }
    }

    /// The broker-assigned delivery tag; pass it to
    /// [`Consumer::ack`](struct.Consumer.html#method.ack) and friends. Tags
    /// are scoped to a channel generation and die with it.
    #[inline]
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }
}
