use crate::wire::method::ExchangeDeclare;
use crate::wire::FieldTable;

/// Types of AMQP exchanges.
#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeType {
    /// Direct exchange; delivers messages to queues based on the routing
    /// key.
    Direct,

    /// Fanout exchange; delivers messages to all bound queues and ignores
    /// routing key.
    Fanout,

    /// Topic exchange; delivers messages based on matching between a message
    /// routing key and the pattern that was used to bind a queue to an
    /// exchange.
    Topic,

    /// Headers exchange; ignores routing key and routes based on message
    /// header fields.
    Headers,

    /// Custom exchange type; should begin with "x-".
    Custom(String),
}

impl AsRef<str> for ExchangeType {
    fn as_ref(&self) -> &str {
        use self::ExchangeType::*;
        match self {
            Direct => "direct",
            Fanout => "fanout",
            Topic => "topic",
            Headers => "headers",
            Custom(s) => s,
        }
    }
}

/// Options passed to the server when declaring an exchange.
///
/// The [`default`](#impl-Default) implementation sets all boolean fields to
/// false and has an empty set of arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeDeclareOptions {
    /// If true, declares exchange as durable (survives server restarts); if
    /// false, the exchange is deleted on a server restart.
    pub durable: bool,

    /// If true, declares exchange as auto-delete: it will be deleted once no
    /// queues are bound to it.
    pub auto_delete: bool,

    /// If true, declares exchange as internal: it may not be used by
    /// publishers, but only for exchange-to-exchange bindings.
    pub internal: bool,

    /// Extra arguments; these are optional in general, but may be needed for
    /// some plugins or server-specific features.
    pub arguments: FieldTable,
}

impl ExchangeDeclareOptions {
    pub(crate) fn into_declare(
        self,
        type_: ExchangeType,
        name: String,
        passive: bool,
        nowait: bool,
    ) -> ExchangeDeclare {
        ExchangeDeclare {
            ticket: 0,
            exchange: name,
            type_: type_.as_ref().to_string(),
            passive,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            nowait,
            arguments: self.arguments,
        }
    }
}
