//! AMQP 0-9-1 method codec.
//!
//! Methods are a closed discriminated union keyed by `(class_id, method_id)`;
//! encode/decode is a single dispatch on that pair. Consecutive `bit` fields
//! are packed into shared octets, least significant bit first.

use super::{put_short_string, put_u16, put_u32, put_u64, Decoder, FieldTable};
use crate::errors::*;

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;
pub const CLASS_CONFIRM: u16 = 85;
pub const CLASS_TX: u16 = 90;

/// Reply code sent in `close` methods for a normal shutdown.
pub const REPLY_SUCCESS: u16 = 200;

/// Every AMQP method this library speaks, grouped by class.
#[derive(Clone, Debug, PartialEq)]
pub enum Method {
    Connection(ConnectionMethod),
    Channel(ChannelMethod),
    Exchange(ExchangeMethod),
    Queue(QueueMethod),
    Basic(BasicMethod),
    Confirm(ConfirmMethod),
    Tx(TxMethod),
}

impl Method {
    pub fn class_id(&self) -> u16 {
        match self {
            Method::Connection(_) => CLASS_CONNECTION,
            Method::Channel(_) => CLASS_CHANNEL,
            Method::Exchange(_) => CLASS_EXCHANGE,
            Method::Queue(_) => CLASS_QUEUE,
            Method::Basic(_) => CLASS_BASIC,
            Method::Confirm(_) => CLASS_CONFIRM,
            Method::Tx(_) => CLASS_TX,
        }
    }

    pub fn method_id(&self) -> u16 {
        match self {
            Method::Connection(m) => m.method_id(),
            Method::Channel(m) => m.method_id(),
            Method::Exchange(m) => m.method_id(),
            Method::Queue(m) => m.method_id(),
            Method::Basic(m) => m.method_id(),
            Method::Confirm(m) => m.method_id(),
            Method::Tx(m) => m.method_id(),
        }
    }

    /// Serializes class id, method id, and the method body.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.class_id());
        put_u16(buf, self.method_id());
        match self {
            Method::Connection(m) => m.encode_body(buf),
            Method::Channel(m) => m.encode_body(buf),
            Method::Exchange(m) => m.encode_body(buf),
            Method::Queue(m) => m.encode_body(buf),
            Method::Basic(m) => m.encode_body(buf),
            Method::Confirm(m) => m.encode_body(buf),
            Method::Tx(m) => m.encode_body(buf),
        }
    }

    /// Parses a complete method-frame payload. The payload must be consumed
    /// exactly; trailing bytes are a length mismatch.
    pub fn decode(payload: &[u8]) -> Result<Method> {
        let mut d = Decoder::new(payload);
        let class_id = d.u16().map_err(|_| Error::ReceivedMalformed)?;
        let method_id = d.u16().map_err(|_| Error::ReceivedMalformed)?;

        let method = Method::decode_body(class_id, method_id, &mut d).map_err(|err| match err {
            Error::TruncatedBuffer => Error::MethodBodyTruncated {
                class_id,
                method_id,
            },
            other => other,
        })?;

        if !d.is_empty() {
            return LengthMismatchSnafu {
                declared: payload.len(),
                consumed: payload.len() - d.remaining(),
            }
            .fail();
        }
        Ok(method)
    }

    fn decode_body(class_id: u16, method_id: u16, d: &mut Decoder) -> Result<Method> {
        Ok(match class_id {
            CLASS_CONNECTION => Method::Connection(ConnectionMethod::decode_body(method_id, d)?),
            CLASS_CHANNEL => Method::Channel(ChannelMethod::decode_body(method_id, d)?),
            CLASS_EXCHANGE => Method::Exchange(ExchangeMethod::decode_body(method_id, d)?),
            CLASS_QUEUE => Method::Queue(QueueMethod::decode_body(method_id, d)?),
            CLASS_BASIC => Method::Basic(BasicMethod::decode_body(method_id, d)?),
            CLASS_CONFIRM => Method::Confirm(ConfirmMethod::decode_body(method_id, d)?),
            CLASS_TX => Method::Tx(TxMethod::decode_body(method_id, d)?),
            _ => {
                return UnknownMethodSnafu {
                    class_id,
                    method_id,
                }
                .fail()
            }
        })
    }
}

impl From<ConnectionMethod> for Method {
    fn from(m: ConnectionMethod) -> Method {
        Method::Connection(m)
    }
}

impl From<ChannelMethod> for Method {
    fn from(m: ChannelMethod) -> Method {
        Method::Channel(m)
    }
}

impl From<ExchangeMethod> for Method {
    fn from(m: ExchangeMethod) -> Method {
        Method::Exchange(m)
    }
}

impl From<QueueMethod> for Method {
    fn from(m: QueueMethod) -> Method {
        Method::Queue(m)
    }
}

impl From<BasicMethod> for Method {
    fn from(m: BasicMethod) -> Method {
        Method::Basic(m)
    }
}

impl From<ConfirmMethod> for Method {
    fn from(m: ConfirmMethod) -> Method {
        Method::Confirm(m)
    }
}

impl From<TxMethod> for Method {
    fn from(m: TxMethod) -> Method {
        Method::Tx(m)
    }
}

// ------------------------------------------------------------------------
// connection
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Start {
    pub version_major: u8,
    pub version_minor: u8,
    pub server_properties: FieldTable,
    pub mechanisms: String,
    pub locales: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartOk {
    pub client_properties: FieldTable,
    pub mechanism: String,
    pub response: String,
    pub locale: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Secure {
    pub challenge: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SecureOk {
    pub response: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tune {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TuneOk {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOpen {
    pub virtual_host: String,
    /// Reserved by 0-9-1; always empty.
    pub capabilities: String,
    /// Reserved by 0-9-1; always false.
    pub insist: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOpenOk {
    /// Reserved by 0-9-1; always empty.
    pub known_hosts: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionClose {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Blocked {
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionMethod {
    Start(Start),
    StartOk(StartOk),
    Secure(Secure),
    SecureOk(SecureOk),
    Tune(Tune),
    TuneOk(TuneOk),
    Open(ConnectionOpen),
    OpenOk(ConnectionOpenOk),
    Close(ConnectionClose),
    CloseOk,
    Blocked(Blocked),
    Unblocked,
}

impl ConnectionMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            ConnectionMethod::Start(_) => 10,
            ConnectionMethod::StartOk(_) => 11,
            ConnectionMethod::Secure(_) => 20,
            ConnectionMethod::SecureOk(_) => 21,
            ConnectionMethod::Tune(_) => 30,
            ConnectionMethod::TuneOk(_) => 31,
            ConnectionMethod::Open(_) => 40,
            ConnectionMethod::OpenOk(_) => 41,
            ConnectionMethod::Close(_) => 50,
            ConnectionMethod::CloseOk => 51,
            ConnectionMethod::Blocked(_) => 60,
            ConnectionMethod::Unblocked => 61,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            ConnectionMethod::Start(m) => {
                buf.push(m.version_major);
                buf.push(m.version_minor);
                m.server_properties.encode(buf);
                super::put_long_string(buf, m.mechanisms.as_bytes());
                super::put_long_string(buf, m.locales.as_bytes());
            }
            ConnectionMethod::StartOk(m) => {
                m.client_properties.encode(buf);
                put_short_string(buf, m.mechanism.as_bytes());
                super::put_long_string(buf, m.response.as_bytes());
                put_short_string(buf, m.locale.as_bytes());
            }
            ConnectionMethod::Secure(m) => {
                super::put_long_string(buf, m.challenge.as_bytes());
            }
            ConnectionMethod::SecureOk(m) => {
                super::put_long_string(buf, m.response.as_bytes());
            }
            ConnectionMethod::Tune(m) => {
                put_u16(buf, m.channel_max);
                put_u32(buf, m.frame_max);
                put_u16(buf, m.heartbeat);
            }
            ConnectionMethod::TuneOk(m) => {
                put_u16(buf, m.channel_max);
                put_u32(buf, m.frame_max);
                put_u16(buf, m.heartbeat);
            }
            ConnectionMethod::Open(m) => {
                put_short_string(buf, m.virtual_host.as_bytes());
                put_short_string(buf, m.capabilities.as_bytes());
                buf.push(m.insist as u8);
            }
            ConnectionMethod::OpenOk(m) => {
                put_short_string(buf, m.known_hosts.as_bytes());
            }
            ConnectionMethod::Close(m) => {
                put_u16(buf, m.reply_code);
                put_short_string(buf, m.reply_text.as_bytes());
                put_u16(buf, m.class_id);
                put_u16(buf, m.method_id);
            }
            ConnectionMethod::CloseOk => (),
            ConnectionMethod::Blocked(m) => {
                put_short_string(buf, m.reason.as_bytes());
            }
            ConnectionMethod::Unblocked => (),
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<ConnectionMethod> {
        Ok(match method_id {
            10 => ConnectionMethod::Start(Start {
                version_major: d.u8()?,
                version_minor: d.u8()?,
                server_properties: FieldTable::decode(d)?,
                mechanisms: d.long_string()?,
                locales: d.long_string()?,
            }),
            11 => ConnectionMethod::StartOk(StartOk {
                client_properties: FieldTable::decode(d)?,
                mechanism: d.short_string()?,
                response: d.long_string()?,
                locale: d.short_string()?,
            }),
            20 => ConnectionMethod::Secure(Secure {
                challenge: d.long_string()?,
            }),
            21 => ConnectionMethod::SecureOk(SecureOk {
                response: d.long_string()?,
            }),
            30 => ConnectionMethod::Tune(Tune {
                channel_max: d.u16()?,
                frame_max: d.u32()?,
                heartbeat: d.u16()?,
            }),
            31 => ConnectionMethod::TuneOk(TuneOk {
                channel_max: d.u16()?,
                frame_max: d.u32()?,
                heartbeat: d.u16()?,
            }),
            40 => ConnectionMethod::Open(ConnectionOpen {
                virtual_host: d.short_string()?,
                capabilities: d.short_string()?,
                insist: d.u8()? & 1 != 0,
            }),
            41 => ConnectionMethod::OpenOk(ConnectionOpenOk {
                known_hosts: d.short_string()?,
            }),
            50 => ConnectionMethod::Close(ConnectionClose {
                reply_code: d.u16()?,
                reply_text: d.short_string()?,
                class_id: d.u16()?,
                method_id: d.u16()?,
            }),
            51 => ConnectionMethod::CloseOk,
            60 => ConnectionMethod::Blocked(Blocked {
                reason: d.short_string()?,
            }),
            61 => ConnectionMethod::Unblocked,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_CONNECTION,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// channel
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelClose {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelMethod {
    /// `out_of_band` is reserved by 0-9-1 and always empty.
    Open { out_of_band: String },
    /// The longstr payload is reserved by 0-9-1 and always empty.
    OpenOk { channel_id: String },
    Flow { active: bool },
    FlowOk { active: bool },
    Close(ChannelClose),
    CloseOk,
}

impl ChannelMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            ChannelMethod::Open { .. } => 10,
            ChannelMethod::OpenOk { .. } => 11,
            ChannelMethod::Flow { .. } => 20,
            ChannelMethod::FlowOk { .. } => 21,
            ChannelMethod::Close(_) => 40,
            ChannelMethod::CloseOk => 41,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            ChannelMethod::Open { out_of_band } => {
                put_short_string(buf, out_of_band.as_bytes());
            }
            ChannelMethod::OpenOk { channel_id } => {
                super::put_long_string(buf, channel_id.as_bytes());
            }
            ChannelMethod::Flow { active } | ChannelMethod::FlowOk { active } => {
                buf.push(*active as u8);
            }
            ChannelMethod::Close(m) => {
                put_u16(buf, m.reply_code);
                put_short_string(buf, m.reply_text.as_bytes());
                put_u16(buf, m.class_id);
                put_u16(buf, m.method_id);
            }
            ChannelMethod::CloseOk => (),
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<ChannelMethod> {
        Ok(match method_id {
            10 => ChannelMethod::Open {
                out_of_band: d.short_string()?,
            },
            11 => ChannelMethod::OpenOk {
                channel_id: d.long_string()?,
            },
            20 => ChannelMethod::Flow {
                active: d.u8()? & 1 != 0,
            },
            21 => ChannelMethod::FlowOk {
                active: d.u8()? & 1 != 0,
            },
            40 => ChannelMethod::Close(ChannelClose {
                reply_code: d.u16()?,
                reply_text: d.short_string()?,
                class_id: d.u16()?,
                method_id: d.u16()?,
            }),
            41 => ChannelMethod::CloseOk,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_CHANNEL,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// exchange
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeDeclare {
    pub ticket: u16,
    pub exchange: String,
    pub type_: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub nowait: bool,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeDelete {
    pub ticket: u16,
    pub exchange: String,
    pub if_unused: bool,
    pub nowait: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeBind {
    pub ticket: u16,
    pub destination: String,
    pub source: String,
    pub routing_key: String,
    pub nowait: bool,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeMethod {
    Declare(ExchangeDeclare),
    DeclareOk,
    Delete(ExchangeDelete),
    DeleteOk,
    Bind(ExchangeBind),
    BindOk,
    Unbind(ExchangeBind),
    UnbindOk,
}

impl ExchangeMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            ExchangeMethod::Declare(_) => 10,
            ExchangeMethod::DeclareOk => 11,
            ExchangeMethod::Delete(_) => 20,
            ExchangeMethod::DeleteOk => 21,
            ExchangeMethod::Bind(_) => 30,
            ExchangeMethod::BindOk => 31,
            ExchangeMethod::Unbind(_) => 40,
            // Not 41: 0-9-1 reserves 41 and assigns unbind-ok 51.
            ExchangeMethod::UnbindOk => 51,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            ExchangeMethod::Declare(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.type_.as_bytes());
                let mut bits = 0u8;
                if m.passive {
                    bits |= 1 << 0;
                }
                if m.durable {
                    bits |= 1 << 1;
                }
                if m.auto_delete {
                    bits |= 1 << 2;
                }
                if m.internal {
                    bits |= 1 << 3;
                }
                if m.nowait {
                    bits |= 1 << 4;
                }
                buf.push(bits);
                m.arguments.encode(buf);
            }
            ExchangeMethod::Delete(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.exchange.as_bytes());
                let mut bits = 0u8;
                if m.if_unused {
                    bits |= 1 << 0;
                }
                if m.nowait {
                    bits |= 1 << 1;
                }
                buf.push(bits);
            }
            ExchangeMethod::Bind(m) | ExchangeMethod::Unbind(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.destination.as_bytes());
                put_short_string(buf, m.source.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
                buf.push(m.nowait as u8);
                m.arguments.encode(buf);
            }
            ExchangeMethod::DeclareOk
            | ExchangeMethod::DeleteOk
            | ExchangeMethod::BindOk
            | ExchangeMethod::UnbindOk => (),
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<ExchangeMethod> {
        fn bind(d: &mut Decoder) -> Result<ExchangeBind> {
            Ok(ExchangeBind {
                ticket: d.u16()?,
                destination: d.short_string()?,
                source: d.short_string()?,
                routing_key: d.short_string()?,
                nowait: d.u8()? & 1 != 0,
                arguments: FieldTable::decode(d)?,
            })
        }

        Ok(match method_id {
            10 => {
                let ticket = d.u16()?;
                let exchange = d.short_string()?;
                let type_ = d.short_string()?;
                let bits = d.u8()?;
                ExchangeMethod::Declare(ExchangeDeclare {
                    ticket,
                    exchange,
                    type_,
                    passive: bits & (1 << 0) != 0,
                    durable: bits & (1 << 1) != 0,
                    auto_delete: bits & (1 << 2) != 0,
                    internal: bits & (1 << 3) != 0,
                    nowait: bits & (1 << 4) != 0,
                    arguments: FieldTable::decode(d)?,
                })
            }
            11 => ExchangeMethod::DeclareOk,
            20 => {
                let ticket = d.u16()?;
                let exchange = d.short_string()?;
                let bits = d.u8()?;
                ExchangeMethod::Delete(ExchangeDelete {
                    ticket,
                    exchange,
                    if_unused: bits & (1 << 0) != 0,
                    nowait: bits & (1 << 1) != 0,
                })
            }
            21 => ExchangeMethod::DeleteOk,
            30 => ExchangeMethod::Bind(bind(d)?),
            31 => ExchangeMethod::BindOk,
            40 => ExchangeMethod::Unbind(bind(d)?),
            51 => ExchangeMethod::UnbindOk,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_EXCHANGE,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// queue
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct QueueDeclare {
    pub ticket: u16,
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub nowait: bool,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueDeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueBind {
    pub ticket: u16,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub nowait: bool,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueUnbind {
    pub ticket: u16,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueDelete {
    pub ticket: u16,
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub nowait: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueMethod {
    Declare(QueueDeclare),
    DeclareOk(QueueDeclareOk),
    Bind(QueueBind),
    BindOk,
    Purge {
        ticket: u16,
        queue: String,
        nowait: bool,
    },
    PurgeOk {
        message_count: u32,
    },
    Delete(QueueDelete),
    DeleteOk {
        message_count: u32,
    },
    Unbind(QueueUnbind),
    UnbindOk,
}

impl QueueMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            QueueMethod::Declare(_) => 10,
            QueueMethod::DeclareOk(_) => 11,
            QueueMethod::Bind(_) => 20,
            QueueMethod::BindOk => 21,
            QueueMethod::Purge { .. } => 30,
            QueueMethod::PurgeOk { .. } => 31,
            QueueMethod::Delete(_) => 40,
            QueueMethod::DeleteOk { .. } => 41,
            QueueMethod::Unbind(_) => 50,
            QueueMethod::UnbindOk => 51,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            QueueMethod::Declare(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.queue.as_bytes());
                let mut bits = 0u8;
                if m.passive {
                    bits |= 1 << 0;
                }
                if m.durable {
                    bits |= 1 << 1;
                }
                if m.exclusive {
                    bits |= 1 << 2;
                }
                if m.auto_delete {
                    bits |= 1 << 3;
                }
                if m.nowait {
                    bits |= 1 << 4;
                }
                buf.push(bits);
                m.arguments.encode(buf);
            }
            QueueMethod::DeclareOk(m) => {
                put_short_string(buf, m.queue.as_bytes());
                put_u32(buf, m.message_count);
                put_u32(buf, m.consumer_count);
            }
            QueueMethod::Bind(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.queue.as_bytes());
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
                buf.push(m.nowait as u8);
                m.arguments.encode(buf);
            }
            QueueMethod::BindOk => (),
            QueueMethod::Purge {
                ticket,
                queue,
                nowait,
            } => {
                put_u16(buf, *ticket);
                put_short_string(buf, queue.as_bytes());
                buf.push(*nowait as u8);
            }
            QueueMethod::PurgeOk { message_count } => {
                put_u32(buf, *message_count);
            }
            QueueMethod::Delete(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.queue.as_bytes());
                let mut bits = 0u8;
                if m.if_unused {
                    bits |= 1 << 0;
                }
                if m.if_empty {
                    bits |= 1 << 1;
                }
                if m.nowait {
                    bits |= 1 << 2;
                }
                buf.push(bits);
            }
            QueueMethod::DeleteOk { message_count } => {
                put_u32(buf, *message_count);
            }
            QueueMethod::Unbind(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.queue.as_bytes());
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
                m.arguments.encode(buf);
            }
            QueueMethod::UnbindOk => (),
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<QueueMethod> {
        Ok(match method_id {
            10 => {
                let ticket = d.u16()?;
                let queue = d.short_string()?;
                let bits = d.u8()?;
                QueueMethod::Declare(QueueDeclare {
                    ticket,
                    queue,
                    passive: bits & (1 << 0) != 0,
                    durable: bits & (1 << 1) != 0,
                    exclusive: bits & (1 << 2) != 0,
                    auto_delete: bits & (1 << 3) != 0,
                    nowait: bits & (1 << 4) != 0,
                    arguments: FieldTable::decode(d)?,
                })
            }
            11 => QueueMethod::DeclareOk(QueueDeclareOk {
                queue: d.short_string()?,
                message_count: d.u32()?,
                consumer_count: d.u32()?,
            }),
            20 => QueueMethod::Bind(QueueBind {
                ticket: d.u16()?,
                queue: d.short_string()?,
                exchange: d.short_string()?,
                routing_key: d.short_string()?,
                nowait: d.u8()? & 1 != 0,
                arguments: FieldTable::decode(d)?,
            }),
            21 => QueueMethod::BindOk,
            30 => QueueMethod::Purge {
                ticket: d.u16()?,
                queue: d.short_string()?,
                nowait: d.u8()? & 1 != 0,
            },
            31 => QueueMethod::PurgeOk {
                message_count: d.u32()?,
            },
            40 => {
                let ticket = d.u16()?;
                let queue = d.short_string()?;
                let bits = d.u8()?;
                QueueMethod::Delete(QueueDelete {
                    ticket,
                    queue,
                    if_unused: bits & (1 << 0) != 0,
                    if_empty: bits & (1 << 1) != 0,
                    nowait: bits & (1 << 2) != 0,
                })
            }
            41 => QueueMethod::DeleteOk {
                message_count: d.u32()?,
            },
            50 => QueueMethod::Unbind(QueueUnbind {
                ticket: d.u16()?,
                queue: d.short_string()?,
                exchange: d.short_string()?,
                routing_key: d.short_string()?,
                arguments: FieldTable::decode(d)?,
            }),
            51 => QueueMethod::UnbindOk,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_QUEUE,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// basic
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Qos {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Consume {
    pub ticket: u16,
    pub queue: String,
    pub consumer_tag: String,
    pub no_local: bool,
    pub no_ack: bool,
    pub exclusive: bool,
    pub nowait: bool,
    pub arguments: FieldTable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Publish {
    pub ticket: u16,
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Return {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Deliver {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetOk {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BasicMethod {
    Qos(Qos),
    QosOk,
    Consume(Consume),
    ConsumeOk {
        consumer_tag: String,
    },
    Cancel {
        consumer_tag: String,
        nowait: bool,
    },
    CancelOk {
        consumer_tag: String,
    },
    Publish(Publish),
    Return(Return),
    Deliver(Deliver),
    Get {
        ticket: u16,
        queue: String,
        no_ack: bool,
    },
    GetOk(GetOk),
    GetEmpty {
        /// Reserved by 0-9-1; always empty.
        cluster_id: String,
    },
    Ack {
        delivery_tag: u64,
        multiple: bool,
    },
    Reject {
        delivery_tag: u64,
        requeue: bool,
    },
    Recover {
        requeue: bool,
    },
    RecoverOk,
    Nack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },
}

impl BasicMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            BasicMethod::Qos(_) => 10,
            BasicMethod::QosOk => 11,
            BasicMethod::Consume(_) => 20,
            BasicMethod::ConsumeOk { .. } => 21,
            BasicMethod::Cancel { .. } => 30,
            BasicMethod::CancelOk { .. } => 31,
            BasicMethod::Publish(_) => 40,
            BasicMethod::Return(_) => 50,
            BasicMethod::Deliver(_) => 60,
            BasicMethod::Get { .. } => 70,
            BasicMethod::GetOk(_) => 71,
            BasicMethod::GetEmpty { .. } => 72,
            BasicMethod::Ack { .. } => 80,
            BasicMethod::Reject { .. } => 90,
            BasicMethod::Recover { .. } => 110,
            BasicMethod::RecoverOk => 111,
            BasicMethod::Nack { .. } => 120,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            BasicMethod::Qos(m) => {
                put_u32(buf, m.prefetch_size);
                put_u16(buf, m.prefetch_count);
                buf.push(m.global as u8);
            }
            BasicMethod::QosOk => (),
            BasicMethod::Consume(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.queue.as_bytes());
                put_short_string(buf, m.consumer_tag.as_bytes());
                let mut bits = 0u8;
                if m.no_local {
                    bits |= 1 << 0;
                }
                if m.no_ack {
                    bits |= 1 << 1;
                }
                if m.exclusive {
                    bits |= 1 << 2;
                }
                if m.nowait {
                    bits |= 1 << 3;
                }
                buf.push(bits);
                m.arguments.encode(buf);
            }
            BasicMethod::ConsumeOk { consumer_tag } => {
                put_short_string(buf, consumer_tag.as_bytes());
            }
            BasicMethod::Cancel {
                consumer_tag,
                nowait,
            } => {
                put_short_string(buf, consumer_tag.as_bytes());
                buf.push(*nowait as u8);
            }
            BasicMethod::CancelOk { consumer_tag } => {
                put_short_string(buf, consumer_tag.as_bytes());
            }
            BasicMethod::Publish(m) => {
                put_u16(buf, m.ticket);
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
                let mut bits = 0u8;
                if m.mandatory {
                    bits |= 1 << 0;
                }
                if m.immediate {
                    bits |= 1 << 1;
                }
                buf.push(bits);
            }
            BasicMethod::Return(m) => {
                put_u16(buf, m.reply_code);
                put_short_string(buf, m.reply_text.as_bytes());
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
            }
            BasicMethod::Deliver(m) => {
                put_short_string(buf, m.consumer_tag.as_bytes());
                put_u64(buf, m.delivery_tag);
                buf.push(m.redelivered as u8);
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
            }
            BasicMethod::Get {
                ticket,
                queue,
                no_ack,
            } => {
                put_u16(buf, *ticket);
                put_short_string(buf, queue.as_bytes());
                buf.push(*no_ack as u8);
            }
            BasicMethod::GetOk(m) => {
                put_u64(buf, m.delivery_tag);
                buf.push(m.redelivered as u8);
                put_short_string(buf, m.exchange.as_bytes());
                put_short_string(buf, m.routing_key.as_bytes());
                put_u32(buf, m.message_count);
            }
            BasicMethod::GetEmpty { cluster_id } => {
                put_short_string(buf, cluster_id.as_bytes());
            }
            BasicMethod::Ack {
                delivery_tag,
                multiple,
            } => {
                put_u64(buf, *delivery_tag);
                buf.push(*multiple as u8);
            }
            BasicMethod::Reject {
                delivery_tag,
                requeue,
            } => {
                put_u64(buf, *delivery_tag);
                buf.push(*requeue as u8);
            }
            BasicMethod::Recover { requeue } => {
                buf.push(*requeue as u8);
            }
            BasicMethod::RecoverOk => (),
            BasicMethod::Nack {
                delivery_tag,
                multiple,
                requeue,
            } => {
                put_u64(buf, *delivery_tag);
                let mut bits = 0u8;
                if *multiple {
                    bits |= 1 << 0;
                }
                if *requeue {
                    bits |= 1 << 1;
                }
                buf.push(bits);
            }
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<BasicMethod> {
        Ok(match method_id {
            10 => BasicMethod::Qos(Qos {
                prefetch_size: d.u32()?,
                prefetch_count: d.u16()?,
                global: d.u8()? & 1 != 0,
            }),
            11 => BasicMethod::QosOk,
            20 => {
                let ticket = d.u16()?;
                let queue = d.short_string()?;
                let consumer_tag = d.short_string()?;
                let bits = d.u8()?;
                BasicMethod::Consume(Consume {
                    ticket,
                    queue,
                    consumer_tag,
                    no_local: bits & (1 << 0) != 0,
                    no_ack: bits & (1 << 1) != 0,
                    exclusive: bits & (1 << 2) != 0,
                    nowait: bits & (1 << 3) != 0,
                    arguments: FieldTable::decode(d)?,
                })
            }
            21 => BasicMethod::ConsumeOk {
                consumer_tag: d.short_string()?,
            },
            30 => BasicMethod::Cancel {
                consumer_tag: d.short_string()?,
                nowait: d.u8()? & 1 != 0,
            },
            31 => BasicMethod::CancelOk {
                consumer_tag: d.short_string()?,
            },
            40 => {
                let ticket = d.u16()?;
                let exchange = d.short_string()?;
                let routing_key = d.short_string()?;
                let bits = d.u8()?;
                BasicMethod::Publish(Publish {
                    ticket,
                    exchange,
                    routing_key,
                    mandatory: bits & (1 << 0) != 0,
                    immediate: bits & (1 << 1) != 0,
                })
            }
            50 => BasicMethod::Return(Return {
                reply_code: d.u16()?,
                reply_text: d.short_string()?,
                exchange: d.short_string()?,
                routing_key: d.short_string()?,
            }),
            60 => BasicMethod::Deliver(Deliver {
                consumer_tag: d.short_string()?,
                delivery_tag: d.u64()?,
                redelivered: d.u8()? & 1 != 0,
                exchange: d.short_string()?,
                routing_key: d.short_string()?,
            }),
            70 => BasicMethod::Get {
                ticket: d.u16()?,
                queue: d.short_string()?,
                no_ack: d.u8()? & 1 != 0,
            },
            71 => BasicMethod::GetOk(GetOk {
                delivery_tag: d.u64()?,
                redelivered: d.u8()? & 1 != 0,
                exchange: d.short_string()?,
                routing_key: d.short_string()?,
                message_count: d.u32()?,
            }),
            72 => BasicMethod::GetEmpty {
                cluster_id: d.short_string()?,
            },
            80 => BasicMethod::Ack {
                delivery_tag: d.u64()?,
                multiple: d.u8()? & 1 != 0,
            },
            90 => BasicMethod::Reject {
                delivery_tag: d.u64()?,
                requeue: d.u8()? & 1 != 0,
            },
            110 => BasicMethod::Recover {
                requeue: d.u8()? & 1 != 0,
            },
            111 => BasicMethod::RecoverOk,
            120 => {
                let delivery_tag = d.u64()?;
                let bits = d.u8()?;
                BasicMethod::Nack {
                    delivery_tag,
                    multiple: bits & (1 << 0) != 0,
                    requeue: bits & (1 << 1) != 0,
                }
            }
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_BASIC,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// confirm
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmMethod {
    Select { nowait: bool },
    SelectOk,
}

impl ConfirmMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            ConfirmMethod::Select { .. } => 10,
            ConfirmMethod::SelectOk => 11,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            ConfirmMethod::Select { nowait } => buf.push(*nowait as u8),
            ConfirmMethod::SelectOk => (),
        }
    }

    fn decode_body(method_id: u16, d: &mut Decoder) -> Result<ConfirmMethod> {
        Ok(match method_id {
            10 => ConfirmMethod::Select {
                nowait: d.u8()? & 1 != 0,
            },
            11 => ConfirmMethod::SelectOk,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_CONFIRM,
                    method_id,
                }
                .fail()
            }
        })
    }
}

// ------------------------------------------------------------------------
// tx - declared for protocol completeness; this library never sends them.
// ------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum TxMethod {
    Select,
    SelectOk,
    Commit,
    CommitOk,
    Rollback,
    RollbackOk,
}

impl TxMethod {
    pub fn method_id(&self) -> u16 {
        match self {
            TxMethod::Select => 10,
            TxMethod::SelectOk => 11,
            TxMethod::Commit => 20,
            TxMethod::CommitOk => 21,
            TxMethod::Rollback => 30,
            TxMethod::RollbackOk => 31,
        }
    }

    fn encode_body(&self, _buf: &mut Vec<u8>) {}

    fn decode_body(method_id: u16, _d: &mut Decoder) -> Result<TxMethod> {
        Ok(match method_id {
            10 => TxMethod::Select,
            11 => TxMethod::SelectOk,
            20 => TxMethod::Commit,
            21 => TxMethod::CommitOk,
            30 => TxMethod::Rollback,
            31 => TxMethod::RollbackOk,
            _ => {
                return UnknownMethodSnafu {
                    class_id: CLASS_TX,
                    method_id,
                }
                .fail()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FieldValue;

    fn sample_table() -> FieldTable {
        let mut t = FieldTable::new();
        t.insert("x-sample", FieldValue::LongString("value".into()));
        t
    }

    fn every_method() -> Vec<Method> {
        vec![
            ConnectionMethod::Start(Start {
                version_major: 0,
                version_minor: 9,
                server_properties: sample_table(),
                mechanisms: "PLAIN EXTERNAL".to_string(),
                locales: "en_US".to_string(),
            })
            .into(),
            ConnectionMethod::StartOk(StartOk {
                client_properties: sample_table(),
                mechanism: "PLAIN".to_string(),
                response: "\u{0}guest\u{0}guest".to_string(),
                locale: "en_US".to_string(),
            })
            .into(),
            ConnectionMethod::Secure(Secure {
                challenge: "challenge".to_string(),
            })
            .into(),
            ConnectionMethod::SecureOk(SecureOk {
                response: "response".to_string(),
            })
            .into(),
            ConnectionMethod::Tune(Tune {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            })
            .into(),
            ConnectionMethod::TuneOk(TuneOk {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            })
            .into(),
            ConnectionMethod::Open(ConnectionOpen {
                virtual_host: "/".to_string(),
                capabilities: String::new(),
                insist: false,
            })
            .into(),
            ConnectionMethod::OpenOk(ConnectionOpenOk {
                known_hosts: String::new(),
            })
            .into(),
            ConnectionMethod::Close(ConnectionClose {
                reply_code: 320,
                reply_text: "CONNECTION_FORCED".to_string(),
                class_id: 0,
                method_id: 0,
            })
            .into(),
            ConnectionMethod::CloseOk.into(),
            ConnectionMethod::Blocked(Blocked {
                reason: "low memory".to_string(),
            })
            .into(),
            ConnectionMethod::Unblocked.into(),
            ChannelMethod::Open {
                out_of_band: String::new(),
            }
            .into(),
            ChannelMethod::OpenOk {
                channel_id: String::new(),
            }
            .into(),
            ChannelMethod::Flow { active: true }.into(),
            ChannelMethod::FlowOk { active: false }.into(),
            ChannelMethod::Close(ChannelClose {
                reply_code: 406,
                reply_text: "PRECONDITION_FAILED".to_string(),
                class_id: CLASS_QUEUE,
                method_id: 10,
            })
            .into(),
            ChannelMethod::CloseOk.into(),
            ExchangeMethod::Declare(ExchangeDeclare {
                ticket: 0,
                exchange: "ex".to_string(),
                type_: "direct".to_string(),
                passive: false,
                durable: true,
                auto_delete: false,
                internal: false,
                nowait: false,
                arguments: sample_table(),
            })
            .into(),
            ExchangeMethod::DeclareOk.into(),
            ExchangeMethod::Delete(ExchangeDelete {
                ticket: 0,
                exchange: "ex".to_string(),
                if_unused: true,
                nowait: false,
            })
            .into(),
            ExchangeMethod::DeleteOk.into(),
            ExchangeMethod::Bind(ExchangeBind {
                ticket: 0,
                destination: "dst".to_string(),
                source: "src".to_string(),
                routing_key: "rk".to_string(),
                nowait: false,
                arguments: FieldTable::new(),
            })
            .into(),
            ExchangeMethod::BindOk.into(),
            ExchangeMethod::Unbind(ExchangeBind {
                ticket: 0,
                destination: "dst".to_string(),
                source: "src".to_string(),
                routing_key: "rk".to_string(),
                nowait: false,
                arguments: FieldTable::new(),
            })
            .into(),
            ExchangeMethod::UnbindOk.into(),
            QueueMethod::Declare(QueueDeclare {
                ticket: 0,
                queue: "q1".to_string(),
                passive: false,
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
                arguments: sample_table(),
            })
            .into(),
            QueueMethod::DeclareOk(QueueDeclareOk {
                queue: "q1".to_string(),
                message_count: 3,
                consumer_count: 1,
            })
            .into(),
            QueueMethod::Bind(QueueBind {
                ticket: 0,
                queue: "q1".to_string(),
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
                nowait: false,
                arguments: FieldTable::new(),
            })
            .into(),
            QueueMethod::BindOk.into(),
            QueueMethod::Purge {
                ticket: 0,
                queue: "q1".to_string(),
                nowait: false,
            }
            .into(),
            QueueMethod::PurgeOk { message_count: 10 }.into(),
            QueueMethod::Delete(QueueDelete {
                ticket: 0,
                queue: "q1".to_string(),
                if_unused: false,
                if_empty: true,
                nowait: false,
            })
            .into(),
            QueueMethod::DeleteOk { message_count: 0 }.into(),
            QueueMethod::Unbind(QueueUnbind {
                ticket: 0,
                queue: "q1".to_string(),
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
                arguments: FieldTable::new(),
            })
            .into(),
            QueueMethod::UnbindOk.into(),
            BasicMethod::Qos(Qos {
                prefetch_size: 0,
                prefetch_count: 1,
                global: false,
            })
            .into(),
            BasicMethod::QosOk.into(),
            BasicMethod::Consume(Consume {
                ticket: 0,
                queue: "q1".to_string(),
                consumer_tag: String::new(),
                no_local: false,
                no_ack: true,
                exclusive: false,
                nowait: false,
                arguments: FieldTable::new(),
            })
            .into(),
            BasicMethod::ConsumeOk {
                consumer_tag: "amq.ctag-1".to_string(),
            }
            .into(),
            BasicMethod::Cancel {
                consumer_tag: "amq.ctag-1".to_string(),
                nowait: false,
            }
            .into(),
            BasicMethod::CancelOk {
                consumer_tag: "amq.ctag-1".to_string(),
            }
            .into(),
            BasicMethod::Publish(Publish {
                ticket: 0,
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
                mandatory: true,
                immediate: false,
            })
            .into(),
            BasicMethod::Return(Return {
                reply_code: 312,
                reply_text: "NO_ROUTE".to_string(),
                exchange: "ex".to_string(),
                routing_key: "absent".to_string(),
            })
            .into(),
            BasicMethod::Deliver(Deliver {
                consumer_tag: "amq.ctag-1".to_string(),
                delivery_tag: 42,
                redelivered: true,
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
            })
            .into(),
            BasicMethod::Get {
                ticket: 0,
                queue: "q1".to_string(),
                no_ack: false,
            }
            .into(),
            BasicMethod::GetOk(GetOk {
                delivery_tag: 7,
                redelivered: false,
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
                message_count: 2,
            })
            .into(),
            BasicMethod::GetEmpty {
                cluster_id: String::new(),
            }
            .into(),
            BasicMethod::Ack {
                delivery_tag: 42,
                multiple: true,
            }
            .into(),
            BasicMethod::Reject {
                delivery_tag: 42,
                requeue: false,
            }
            .into(),
            BasicMethod::Recover { requeue: true }.into(),
            BasicMethod::RecoverOk.into(),
            BasicMethod::Nack {
                delivery_tag: 42,
                multiple: false,
                requeue: true,
            }
            .into(),
            ConfirmMethod::Select { nowait: false }.into(),
            ConfirmMethod::SelectOk.into(),
            TxMethod::Select.into(),
            TxMethod::SelectOk.into(),
            TxMethod::Commit.into(),
            TxMethod::CommitOk.into(),
            TxMethod::Rollback.into(),
            TxMethod::RollbackOk.into(),
        ]
    }

    #[test]
    fn round_trip_every_method() {
        for method in every_method() {
            let mut buf = Vec::new();
            method.encode(&mut buf);
            let decoded = Method::decode(&buf)
                .unwrap_or_else(|err| panic!("decoding {:?} failed: {}", method, err));
            assert_eq!(decoded, method);
        }
    }

    #[test]
    fn bit_packing_shares_octets() {
        // queue.declare: passive(0) durable(1) exclusive(0) auto_delete(1)
        // nowait(0) -> 0b01010
        let method: Method = QueueMethod::Declare(QueueDeclare {
            ticket: 0,
            queue: "q".to_string(),
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: true,
            nowait: false,
            arguments: FieldTable::new(),
        })
        .into();
        let mut buf = Vec::new();
        method.encode(&mut buf);
        // class(2) method(2) ticket(2) queue shortstr(2) bits(1) table(4)
        assert_eq!(buf.len(), 13);
        assert_eq!(buf[8], 0b01010);
    }

    #[test]
    fn nack_bits() {
        let method: Method = BasicMethod::Nack {
            delivery_tag: 1,
            multiple: true,
            requeue: true,
        }
        .into();
        let mut buf = Vec::new();
        method.encode(&mut buf);
        assert_eq!(*buf.last().unwrap(), 0b11);
    }

    #[test]
    fn unknown_method_rejected() {
        // connection class with a bogus method id
        let buf = [0, 10, 0, 99];
        match Method::decode(&buf) {
            Err(Error::UnknownMethod {
                class_id,
                method_id,
            }) => {
                assert_eq!(class_id, 10);
                assert_eq!(method_id, 99);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn unknown_class_rejected() {
        let buf = [0, 42, 0, 10];
        match Method::decode(&buf) {
            Err(Error::UnknownMethod { class_id, .. }) => assert_eq!(class_id, 42),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn truncated_body_reported_with_ids() {
        // basic.ack with only 3 of its 9 body bytes
        let buf = [0, 60, 0, 80, 0, 0, 0];
        match Method::decode(&buf) {
            Err(Error::MethodBodyTruncated {
                class_id,
                method_id,
            }) => {
                assert_eq!(class_id, 60);
                assert_eq!(method_id, 80);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let method: Method = ConnectionMethod::CloseOk.into();
        let mut buf = Vec::new();
        method.encode(&mut buf);
        buf.push(0xaa);
        match Method::decode(&buf) {
            Err(Error::LengthMismatch { .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
