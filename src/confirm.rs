use crate::Guid;

/// Payload for a raw publisher confirmation from the server (either an
/// [ack](enum.Confirm.html#variant.Ack) or a
/// [nack](enum.Confirm.html#variant.Nack)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ConfirmPayload {
    /// The delivery tag from the server. Tags are sequentially increasing
    /// integers beginning with 1 once publisher confirms are enabled on the
    /// channel.
    pub delivery_tag: u64,

    /// If true, the confirmation applies to all previously-unconfirmed
    /// messages with delivery tags less than or equal to this payload's
    /// [`delivery_tag`](#structfield.delivery_tag).
    pub multiple: bool,
}

/// A raw publisher confirmation from the server, before the confirm engine
/// maps it back to a message GUID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Confirm {
    /// The server has received the message(s). Note that acks do not imply
    /// the messages have been handled by a consumer, merely accepted for
    /// routing.
    Ack(ConfirmPayload),

    /// The server rejected the message(s).
    Nack(ConfirmPayload),
}

/// How unroutable messages published with this producer are handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mandatory {
    /// Messages the broker cannot route to any queue are returned to the
    /// sender; the confirm callback sees
    /// [`ConfirmOutcome::Return`](enum.ConfirmOutcome.html#variant.Return).
    /// This is the default.
    ReturnUnroutable,

    /// Messages the broker cannot route are silently acked. This causes
    /// silent message loss if bindings aren't set up as expected.
    DiscardUnroutable,
}

impl Default for Mandatory {
    fn default() -> Mandatory {
        Mandatory::ReturnUnroutable
    }
}

impl Mandatory {
    pub(crate) fn as_wire_flag(self) -> bool {
        match self {
            Mandatory::ReturnUnroutable => true,
            Mandatory::DiscardUnroutable => false,
        }
    }
}

/// Terminal outcome of one published message, delivered to its confirm
/// callback exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// The broker accepted the message for routing.
    Ack,

    /// The broker rejected the message (`basic.nack`).
    Reject,

    /// The message was unroutable and came back via `basic.return`.
    Return { reply_code: u16, reply_text: String },

    /// The session closed before the broker confirmed the message; its fate
    /// at the broker is unknown.
    Cancelled,
}

/// A resolved confirmation handed to a producer's confirm callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub guid: Guid,
    pub outcome: ConfirmOutcome,
}

/// Callback invoked (on a dispatch thread, never on the I/O thread) when a
/// published message reaches a terminal outcome.
pub type ConfirmCallback = Box<dyn FnOnce(Confirmation) + Send>;
