use crate::confirm::{Confirmation, Mandatory};
use crate::confirm_tracker::{BeginSend, ConfirmTracker};
use crate::errors::*;
use crate::message::Message;
use crate::session::SessionCommand;
use crate::wire::FieldValue;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;

/// Header stamped onto every published message so returned (unroutable)
/// messages can be correlated back to their outstanding record.
pub(crate) const GUID_HEADER: &str = "x-guid";

/// Result of handing a message to [`Producer::send`](struct.Producer.html#method.send)
/// or [`try_send`](struct.Producer.html#method.try_send).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SendStatus {
    /// The library accepted the message. It will be (re)sent until the
    /// broker confirms it; the confirm callback reports the terminal
    /// outcome.
    Sending,

    /// A message with the same GUID is still awaiting its confirm. The
    /// callback of this call will never be invoked.
    Duplicate,

    /// The in-flight window stayed full for the whole timeout.
    Timeout,

    /// The in-flight window is full (`try_send` only).
    InflightLimit,
}

/// Options for creating a [`Producer`](struct.Producer.html).
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerOptions {
    /// Cap on sent-but-unconfirmed messages. A producer at the cap blocks
    /// (or refuses, for `try_send`) further sends. 0 means unbounded.
    pub max_outstanding_confirms: usize,

    /// What the broker should do with messages it cannot route. The default
    /// returns them to the confirm callback.
    pub mandatory: Mandatory,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        ProducerOptions {
            max_outstanding_confirms: 0,
            mandatory: Mandatory::default(),
        }
    }
}

/// A publisher bound to one exchange on a [`Session`](struct.Session.html),
/// with publisher confirms always enabled.
///
/// Messages accepted by `send`/`try_send` are tracked until the broker
/// confirms them and are automatically republished across reconnects
/// (at-least-once delivery).
pub struct Producer {
    pub(crate) id: u64,
    pub(crate) exchange: String,
    pub(crate) mandatory: Mandatory,
    pub(crate) tracker: Arc<ConfirmTracker>,
    pub(crate) cmd_tx: Sender<SessionCommand>,
}

impl Producer {
    /// The exchange this producer publishes to.
    #[inline]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Sends a message, blocking while the in-flight window is full. A
    /// `timeout` of `None` waits for a slot indefinitely.
    ///
    /// `confirm_callback` is invoked exactly once, from a dispatch thread,
    /// when the message reaches a terminal outcome - possibly long after
    /// this call returns, if the connection drops and the message must be
    /// republished.
    pub fn send<C>(
        &self,
        message: Message,
        routing_key: &str,
        confirm_callback: C,
        timeout: Option<Duration>,
    ) -> Result<SendStatus>
    where
        C: FnOnce(Confirmation) + Send + 'static,
    {
        self.send_with_mandatory(
            message,
            routing_key,
            self.default_mandatory(),
            confirm_callback,
            timeout,
        )
    }

    /// Like [`send`](#method.send), with an explicit unroutable-message
    /// policy for this message only.
    pub fn send_with_mandatory<C>(
        &self,
        message: Message,
        routing_key: &str,
        mandatory: Mandatory,
        confirm_callback: C,
        timeout: Option<Duration>,
    ) -> Result<SendStatus>
    where
        C: FnOnce(Confirmation) + Send + 'static,
    {
        self.send_impl(
            message,
            routing_key,
            mandatory,
            Box::new(confirm_callback),
            Some(timeout),
        )
    }

    /// Sends a message without blocking; if the in-flight window is full,
    /// returns [`SendStatus::InflightLimit`](enum.SendStatus.html#variant.InflightLimit)
    /// immediately.
    pub fn try_send<C>(
        &self,
        message: Message,
        routing_key: &str,
        confirm_callback: C,
    ) -> Result<SendStatus>
    where
        C: FnOnce(Confirmation) + Send + 'static,
    {
        self.send_impl(
            message,
            routing_key,
            self.default_mandatory(),
            Box::new(confirm_callback),
            None,
        )
    }

    fn send_impl(
        &self,
        mut message: Message,
        routing_key: &str,
        mandatory: Mandatory,
        confirm_callback: Box<dyn FnOnce(Confirmation) + Send>,
        block_for: Option<Option<Duration>>,
    ) -> Result<SendStatus> {
        let guid = message.guid();
        message.properties_mut().insert_header(
            GUID_HEADER,
            FieldValue::LongString(guid.to_string().into()),
        );

        let status = self.tracker.begin_send(
            message,
            routing_key.to_string(),
            mandatory,
            confirm_callback,
            block_for,
        );
        match status {
            BeginSend::Accepted => (),
            BeginSend::Duplicate => return Ok(SendStatus::Duplicate),
            BeginSend::TimedOut => return Ok(SendStatus::Timeout),
            BeginSend::InflightLimit => return Ok(SendStatus::InflightLimit),
            BeginSend::Closed => return SessionClosedSnafu.fail(),
        }

        // Nudge the supervisor to flush unsent records. If it is gone, take
        // the record back out so the caller sees the failure rather than a
        // silently-parked message.
        if self
            .cmd_tx
            .send(SessionCommand::Publish {
                producer_id: self.id,
            })
            .is_err()
        {
            self.tracker.abort_send(guid);
            return SessionClosedSnafu.fail();
        }
        Ok(SendStatus::Sending)
    }

    /// Blocks until every outstanding message on this producer has reached a
    /// terminal outcome, or the timeout elapses. A `timeout` of `None` waits
    /// indefinitely.
    pub fn wait_for_confirms(&self, timeout: Option<Duration>) -> Result<()> {
        self.tracker.wait_for_confirms(timeout)
    }

    /// Number of sent-but-unconfirmed messages.
    pub fn outstanding(&self) -> usize {
        self.tracker.outstanding_len()
    }

    /// Age of the oldest unconfirmed message, if any. Large values suggest a
    /// broker that has stopped confirming.
    pub fn oldest_unconfirmed(&self) -> Option<Duration> {
        self.tracker.oldest_outstanding()
    }

    fn default_mandatory(&self) -> Mandatory {
        // Stored at creation; immutable afterwards.
        self.mandatory
    }
}
