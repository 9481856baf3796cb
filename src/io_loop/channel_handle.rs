use super::connection_state::clean_close;
use super::{IoLoopHandle, IoLoopHandle0};
use crate::errors::*;
use crate::confirm::Confirm;
use crate::consumer::ConsumerMessage;
use crate::wire::method::{ChannelClose, ChannelMethod, Consume};
use crate::wire::{BasicProperties, Method};
use crate::return_::Return;
use crate::{ConnectionBlockedNotification, Get};
use crossbeam_channel::{Receiver as CrossbeamReceiver, Sender as CrossbeamSender};
use log::{debug, trace};

/// Handle to channel 0 of a live connection: the channel that owns the
/// connection lifecycle and channel allocation.
pub(crate) struct Channel0Handle {
    inner: IoLoopHandle0,
    frame_max: usize,
}

impl Channel0Handle {
    pub(super) fn new(handle: IoLoopHandle0, frame_max: usize) -> Channel0Handle {
        assert_eq!(
            handle.common_id(),
            0,
            "handle for Channel0 must be channel 0"
        );
        Channel0Handle {
            inner: handle,
            frame_max,
        }
    }

    pub(crate) fn set_blocked_tx(
        &mut self,
        tx: CrossbeamSender<ConnectionBlockedNotification>,
    ) -> Result<()> {
        self.inner.set_blocked_tx(tx)
    }

    pub(crate) fn close_connection(&mut self) -> Result<()> {
        debug!("closing connection");
        self.inner.common().call_connection_close(clean_close())
    }

    pub(crate) fn open_channel(&mut self, channel_id: Option<u16>) -> Result<ChannelHandle> {
        let mut handle = self.inner.allocate_channel(channel_id)?;

        debug!("opening channel {}", handle.channel_id());
        let open = ChannelMethod::Open {
            out_of_band: String::new(),
        };
        match handle.call(open)? {
            Method::Channel(ChannelMethod::OpenOk { .. }) => (),
            reply => {
                trace!("expected open-ok, got {:?}", reply);
                return FrameUnexpectedSnafu.fail();
            }
        }
        Ok(ChannelHandle {
            inner: handle,
            frame_max: self.frame_max,
        })
    }
}

/// Handle to one open data channel. Owned by exactly one task at a time;
/// synchronous calls take `&mut self`, which is what serializes RPCs per
/// channel.
pub(crate) struct ChannelHandle {
    inner: IoLoopHandle,
    frame_max: usize,
}

impl ChannelHandle {
    #[inline]
    pub(crate) fn channel_id(&self) -> u16 {
        self.inner.channel_id()
    }

    /// Sends a synchronous method and returns the server's reply.
    pub(crate) fn call<M: Into<Method>>(&mut self, method: M) -> Result<Method> {
        self.inner.call(method)
    }

    /// Sends an asynchronous method (publish, ack, nack, reject).
    pub(crate) fn send_nowait<M: Into<Method>>(&mut self, method: M) -> Result<()> {
        self.inner.call_nowait(method)
    }

    /// Sends a content header + body frames for a just-sent basic.publish.
    pub(crate) fn send_content(
        &mut self,
        content: &[u8],
        class_id: u16,
        properties: &BasicProperties,
    ) -> Result<()> {
        self.inner
            .send_content(content, class_id, properties, self.frame_max)
    }

    pub(crate) fn consume(
        &mut self,
        consume: Consume,
    ) -> Result<(String, CrossbeamReceiver<ConsumerMessage>)> {
        self.inner.consume(consume)
    }

    pub(crate) fn get(&mut self, get: Method) -> Result<Option<Get>> {
        self.inner.get(get)
    }

    pub(crate) fn set_confirm_handler(
        &mut self,
        handler: Option<CrossbeamSender<Confirm>>,
    ) -> Result<()> {
        self.inner.set_confirm_handler(handler)
    }

    pub(crate) fn set_return_handler(
        &mut self,
        handler: Option<CrossbeamSender<Return>>,
    ) -> Result<()> {
        self.inner.set_return_handler(handler)
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        let close = ChannelMethod::Close(ChannelClose {
            reply_code: 0,
            reply_text: String::new(),
            class_id: 0,
            method_id: 0,
        });
        debug!("closing channel {}", self.channel_id());
        match self.inner.call(close)? {
            Method::Channel(ChannelMethod::CloseOk) => Ok(()),
            reply => {
                trace!("expected close-ok, got {:?}", reply);
                FrameUnexpectedSnafu.fail()
            }
        }
    }
}
