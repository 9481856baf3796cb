use super::{ChannelMessage, IoLoopMessage};
use crate::errors::*;
use crate::serialize::OutputBuffer;
use crate::confirm::Confirm;
use crate::consumer::ConsumerMessage;
use crate::wire::method::{Consume, ConnectionClose, ConnectionMethod};
use crate::wire::{BasicProperties, Method};
use crate::return_::Return;
use crate::{ConnectionBlockedNotification, Get};
use crossbeam_channel::Receiver as CrossbeamReceiver;
use crossbeam_channel::Sender as CrossbeamSender;
use log::error;
use mio_extras::channel::SyncSender as MioSyncSender;

/// A channel's private line into the I/O thread: a bounded mio sender for
/// outgoing work and a crossbeam receiver for replies. One synchronous RPC
/// may be in flight at a time; callers queue behind each other naturally
/// because each handle is `&mut` for the duration of a call.
pub(super) struct IoLoopHandle {
    channel_id: u16,
    buf: OutputBuffer,
    tx: MioSyncSender<IoLoopMessage>,
    rx: CrossbeamReceiver<Result<ChannelMessage>>,
}

impl IoLoopHandle {
    pub(super) fn new(
        channel_id: u16,
        tx: MioSyncSender<IoLoopMessage>,
        rx: CrossbeamReceiver<Result<ChannelMessage>>,
    ) -> IoLoopHandle {
        IoLoopHandle {
            channel_id,
            buf: OutputBuffer::empty(),
            tx,
            rx,
        }
    }

    #[inline]
    pub(super) fn channel_id(&self) -> u16 {
        self.channel_id
    }

    fn make_buf<M: Into<Method>>(&mut self, method: M) -> OutputBuffer {
        debug_assert!(self.buf.is_empty());
        self.buf.push_method(self.channel_id, method);
        self.buf.drain_into_new_buf()
    }

    pub(super) fn set_return_handler(
        &mut self,
        handler: Option<CrossbeamSender<Return>>,
    ) -> Result<()> {
        self.send(IoLoopMessage::SetReturnHandler(handler))
    }

    pub(super) fn set_confirm_handler(
        &mut self,
        handler: Option<CrossbeamSender<Confirm>>,
    ) -> Result<()> {
        self.send(IoLoopMessage::SetConfirmHandler(handler))
    }

    /// Sends `basic.get` and waits for the collected reply (a message or
    /// get-empty).
    pub(super) fn get(&mut self, get: Method) -> Result<Option<Get>> {
        let buf = self.make_buf(get);
        self.send(IoLoopMessage::Send(buf))?;
        match self.recv()? {
            ChannelMessage::GetOk(get) => Ok(*get),
            ChannelMessage::Method(_) | ChannelMessage::ConsumeOk(_, _) => {
                FrameUnexpectedSnafu.fail()
            }
        }
    }

    /// Sends `basic.consume` and waits for consume-ok; the returned receiver
    /// yields this consumer's deliveries.
    pub(super) fn consume(
        &mut self,
        consume: Consume,
    ) -> Result<(String, CrossbeamReceiver<ConsumerMessage>)> {
        let buf = self.make_buf(Method::Basic(
            crate::wire::method::BasicMethod::Consume(consume),
        ));
        self.send(IoLoopMessage::Send(buf))?;
        match self.recv()? {
            ChannelMessage::ConsumeOk(tag, rx) => Ok((tag, rx)),
            ChannelMessage::Method(_) | ChannelMessage::GetOk(_) => FrameUnexpectedSnafu.fail(),
        }
    }

    /// Sends connection.close and waits for close-ok. The I/O thread seals
    /// its write buffer once this is enqueued.
    pub(super) fn call_connection_close(&mut self, close: ConnectionClose) -> Result<()> {
        let buf = self.make_buf(ConnectionMethod::Close(close));
        self.send(IoLoopMessage::ConnectionClose(buf))?;
        match self.recv()? {
            ChannelMessage::Method(Method::Connection(ConnectionMethod::CloseOk)) => Ok(()),
            _ => FrameUnexpectedSnafu.fail(),
        }
    }

    /// Sends a synchronous method and returns the server's reply method.
    pub(super) fn call<M: Into<Method>>(&mut self, method: M) -> Result<Method> {
        let buf = self.make_buf(method);
        self.send(IoLoopMessage::Send(buf))?;
        match self.recv()? {
            ChannelMessage::Method(method) => Ok(method),
            ChannelMessage::ConsumeOk(_, _) | ChannelMessage::GetOk(_) => {
                FrameUnexpectedSnafu.fail()
            }
        }
    }

    /// Sends an asynchronous method; no reply is expected.
    pub(super) fn call_nowait<M: Into<Method>>(&mut self, method: M) -> Result<()> {
        let buf = self.make_buf(method);
        self.send(IoLoopMessage::Send(buf))
    }

    /// Ships a content header and split body frames in one buffer so they
    /// cannot interleave with other traffic on this channel.
    pub(super) fn send_content(
        &mut self,
        content: &[u8],
        class_id: u16,
        properties: &BasicProperties,
        frame_max: usize,
    ) -> Result<()> {
        debug_assert!(self.buf.is_empty());
        self.buf
            .push_content_header(self.channel_id, class_id, content.len(), properties);
        self.buf.push_content_body(self.channel_id, content, frame_max);
        let buf = self.buf.drain_into_new_buf();
        self.send(IoLoopMessage::Send(buf))
    }

    fn send(&mut self, message: IoLoopMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| self.check_recv_for_error())
    }

    fn recv(&mut self) -> Result<ChannelMessage> {
        self.rx
            .recv()
            .map_err(|_| Error::EventLoopDropped)?
    }

    fn check_recv_for_error(&mut self) -> Error {
        // Failed to send to the I/O thread; possible causes are:
        //   1. Server closed channel; we should see if there's a relevant
        //      message waiting for us on rx.
        //   2. I/O loop is actually gone.
        // In either case, recv() will return Err. If it doesn't, we somehow
        // got a frame after a send failure - this should be impossible, but
        // return FrameUnexpected just in case.
        match self.recv() {
            Ok(_) => {
                error!("internal error - received unexpected frame after I/O thread disappeared");
                Error::FrameUnexpected
            }
            Err(err) => err,
        }
    }
}

pub(super) struct IoLoopHandle0 {
    common: IoLoopHandle,
    set_blocked_tx: MioSyncSender<CrossbeamSender<ConnectionBlockedNotification>>,
    alloc_chan_req_tx: MioSyncSender<Option<u16>>,
    alloc_chan_rep_rx: CrossbeamReceiver<Result<IoLoopHandle>>,
}

impl IoLoopHandle0 {
    pub(super) fn new(
        common: IoLoopHandle,
        set_blocked_tx: MioSyncSender<CrossbeamSender<ConnectionBlockedNotification>>,
        alloc_chan_req_tx: MioSyncSender<Option<u16>>,
        alloc_chan_rep_rx: CrossbeamReceiver<Result<IoLoopHandle>>,
    ) -> IoLoopHandle0 {
        IoLoopHandle0 {
            common,
            set_blocked_tx,
            alloc_chan_req_tx,
            alloc_chan_rep_rx,
        }
    }

    pub(super) fn allocate_channel(&mut self, channel_id: Option<u16>) -> Result<IoLoopHandle> {
        self.alloc_chan_req_tx
            .send(channel_id)
            .map_err(|_| self.common.check_recv_for_error())?;
        self.alloc_chan_rep_rx
            .recv()
            .map_err(|_| Error::EventLoopDropped)?
    }

    pub(super) fn set_blocked_tx(
        &mut self,
        tx: CrossbeamSender<ConnectionBlockedNotification>,
    ) -> Result<()> {
        self.set_blocked_tx
            .send(tx)
            .map_err(|_| self.common.check_recv_for_error())
    }

    pub(super) fn common(&mut self) -> &mut IoLoopHandle {
        &mut self.common
    }

    pub(super) fn common_id(&self) -> u16 {
        self.common.channel_id()
    }
}
