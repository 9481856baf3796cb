use super::content_collector::CollectorResult;
use super::{Channel0Slot, ChannelMessage, ChannelSlot, Inner};
use crate::errors::*;
use crate::consumer::ConsumerMessage;
use crate::wire::method::{
    BasicMethod, ChannelMethod, ConnectionClose, ConnectionMethod, REPLY_SUCCESS,
};
use crate::wire::{Frame, Method};
use crate::confirm::{Confirm, ConfirmPayload};
use crate::ConnectionBlockedNotification;
use crossbeam_channel::Sender;
use log::{error, trace, warn};
use snafu::OptionExt;
use std::collections::hash_map::Entry;

// AMQP hard error codes we raise when the server misbehaves.
const NOT_IMPLEMENTED: u16 = 540;
const NOT_ALLOWED: u16 = 530;

#[derive(Debug)]
pub(super) enum ConnectionState {
    Steady(Channel0Slot),
    ServerClosing(ConnectionClose),
    ClientException,
    ClientClosed,
}

fn slot_remove(inner: &mut Inner, channel_id: u16) -> Result<ChannelSlot> {
    inner
        .chan_slots
        .remove(channel_id)
        .ok_or(Error::ReceivedFrameWithBogusChannelId { channel_id })
}

fn slot_get_mut(inner: &mut Inner, channel_id: u16) -> Result<&mut ChannelSlot> {
    inner
        .chan_slots
        .get_mut(channel_id)
        .ok_or(Error::ReceivedFrameWithBogusChannelId { channel_id })
}

fn send<T: Send + Sync + 'static>(tx: &Sender<T>, item: T) -> Result<()> {
    tx.send(item)
        .ok()
        .ok_or(Error::EventLoopClientDropped)
}

impl ConnectionState {
    pub(super) fn process(&mut self, inner: &mut Inner, frame: Frame) -> Result<()> {
        let ch0_slot = match self {
            ConnectionState::Steady(ch0_slot) => ch0_slot,
            ConnectionState::ServerClosing(_)
            | ConnectionState::ClientClosed
            | ConnectionState::ClientException => return FrameUnexpectedSnafu.fail(),
        };

        Ok(match frame {
            // Heartbeats are legal on channel 0 at any time; liveness was
            // recorded when the bytes were read. Anywhere else they are a
            // framing violation.
            Frame::Heartbeat(0) => {
                trace!("received heartbeat");
            }
            Frame::Heartbeat(n) => {
                error!("received heartbeat on channel {}", n);
                return FrameUnexpectedSnafu.fail();
            }
            Frame::Method(0, Method::Connection(ConnectionMethod::Close(close))) => {
                inner.push_method(0, ConnectionMethod::CloseOk);
                inner.seal_writes();
                let err = Error::ServerClosedConnection {
                    code: close.reply_code,
                    message: close.reply_text.clone(),
                };
                for (_, slot) in inner.chan_slots.iter() {
                    for (_, tx) in slot.consumers.iter() {
                        let _ = tx.send(ConsumerMessage::ServerClosedConnection(err.clone()));
                    }
                }
                *self = ConnectionState::ServerClosing(close);
            }
            Frame::Method(0, Method::Connection(ConnectionMethod::CloseOk)) => {
                for (_, slot) in inner.chan_slots.iter() {
                    for (_, tx) in slot.consumers.iter() {
                        let _ = tx.send(ConsumerMessage::ClientClosedConnection);
                    }
                }
                send(
                    &ch0_slot.common.tx,
                    Ok(ChannelMessage::Method(
                        ConnectionMethod::CloseOk.into(),
                    )),
                )?;
                *self = ConnectionState::ClientClosed;
            }
            Frame::Method(0, Method::Connection(ConnectionMethod::Blocked(blocked))) => {
                warn!("server blocked connection (reason: {})", blocked.reason);
                if let Some(tx) = &ch0_slot.blocked_tx {
                    let _ = tx.send(ConnectionBlockedNotification::Blocked {
                        reason: blocked.reason,
                    });
                }
            }
            Frame::Method(0, Method::Connection(ConnectionMethod::Unblocked)) => {
                warn!("server unblocked connection");
                if let Some(tx) = &ch0_slot.blocked_tx {
                    let _ = tx.send(ConnectionBlockedNotification::Unblocked);
                }
            }
            Frame::Method(0, other) => {
                let text = format!("do not know how to handle channel 0 method {:?}", other);
                error!("{} - closing connection", text);
                let close = ConnectionClose {
                    reply_code: NOT_IMPLEMENTED,
                    reply_text: text,
                    class_id: other.class_id(),
                    method_id: other.method_id(),
                };
                inner.push_method(0, ConnectionMethod::Close(close));
                inner.seal_writes();
                *self = ConnectionState::ClientException;
            }
            Frame::Header(0, _) | Frame::Body(0, _) => {
                let text = format!("received illegal channel 0 frame {:?}", frame);
                error!("{} - closing connection", text);
                let close = ConnectionClose {
                    reply_code: NOT_ALLOWED,
                    reply_text: text,
                    class_id: 0,
                    method_id: 0,
                };
                inner.push_method(0, ConnectionMethod::Close(close));
                inner.seal_writes();
                *self = ConnectionState::ClientException;
            }
            Frame::Method(n, Method::Channel(ChannelMethod::Close(close))) => {
                let slot = slot_remove(inner, n)?;
                warn!("server closing channel {}: {:?}", n, close);
                inner.push_method(n, ChannelMethod::CloseOk);
                let err = Error::ServerClosedChannel {
                    channel_id: n,
                    code: close.reply_code,
                    message: close.reply_text,
                };
                for (_, tx) in slot.consumers.iter() {
                    let _ = tx.send(ConsumerMessage::ServerClosedChannel(err.clone()));
                }
                send(&slot.tx, Err(err))?;
            }
            Frame::Method(n, Method::Channel(ChannelMethod::CloseOk)) => {
                let slot = slot_remove(inner, n)?;
                for (_, tx) in slot.consumers.iter() {
                    let _ = tx.send(ConsumerMessage::ClientClosedChannel);
                }
                send(
                    &slot.tx,
                    Ok(ChannelMessage::Method(ChannelMethod::CloseOk.into())),
                )?;
            }
            Frame::Method(n, Method::Basic(BasicMethod::ConsumeOk { consumer_tag })) => {
                let slot = slot_get_mut(inner, n)?;
                match slot.consumers.entry(consumer_tag.clone()) {
                    Entry::Occupied(_) => {
                        return DuplicateConsumerTagSnafu {
                            channel_id: n,
                            consumer_tag,
                        }
                        .fail()
                    }
                    Entry::Vacant(entry) => {
                        let (tx, rx) = crossbeam_channel::unbounded();
                        entry.insert(tx);
                        send(&slot.tx, Ok(ChannelMessage::ConsumeOk(consumer_tag, rx)))?;
                    }
                }
            }
            Frame::Method(n, Method::Basic(BasicMethod::CancelOk { consumer_tag })) => {
                let slot = slot_get_mut(inner, n)?;
                if let Some(tx) = slot.consumers.remove(&consumer_tag) {
                    let _ = tx.send(ConsumerMessage::ClientCancelled);
                }
                send(
                    &slot.tx,
                    Ok(ChannelMessage::Method(
                        BasicMethod::CancelOk { consumer_tag }.into(),
                    )),
                )?;
            }
            // Server-initiated cancel: the queue was deleted or the node
            // holding it went away.
            Frame::Method(n, Method::Basic(BasicMethod::Cancel { consumer_tag, .. })) => {
                warn!("server cancelled consumer {} on channel {}", consumer_tag, n);
                let slot = slot_get_mut(inner, n)?;
                if let Some(tx) = slot.consumers.remove(&consumer_tag) {
                    let _ = tx.send(ConsumerMessage::ServerCancelled);
                }
            }
            Frame::Method(n, Method::Basic(BasicMethod::Ack {
                delivery_tag,
                multiple,
            })) => {
                let slot = slot_get_mut(inner, n)?;
                let confirm = Confirm::Ack(ConfirmPayload {
                    delivery_tag,
                    multiple,
                });
                match &slot.confirm_handler {
                    Some(tx) => send(tx, confirm)?,
                    None => warn!(
                        "received publisher confirm {:?} on channel {} with no handler",
                        confirm, n
                    ),
                }
            }
            Frame::Method(n, Method::Basic(BasicMethod::Nack {
                delivery_tag,
                multiple,
                ..
            })) => {
                let slot = slot_get_mut(inner, n)?;
                let confirm = Confirm::Nack(ConfirmPayload {
                    delivery_tag,
                    multiple,
                });
                match &slot.confirm_handler {
                    Some(tx) => send(tx, confirm)?,
                    None => warn!(
                        "received publisher confirm {:?} on channel {} with no handler",
                        confirm, n
                    ),
                }
            }
            Frame::Method(n, Method::Basic(BasicMethod::Deliver(deliver))) => {
                let slot = slot_get_mut(inner, n)?;
                slot.collector.collect_deliver(deliver)?;
            }
            Frame::Method(n, Method::Basic(BasicMethod::Return(ret))) => {
                let slot = slot_get_mut(inner, n)?;
                slot.collector.collect_return(ret)?;
            }
            Frame::Method(n, Method::Basic(BasicMethod::GetOk(get_ok))) => {
                let slot = slot_get_mut(inner, n)?;
                slot.collector.collect_get(get_ok)?;
            }
            Frame::Method(n, Method::Basic(BasicMethod::GetEmpty { .. })) => {
                let slot = slot_get_mut(inner, n)?;
                send(&slot.tx, Ok(ChannelMessage::GetOk(Box::new(None))))?;
            }
            Frame::Method(n, method) => {
                let slot = slot_get_mut(inner, n)?;
                // A method may not interrupt content reassembly on its
                // channel.
                if slot.collector.is_mid_content() {
                    return FrameUnexpectedSnafu.fail();
                }
                trace!(
                    "forwarding method to client for channel {}: {:?}",
                    n,
                    method
                );
                send(&slot.tx, Ok(ChannelMessage::Method(method)))?;
            }
            Frame::Header(n, header) => {
                let slot = slot_get_mut(inner, n)?;
                if let Some(result) = slot.collector.collect_header(header)? {
                    Self::dispatch_content(slot, n, result)?;
                }
            }
            Frame::Body(n, body) => {
                let slot = slot_get_mut(inner, n)?;
                if let Some(result) = slot.collector.collect_body(body)? {
                    Self::dispatch_content(slot, n, result)?;
                }
            }
        })
    }

    fn dispatch_content(slot: &mut ChannelSlot, channel_id: u16, result: CollectorResult) -> Result<()> {
        match result {
            CollectorResult::Delivery((consumer_tag, delivery)) => {
                let tx = slot
                    .consumers
                    .get(&consumer_tag)
                    .context(UnknownConsumerTagSnafu {
                        channel_id,
                        consumer_tag: consumer_tag.clone(),
                    })?;
                send(tx, ConsumerMessage::Delivery(delivery))
            }
            CollectorResult::Return(ret) => match &slot.return_handler {
                Some(tx) => send(tx, ret),
                None => {
                    warn!(
                        "received returned message on channel {} with no handler; discarding",
                        channel_id
                    );
                    Ok(())
                }
            },
            CollectorResult::Get(get) => {
                send(&slot.tx, Ok(ChannelMessage::GetOk(Box::new(Some(get)))))
            }
        }
    }
}

/// Builds the connection.close we send on a clean client shutdown.
pub(super) fn clean_close() -> ConnectionClose {
    ConnectionClose {
        reply_code: REPLY_SUCCESS,
        reply_text: "goodbye".to_string(),
        class_id: 0,
        method_id: 0,
    }
}
