//! The supervised consumer: a callback-driven subscription that survives
//! reconnects. Deliveries are dispatched on a dedicated thread (never the
//! I/O thread); in manual-ack mode each delivery is tracked in an unacked
//! table until the application acknowledges it.

use crate::errors::*;
use crate::session::SessionCommand;
use crate::wire::FieldTable;
use crate::Delivery;
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use log::{debug, trace};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Options passed to the server when starting a consumer.
///
/// The [`default`](#impl-Default) implementation sets all boolean fields to
/// false, applies no prefetch limit, and has an empty set of arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsumerOptions {
    /// If true, the server will not send this consumer messages that were
    /// published by the consumer's own connection.
    pub no_local: bool,

    /// If true, the server assumes all delivered messages are acknowledged
    /// and the client must not acknowledge them. At-most-once semantics; be
    /// aware of unbounded memory growth if the consumer cannot keep up.
    pub no_ack: bool,

    /// If true, requires that this consumer is the only one attached to the
    /// queue. If other consumers are active, the server closes the channel.
    pub exclusive: bool,

    /// Bound on the number of unacknowledged deliveries the server pushes to
    /// this consumer (`basic.qos`). 0 means no limit. Ignored when
    /// [`no_ack`](#structfield.no_ack) is set.
    pub prefetch_count: u16,

    /// Extra arguments; these are optional in general, but may be needed for
    /// some plugins or server-specific features.
    pub arguments: FieldTable,
}

/// What the I/O thread sends down a consumer's delivery channel.
// Clippy warns about ConsumerMessage::Delivery being much larger than the
// other variants, but we expect almost all instances of ConsumerMessage to
// be Deliveries.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub(crate) enum ConsumerMessage {
    /// A delivered message.
    Delivery(Delivery),

    /// The consumer was cancelled by the client via
    /// [`Consumer::cancel`](struct.Consumer.html#method.cancel).
    ClientCancelled,

    /// The consumer has been cancelled by the server, e.g. because the queue
    /// it was attached to was deleted.
    ServerCancelled,

    /// The client has closed the channel where this consumer was created.
    ClientClosedChannel,

    /// The server has closed the channel where this consumer was created.
    ServerClosedChannel(Error),

    /// The client has closed the connection where this consumer was created.
    ClientClosedConnection,

    /// The server has closed the connection where this consumer was created.
    ServerClosedConnection(Error),
}

/// Metadata retained for a delivery awaiting acknowledgement.
#[derive(Clone, Debug)]
pub struct UnackedDelivery {
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub received_at: Instant,
}

/// Tag -> metadata for deliveries awaiting acknowledgement, scoped to one
/// channel generation. Cleared on reconnect: the broker redelivers anything
/// unacked on the dead channel.
pub(crate) struct UnackedTable {
    generation: u64,
    entries: IndexMap<u64, UnackedDelivery>,
}

impl UnackedTable {
    pub(crate) fn new() -> UnackedTable {
        UnackedTable {
            generation: 0,
            entries: IndexMap::new(),
        }
    }

    pub(crate) fn begin_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.entries.clear();
    }

    pub(crate) fn insert(&mut self, delivery_tag: u64, delivery: UnackedDelivery) {
        self.entries.insert(delivery_tag, delivery);
    }

    /// Removes the entry (or, with `multiple`, every entry up to and
    /// including the tag). Returns the generation the tags belong to, or
    /// `None` if nothing matched - e.g. an ack for a delivery that died with
    /// a previous channel.
    pub(crate) fn take(&mut self, delivery_tag: u64, multiple: bool) -> Option<u64> {
        if multiple {
            let before = self.entries.len();
            self.entries.retain(|tag, _| *tag > delivery_tag);
            if self.entries.len() == before {
                return None;
            }
        } else if self.entries.shift_remove(&delivery_tag).is_none() {
            return None;
        }
        Some(self.generation)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<(u64, UnackedDelivery)> {
        self.entries
            .iter()
            .map(|(tag, delivery)| (*tag, delivery.clone()))
            .collect()
    }
}

/// A supervised consumer created by
/// [`Session::consumer`](struct.Session.html#method.consumer).
///
/// The message callback runs on this consumer's dispatch thread. After a
/// reconnect the broker redelivers unacknowledged messages with
/// `redelivered = true`; the unacked table is reset because delivery tags do
/// not survive a channel.
pub struct Consumer {
    pub(crate) id: u64,
    pub(crate) queue: String,
    pub(crate) no_ack: bool,
    pub(crate) unacked: Arc<Mutex<UnackedTable>>,
    pub(crate) cmd_tx: Sender<SessionCommand>,
}

impl Consumer {
    /// The queue this consumer is attached to.
    #[inline]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Acknowledges a delivery; with `multiple`, also every delivery before
    /// it. Fire-and-forget: this never blocks on the broker.
    ///
    /// Acknowledging a tag from before the last reconnect is a no-op - the
    /// broker already requeued that delivery.
    pub fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        if self.no_ack {
            return Ok(());
        }
        let generation = match self.unacked.lock().unwrap().take(delivery_tag, multiple) {
            Some(generation) => generation,
            None => {
                debug!("dropping ack for unknown delivery tag {}", delivery_tag);
                return Ok(());
            }
        };
        self.cmd_tx
            .send(SessionCommand::Ack {
                consumer_id: self.id,
                generation,
                delivery_tag,
                multiple,
            })
            .map_err(|_| Error::SessionClosed)
    }

    /// Negatively acknowledges a delivery, optionally requeueing it; with
    /// `multiple`, applies to every delivery before it as well.
    pub fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<()> {
        if self.no_ack {
            return Ok(());
        }
        let generation = match self.unacked.lock().unwrap().take(delivery_tag, multiple) {
            Some(generation) => generation,
            None => {
                debug!("dropping nack for unknown delivery tag {}", delivery_tag);
                return Ok(());
            }
        };
        self.cmd_tx
            .send(SessionCommand::Nack {
                consumer_id: self.id,
                generation,
                delivery_tag,
                multiple,
                requeue,
            })
            .map_err(|_| Error::SessionClosed)
    }

    /// Rejects a single delivery (`basic.reject`), optionally requeueing it.
    pub fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        if self.no_ack {
            return Ok(());
        }
        let generation = match self.unacked.lock().unwrap().take(delivery_tag, false) {
            Some(generation) => generation,
            None => {
                debug!("dropping reject for unknown delivery tag {}", delivery_tag);
                return Ok(());
            }
        };
        self.cmd_tx
            .send(SessionCommand::Reject {
                consumer_id: self.id,
                generation,
                delivery_tag,
                requeue,
            })
            .map_err(|_| Error::SessionClosed)
    }

    /// Stops this consumer: cancels it at the broker and ends its dispatch
    /// thread. The consumer does not resubscribe on future reconnects.
    pub fn cancel(&self) -> Result<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(SessionCommand::CancelConsumer {
                consumer_id: self.id,
                reply: reply_tx,
            })
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.recv().map_err(|_| Error::SessionClosed)?
    }

    /// Number of deliveries currently awaiting acknowledgement.
    pub fn unacked_count(&self) -> usize {
        self.unacked.lock().unwrap().len()
    }

    /// Snapshot of the unacked table, oldest first.
    pub fn unacked_snapshot(&self) -> Vec<(u64, UnackedDelivery)> {
        self.unacked.lock().unwrap().snapshot()
    }
}

/// Body of a consumer's dispatch thread: drains each channel generation's
/// receiver in turn, tracking unacked deliveries and invoking the
/// application callback. Exits when the consumer is cancelled or the session
/// ends.
pub(crate) fn run_consumer_worker<F>(
    consumer_id: u64,
    gen_rx: Receiver<(u64, Receiver<ConsumerMessage>)>,
    unacked: Arc<Mutex<UnackedTable>>,
    no_ack: bool,
    cmd_tx: Sender<SessionCommand>,
    mut on_message: F,
) where
    F: FnMut(Delivery) + Send + 'static,
{
    for (generation, rx) in gen_rx.iter() {
        unacked.lock().unwrap().begin_generation(generation);
        for message in rx.iter() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    if !no_ack {
                        unacked.lock().unwrap().insert(
                            delivery.delivery_tag(),
                            UnackedDelivery {
                                exchange: delivery.exchange.clone(),
                                routing_key: delivery.routing_key.clone(),
                                redelivered: delivery.redelivered,
                                received_at: Instant::now(),
                            },
                        );
                    }
                    on_message(delivery);
                }
                ConsumerMessage::ClientCancelled => {
                    trace!("consumer {} cancelled by client", consumer_id);
                    return;
                }
                ConsumerMessage::ServerCancelled => {
                    debug!("consumer {} cancelled by server", consumer_id);
                    let _ = cmd_tx.send(SessionCommand::ConsumerStopped { consumer_id });
                    return;
                }
                ConsumerMessage::ServerClosedChannel(err) => {
                    debug!(
                        "consumer {} channel closed by server: {}; awaiting reopen",
                        consumer_id, err
                    );
                    let _ = cmd_tx.send(SessionCommand::ConsumerChannelLost {
                        consumer_id,
                        generation,
                    });
                    break;
                }
                ConsumerMessage::ClientClosedChannel
                | ConsumerMessage::ClientClosedConnection
                | ConsumerMessage::ServerClosedConnection(_) => break,
            }
        }
        // The channel generation ended; anything unacked will be redelivered
        // by the broker on the next one.
        unacked.lock().unwrap().begin_generation(generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> UnackedDelivery {
        UnackedDelivery {
            exchange: "ex".to_string(),
            routing_key: "rk".to_string(),
            redelivered: false,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn take_single_removes_one_entry() {
        let mut table = UnackedTable::new();
        table.begin_generation(1);
        table.insert(1, delivery());
        table.insert(2, delivery());

        assert_eq!(table.take(1, false), Some(1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.take(1, false), None);
    }

    #[test]
    fn take_multiple_removes_up_to_tag() {
        let mut table = UnackedTable::new();
        table.begin_generation(3);
        for tag in 1..=4 {
            table.insert(tag, delivery());
        }

        assert_eq!(table.take(3, true), Some(3));
        assert_eq!(table.len(), 1);
        assert!(table.snapshot().iter().all(|(tag, _)| *tag == 4));
    }

    #[test]
    fn new_generation_clears_entries() {
        let mut table = UnackedTable::new();
        table.begin_generation(1);
        table.insert(1, delivery());
        table.begin_generation(2);
        assert_eq!(table.len(), 0);
        // a stale ack for the old generation's tag finds nothing
        assert_eq!(table.take(1, false), None);
    }
}
