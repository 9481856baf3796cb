//! The publisher-confirm engine: bookkeeping for every published message
//! from the moment a producer hands it over until the broker acks, nacks, or
//! returns it.
//!
//! Invariants maintained here:
//!
//! 1. at most one outstanding record per GUID (deduplication guard);
//! 2. `outstanding.len() <= max_outstanding` (0 = unbounded), enforced by
//!    blocking or rejecting senders;
//! 3. delivery tags are contiguous from 1 within a channel generation; a
//!    generation bump invalidates every tag and schedules every live record
//!    for resend in original insertion order.

use crate::confirm::{ConfirmCallback, Confirmation, ConfirmOutcome, Mandatory};
use crate::errors::*;
use crate::message::{Guid, Message};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Everything the session needs to (re)publish a record on the wire.
pub(crate) struct PendingPublish {
    pub guid: Guid,
    pub message: Message,
    pub routing_key: String,
    pub mandatory: Mandatory,
}

struct OutstandingPublish {
    message: Message,
    routing_key: String,
    mandatory: Mandatory,
    callback: Option<ConfirmCallback>,
    /// Tag under the current channel generation; None if not yet (re)sent.
    tag: Option<u64>,
    /// A basic.return already resolved this record; the matching ack retires
    /// it silently.
    returned: bool,
    enqueued_at: Instant,
}

struct TrackerInner {
    outstanding: IndexMap<Guid, OutstandingPublish>,
    /// Tag -> GUID for the current channel generation. Ordered so
    /// `multiple=true` confirms resolve in tag order.
    by_tag: BTreeMap<u64, Guid>,
    /// Tags the broker will assign count up from 1 per generation.
    next_tag: u64,
    /// Channel generation the tags belong to. Confirms stamped with an older
    /// generation are discarded: a reopened channel reuses the same tag
    /// numbers for different messages.
    generation: u64,
    closed: bool,
}

/// Outcome of handing a message to the tracker.
#[derive(Debug, PartialEq)]
pub(crate) enum BeginSend {
    Accepted,
    Duplicate,
    TimedOut,
    InflightLimit,
    Closed,
}

/// A callback ready to be invoked, pulled out of the tracker so it runs
/// outside the lock.
pub(crate) type ReadyCallback = (ConfirmCallback, Confirmation);

pub(crate) struct ConfirmTracker {
    inner: Mutex<TrackerInner>,
    space_available: Condvar,
    all_confirmed: Condvar,
    max_outstanding: usize,
}

impl ConfirmTracker {
    /// `max_outstanding = 0` means unbounded.
    pub(crate) fn new(max_outstanding: usize) -> ConfirmTracker {
        ConfirmTracker {
            inner: Mutex::new(TrackerInner {
                outstanding: IndexMap::new(),
                by_tag: BTreeMap::new(),
                next_tag: 1,
                generation: 0,
                closed: false,
            }),
            space_available: Condvar::new(),
            all_confirmed: Condvar::new(),
            max_outstanding,
        }
    }

    /// Registers a message for sending. `block_for` is `None` for the
    /// non-blocking variant (fails `InflightLimit` when the window is full)
    /// or `Some(timeout)` to wait for a slot, where a `timeout` of `None`
    /// waits forever.
    pub(crate) fn begin_send(
        &self,
        message: Message,
        routing_key: String,
        mandatory: Mandatory,
        callback: ConfirmCallback,
        block_for: Option<Option<Duration>>,
    ) -> BeginSend {
        let guid = message.guid();
        let deadline = match block_for {
            Some(Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };

        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.closed {
                return BeginSend::Closed;
            }
            if inner.outstanding.contains_key(&guid) {
                return BeginSend::Duplicate;
            }
            if self.max_outstanding == 0 || inner.outstanding.len() < self.max_outstanding {
                inner.outstanding.insert(
                    guid,
                    OutstandingPublish {
                        message,
                        routing_key,
                        mandatory,
                        callback: Some(callback),
                        tag: None,
                        returned: false,
                        enqueued_at: Instant::now(),
                    },
                );
                return BeginSend::Accepted;
            }

            // Window is full.
            match block_for {
                None => return BeginSend::InflightLimit,
                Some(timeout) => {
                    let timed_out = match (timeout, deadline) {
                        (Some(_), Some(deadline)) => {
                            let now = Instant::now();
                            if now >= deadline {
                                true
                            } else {
                                let (guard, wait) = self
                                    .space_available
                                    .wait_timeout(inner, deadline - now)
                                    .unwrap();
                                inner = guard;
                                wait.timed_out() && Instant::now() >= deadline
                            }
                        }
                        _ => {
                            inner = self.space_available.wait(inner).unwrap();
                            false
                        }
                    };
                    if timed_out {
                        return BeginSend::TimedOut;
                    }
                }
            }
        }
    }

    /// Removes a record that was accepted but cannot be sent (e.g. the
    /// session closed between acceptance and enqueue).
    pub(crate) fn abort_send(&self, guid: Guid) {
        let mut inner = self.inner.lock().unwrap();
        inner.outstanding.shift_remove(&guid);
        self.notify(&inner);
    }

    /// Returns records that have never been assigned a tag under the current
    /// generation, in original insertion order.
    pub(crate) fn take_unsent(&self) -> Vec<PendingPublish> {
        let inner = self.inner.lock().unwrap();
        inner
            .outstanding
            .iter()
            .filter(|(_, record)| record.tag.is_none() && !record.returned)
            .map(|(guid, record)| PendingPublish {
                guid: *guid,
                message: record.message.clone(),
                routing_key: record.routing_key.clone(),
                mandatory: record.mandatory,
            })
            .collect()
    }

    /// Assigns the next contiguous delivery tag to a just-published record.
    /// Must be called in publish order.
    pub(crate) fn assign_tag(&self, guid: Guid) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let tag = inner.next_tag;
        inner.next_tag += 1;
        inner.by_tag.insert(tag, guid);
        if let Some(record) = inner.outstanding.get_mut(&guid) {
            record.tag = Some(tag);
        }
        tag
    }

    /// Starts a new channel generation: every existing tag is invalidated,
    /// records already resolved by a return are dropped (their ack died with
    /// the old channel), and everything else is scheduled for resend in
    /// original insertion order. Confirms from older generations are ignored
    /// from here on.
    pub(crate) fn begin_generation(&self, generation: u64) -> Vec<PendingPublish> {
        let mut inner = self.inner.lock().unwrap();
        inner.generation = generation;
        inner.by_tag.clear();
        inner.next_tag = 1;
        inner
            .outstanding
            .retain(|_, record| !record.returned);
        self.notify(&inner);

        let resend: Vec<PendingPublish> = inner
            .outstanding
            .iter_mut()
            .map(|(guid, record)| {
                record.tag = None;
                PendingPublish {
                    guid: *guid,
                    message: record.message.clone(),
                    routing_key: record.routing_key.clone(),
                    mandatory: record.mandatory,
                }
            })
            .collect();
        if !resend.is_empty() {
            debug!("scheduling {} unconfirmed messages for resend", resend.len());
        }
        resend
    }

    /// Resolves a broker ack observed on channel generation `generation`.
    /// With `multiple`, resolves every tag up to and including
    /// `delivery_tag`, in tag order.
    pub(crate) fn resolve_ack(
        &self,
        generation: u64,
        delivery_tag: u64,
        multiple: bool,
    ) -> Vec<ReadyCallback> {
        self.resolve(generation, delivery_tag, multiple, ConfirmOutcome::Ack)
    }

    /// Resolves a broker nack.
    pub(crate) fn resolve_nack(
        &self,
        generation: u64,
        delivery_tag: u64,
        multiple: bool,
    ) -> Vec<ReadyCallback> {
        self.resolve(generation, delivery_tag, multiple, ConfirmOutcome::Reject)
    }

    fn resolve(
        &self,
        generation: u64,
        delivery_tag: u64,
        multiple: bool,
        outcome: ConfirmOutcome,
    ) -> Vec<ReadyCallback> {
        let mut inner = self.inner.lock().unwrap();
        if generation != inner.generation {
            debug!(
                "discarding confirm for tag {} from stale channel generation {}",
                delivery_tag, generation
            );
            return Vec::new();
        }

        let tags: Vec<u64> = if multiple {
            inner
                .by_tag
                .range(..=delivery_tag)
                .map(|(tag, _)| *tag)
                .collect()
        } else {
            inner.by_tag.get(&delivery_tag).map(|_| delivery_tag).into_iter().collect()
        };
        if tags.is_empty() {
            warn!(
                "received confirm for unknown delivery tag {} (multiple={})",
                delivery_tag, multiple
            );
            return Vec::new();
        }

        let mut ready = Vec::new();
        for tag in tags {
            let guid = match inner.by_tag.remove(&tag) {
                Some(guid) => guid,
                None => continue,
            };
            let record = match inner.outstanding.shift_remove(&guid) {
                Some(record) => record,
                None => continue,
            };
            if record.returned {
                // Callback already ran with Return; the ack just retires the
                // record.
                continue;
            }
            if let Some(callback) = record.callback {
                ready.push((
                    callback,
                    Confirmation {
                        guid,
                        outcome: outcome.clone(),
                    },
                ));
            }
        }
        self.notify(&inner);
        ready
    }

    /// Resolves a returned (unroutable) message located by GUID. The record
    /// stays outstanding until its ack arrives, but the callback fires now;
    /// an ack that arrived first already removed the record, in which case
    /// the late return is dropped.
    pub(crate) fn resolve_return(
        &self,
        generation: u64,
        guid: Guid,
        reply_code: u16,
        reply_text: String,
    ) -> Option<ReadyCallback> {
        let mut inner = self.inner.lock().unwrap();
        if generation != inner.generation {
            debug!(
                "discarding return for message {} from stale channel generation {}",
                guid, generation
            );
            return None;
        }
        let record = match inner.outstanding.get_mut(&guid) {
            Some(record) => record,
            None => {
                warn!("received return for unknown or already-acked message {}", guid);
                return None;
            }
        };
        if record.returned {
            warn!("received second return for message {}", guid);
            return None;
        }
        record.returned = true;
        record.callback.take().map(|callback| {
            (
                callback,
                Confirmation {
                    guid,
                    outcome: ConfirmOutcome::Return {
                        reply_code,
                        reply_text,
                    },
                },
            )
        })
    }

    /// Resolves every record with `Cancelled` and refuses future sends. Used
    /// on fatal session shutdown.
    pub(crate) fn close(&self) -> Vec<ReadyCallback> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.by_tag.clear();
        let records: Vec<(Guid, OutstandingPublish)> = inner.outstanding.drain(..).collect();
        self.notify(&inner);
        drop(inner);

        records
            .into_iter()
            .filter_map(|(guid, record)| {
                record.callback.map(|callback| {
                    (
                        callback,
                        Confirmation {
                            guid,
                            outcome: ConfirmOutcome::Cancelled,
                        },
                    )
                })
            })
            .collect()
    }

    /// Blocks until no records are outstanding. A `timeout` of `None` waits
    /// forever.
    pub(crate) fn wait_for_confirms(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock().unwrap();
        while !inner.outstanding.is_empty() {
            match deadline {
                None => inner = self.all_confirmed.wait(inner).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitTimedOutSnafu.fail();
                    }
                    let (guard, _) = self
                        .all_confirmed
                        .wait_timeout(inner, deadline - now)
                        .unwrap();
                    inner = guard;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn outstanding_len(&self) -> usize {
        self.inner.lock().unwrap().outstanding.len()
    }

    /// Age of the oldest outstanding record, if any. Useful for diagnostics.
    pub(crate) fn oldest_outstanding(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        inner
            .outstanding
            .values()
            .map(|record| record.enqueued_at.elapsed())
            .max()
    }

    fn notify(&self, inner: &TrackerInner) {
        self.space_available.notify_all();
        if inner.outstanding.is_empty() {
            self.all_confirmed.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop_callback() -> ConfirmCallback {
        Box::new(|_| ())
    }

    fn accept(tracker: &ConfirmTracker, message: Message) -> BeginSend {
        tracker.begin_send(
            message,
            "rk".to_string(),
            Mandatory::ReturnUnroutable,
            noop_callback(),
            None,
        )
    }

    fn publish(tracker: &ConfirmTracker, message: &Message) -> u64 {
        assert_eq!(accept(tracker, message.clone()), BeginSend::Accepted);
        tracker.assign_tag(message.guid())
    }

    /// Most tests live entirely within the first channel generation.
    const GEN: u64 = 0;

    #[test]
    fn duplicate_guid_rejected_until_resolved() {
        let tracker = ConfirmTracker::new(0);
        let message = Message::new("hello");

        assert_eq!(accept(&tracker, message.clone()), BeginSend::Accepted);
        assert_eq!(accept(&tracker, message.clone()), BeginSend::Duplicate);

        let tag = tracker.assign_tag(message.guid());
        let ready = tracker.resolve_ack(GEN, tag, false);
        assert_eq!(ready.len(), 1);

        // resolved; same GUID is acceptable again
        assert_eq!(accept(&tracker, message), BeginSend::Accepted);
    }

    #[test]
    fn tags_are_contiguous_from_one() {
        let tracker = ConfirmTracker::new(0);
        for expected in 1..=3u64 {
            let message = Message::new("x");
            assert_eq!(publish(&tracker, &message), expected);
        }
    }

    #[test]
    fn inflight_limit_enforced_without_blocking() {
        let tracker = ConfirmTracker::new(2);
        assert_eq!(accept(&tracker, Message::new("1")), BeginSend::Accepted);
        assert_eq!(accept(&tracker, Message::new("2")), BeginSend::Accepted);
        assert_eq!(accept(&tracker, Message::new("3")), BeginSend::InflightLimit);
        assert_eq!(tracker.outstanding_len(), 2);
    }

    #[test]
    fn blocking_send_times_out_when_window_stays_full() {
        let tracker = ConfirmTracker::new(1);
        assert_eq!(accept(&tracker, Message::new("1")), BeginSend::Accepted);
        let status = tracker.begin_send(
            Message::new("2"),
            "rk".to_string(),
            Mandatory::ReturnUnroutable,
            noop_callback(),
            Some(Some(Duration::from_millis(30))),
        );
        assert_eq!(status, BeginSend::TimedOut);
    }

    #[test]
    fn blocking_send_wakes_when_confirm_arrives() {
        let tracker = Arc::new(ConfirmTracker::new(1));
        let message = Message::new("1");
        let tag = publish(&tracker, &message);

        let resolver = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                tracker.resolve_ack(GEN, tag, false)
            })
        };

        let status = tracker.begin_send(
            Message::new("2"),
            "rk".to_string(),
            Mandatory::ReturnUnroutable,
            noop_callback(),
            Some(Some(Duration::from_secs(5))),
        );
        assert_eq!(status, BeginSend::Accepted);
        assert_eq!(resolver.join().unwrap().len(), 1);
    }

    #[test]
    fn multiple_ack_resolves_in_tag_order() {
        let tracker = ConfirmTracker::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut guids = Vec::new();
        for i in 0..4 {
            let message = Message::new(format!("m{}", i));
            guids.push(message.guid());
            let order = Arc::clone(&order);
            let status = tracker.begin_send(
                message.clone(),
                "rk".to_string(),
                Mandatory::ReturnUnroutable,
                Box::new(move |confirmation| {
                    order.lock().unwrap().push(confirmation.guid);
                }),
                None,
            );
            assert_eq!(status, BeginSend::Accepted);
            tracker.assign_tag(message.guid());
        }

        // ack tags 1..=3 in one go; tag 4 stays outstanding
        let ready = tracker.resolve_ack(GEN, 3, true);
        assert_eq!(ready.len(), 3);
        for (callback, confirmation) in ready {
            callback(confirmation);
        }
        assert_eq!(*order.lock().unwrap(), guids[..3].to_vec());
        assert_eq!(tracker.outstanding_len(), 1);
    }

    #[test]
    fn nack_reports_reject() {
        let tracker = ConfirmTracker::new(0);
        let message = Message::new("x");
        let tag = publish(&tracker, &message);
        let ready = tracker.resolve_nack(GEN, tag, false);
        assert_eq!(ready.len(), 1);
        let (callback, confirmation) = ready.into_iter().next().unwrap();
        assert_eq!(confirmation.outcome, ConfirmOutcome::Reject);
        callback(confirmation);
    }

    #[test]
    fn return_then_ack_resolves_once() {
        let tracker = ConfirmTracker::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let message = Message::new("x");
        let guid = message.guid();

        let calls2 = Arc::clone(&calls);
        let status = tracker.begin_send(
            message,
            "rk".to_string(),
            Mandatory::ReturnUnroutable,
            Box::new(move |confirmation| {
                calls2.fetch_add(1, Ordering::SeqCst);
                match confirmation.outcome {
                    ConfirmOutcome::Return { reply_code, .. } => assert_eq!(reply_code, 312),
                    other => panic!("unexpected outcome {:?}", other),
                }
            }),
            None,
        );
        assert_eq!(status, BeginSend::Accepted);
        let tag = tracker.assign_tag(guid);

        let ready = tracker.resolve_return(GEN, guid, 312, "NO_ROUTE".to_string());
        let (callback, confirmation) = ready.unwrap();
        callback(confirmation);

        // the record still counts as outstanding until the broker acks it
        assert_eq!(tracker.outstanding_len(), 1);

        // the follow-up ack must not fire the callback again
        let ready = tracker.resolve_ack(GEN, tag, false);
        assert!(ready.is_empty());
        assert_eq!(tracker.outstanding_len(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn return_after_ack_is_dropped() {
        let tracker = ConfirmTracker::new(0);
        let message = Message::new("x");
        let guid = message.guid();
        let tag = publish(&tracker, &message);

        assert_eq!(tracker.resolve_ack(GEN, tag, false).len(), 1);
        assert!(tracker
            .resolve_return(GEN, guid, 312, "NO_ROUTE".to_string())
            .is_none());
    }

    #[test]
    fn generation_bump_schedules_resend_in_original_order() {
        let tracker = ConfirmTracker::new(0);
        let mut guids = Vec::new();
        for i in 0..5 {
            let message = Message::new(format!("m{}", i));
            guids.push(message.guid());
            publish(&tracker, &message);
        }

        // tags 1..=3 confirmed before the connection dropped
        tracker.resolve_ack(GEN, 3, true);

        let resend = tracker.begin_generation(1);
        let resend_guids: Vec<Guid> = resend.iter().map(|p| p.guid).collect();
        assert_eq!(resend_guids, guids[3..].to_vec());

        // new generation tags start at 1 again
        assert_eq!(tracker.assign_tag(resend_guids[0]), 1);
        assert_eq!(tracker.assign_tag(resend_guids[1]), 2);
    }

    #[test]
    fn generation_bump_drops_returned_records() {
        let tracker = ConfirmTracker::new(0);
        let message = Message::new("x");
        let guid = message.guid();
        publish(&tracker, &message);

        let ready = tracker.resolve_return(GEN, guid, 312, "NO_ROUTE".to_string());
        assert!(ready.is_some());

        // its ack died with the channel; it must not be resent
        assert!(tracker.begin_generation(1).is_empty());
        assert_eq!(tracker.outstanding_len(), 0);
    }

    #[test]
    fn take_unsent_skips_tagged_records() {
        let tracker = ConfirmTracker::new(0);
        let sent = Message::new("sent");
        publish(&tracker, &sent);

        let unsent = Message::new("unsent");
        assert_eq!(accept(&tracker, unsent.clone()), BeginSend::Accepted);

        let pending = tracker.take_unsent();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].guid, unsent.guid());
    }

    #[test]
    fn wait_for_confirms_returns_when_empty() {
        let tracker = ConfirmTracker::new(0);
        tracker.wait_for_confirms(Some(Duration::from_millis(10))).unwrap();

        let message = Message::new("x");
        let tag = publish(&tracker, &message);
        match tracker.wait_for_confirms(Some(Duration::from_millis(20))) {
            Err(Error::WaitTimedOut) => (),
            other => panic!("unexpected result {:?}", other),
        }

        tracker.resolve_ack(GEN, tag, false);
        tracker.wait_for_confirms(Some(Duration::from_millis(10))).unwrap();
    }

    #[test]
    fn close_cancels_everything() {
        let tracker = ConfirmTracker::new(0);
        for _ in 0..3 {
            publish(&tracker, &Message::new("x"));
        }

        let ready = tracker.close();
        assert_eq!(ready.len(), 3);
        for (callback, confirmation) in ready {
            assert_eq!(confirmation.outcome, ConfirmOutcome::Cancelled);
            callback(confirmation);
        }

        assert_eq!(accept(&tracker, Message::new("y")), BeginSend::Closed);
    }
}
