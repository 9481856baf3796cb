//! Heartbeat clocks. Given a negotiated period of `H` seconds, the tx clock
//! fires when we have sent nothing for `H` seconds (time to emit a heartbeat
//! frame) and the rx clock fires when we have received nothing for `2·H`
//! seconds (the server is gone). `H = 0` disables both.

use log::trace;
use mio_extras::timer::{Timeout, Timer};
use std::fmt::Debug;
use std::time::{Duration, Instant};

const MAX_MISSED_SERVER_HEARTBEATS: u32 = 2;

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum HeartbeatState {
    StillRunning,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum HeartbeatKind {
    Rx,
    Tx,
}

#[derive(Debug)]
struct Heartbeat<T: Copy + Debug> {
    val: T,
    last: Instant,
    timeout: Timeout,
    interval: Duration,
}

impl<T: Copy + Debug> Heartbeat<T> {
    fn start(val: T, interval: Duration, timer: &mut Timer<T>) -> Heartbeat<T> {
        assert!(
            interval > Duration::from_millis(0),
            "timer interval cannot be 0"
        );
        let last = Instant::now();
        let timeout = timer.set_timeout(interval, val);
        Heartbeat {
            val,
            last,
            timeout,
            interval,
        }
    }

    fn record_activity(&mut self) {
        self.last = Instant::now();
    }

    fn fire(&mut self, timer: &mut Timer<T>) -> HeartbeatState {
        timer.cancel_timeout(&self.timeout);

        // see if the heartbeat timer has expired (in which case we'll
        // restart for the full interval) or if there have been intervening
        // record_activity() calls (in which case we'll restart for the
        // remaining time).
        //
        // We'll add a bit of fudge in the comparison to handle imprecise
        // wakeups; during unit tests sometimes we wake up <1ms before
        // expiration, but we want to count that as expired anyway. AMQP
        // heartbeats are scaled in seconds, so a few ms is harmless.
        let elapsed = self.last.elapsed();
        let (when, state) = if self.interval <= elapsed + Duration::from_millis(5) {
            (self.interval, HeartbeatState::Expired)
        } else {
            (self.interval - elapsed, HeartbeatState::StillRunning)
        };

        trace!(
            "setting new heartbeat timer {:?} for {:?} (interval = {:?}, elapsed = {:?})",
            self.val,
            when,
            self.interval,
            elapsed
        );
        self.timeout = timer.set_timeout(when, self.val);
        state
    }
}

struct RxTxHeartbeat {
    rx: Heartbeat<HeartbeatKind>,
    tx: Heartbeat<HeartbeatKind>,
}

impl RxTxHeartbeat {
    fn new(timer: &mut Timer<HeartbeatKind>, interval: Duration) -> RxTxHeartbeat {
        let rx = Heartbeat::start(
            HeartbeatKind::Rx,
            MAX_MISSED_SERVER_HEARTBEATS * interval,
            timer,
        );
        let tx = Heartbeat::start(HeartbeatKind::Tx, interval, timer);
        RxTxHeartbeat { rx, tx }
    }
}

/// The paired rx/tx heartbeat clocks owned by the I/O thread, driven off a
/// single mio timer.
#[derive(Default)]
pub(crate) struct HeartbeatTimers {
    pub(crate) timer: Timer<HeartbeatKind>,
    heartbeats: Option<RxTxHeartbeat>,
}

impl HeartbeatTimers {
    pub(crate) fn record_rx_activity(&mut self) {
        if let Some(hb) = &mut self.heartbeats {
            trace!("recording activity for rx heartbeat");
            hb.rx.record_activity();
        }
    }

    pub(crate) fn record_tx_activity(&mut self) {
        if let Some(hb) = &mut self.heartbeats {
            trace!("recording activity for tx heartbeat");
            hb.tx.record_activity();
        }
    }

    pub(crate) fn start(&mut self, interval: Duration) {
        assert!(
            self.heartbeats.is_none(),
            "heartbeat timer started multiple times"
        );
        self.heartbeats = Some(RxTxHeartbeat::new(&mut self.timer, interval));
    }

    pub(crate) fn fire_rx(&mut self) -> HeartbeatState {
        self.heartbeats
            .as_mut()
            .expect("fire_rx called on empty heartbeats")
            .rx
            .fire(&mut self.timer)
    }

    pub(crate) fn fire_tx(&mut self) -> HeartbeatState {
        self.heartbeats
            .as_mut()
            .expect("fire_tx called on empty heartbeats")
            .tx
            .fire(&mut self.timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll, PollOpt, Ready, Token};
    use mio_extras::timer::Builder;

    struct Harness {
        poll: Poll,
        events: Events,
        timer: Timer<u32>,
    }

    impl Harness {
        const TOKEN: Token = Token(0);

        fn new() -> Harness {
            let poll = Poll::new().unwrap();
            let events = Events::with_capacity(16);
            let timer = Builder::default().tick_duration(millis(10)).build();
            poll.register(&timer, Self::TOKEN, Ready::readable(), PollOpt::edge())
                .unwrap();
            Harness {
                poll,
                events,
                timer,
            }
        }

        fn poll(&mut self, timeout: Duration) {
            self.poll.poll(&mut self.events, Some(timeout)).unwrap();
        }

        fn poll_until_fire(&mut self, h: &mut Heartbeat<u32>) -> HeartbeatState {
            loop {
                self.poll.poll(&mut self.events, None).unwrap();
                for ev in &self.events {
                    assert_eq!(ev.token(), Self::TOKEN);
                    if self.timer.poll().is_some() {
                        return h.fire(&mut self.timer);
                    }
                }
            }
        }
    }

    fn millis(u: u64) -> Duration {
        Duration::from_millis(u)
    }

    fn assert_duration_is_about(one: Duration, two: Duration) {
        // NOTE: assumes two is >= 50ms, or will panic on the subtraction.
        // Fine for all our tests which are 100s of ms test durations
        assert!(one > two - millis(50));
        assert!(one < two + millis(50));
    }

    #[test]
    fn fire_after_expiration() {
        let mut t = Harness::new();
        let mut h = Heartbeat::start(0, millis(400), &mut t.timer);
        let start = Instant::now();

        let state = t.poll_until_fire(&mut h);

        assert_duration_is_about(start.elapsed(), millis(400));
        assert_eq!(state, HeartbeatState::Expired);
    }

    #[test]
    fn fire_after_activity() {
        let mut t = Harness::new();
        let mut h = Heartbeat::start(0, millis(400), &mut t.timer);
        let start = Instant::now();

        // timer shouldn't fire yet
        t.poll(millis(200));
        assert_duration_is_about(start.elapsed(), millis(200));
        assert!(t.events.is_empty());
        h.record_activity();

        // timer should fire, but should be set back to "still running"
        let state = t.poll_until_fire(&mut h);
        assert_duration_is_about(start.elapsed(), millis(400));
        assert_eq!(state, HeartbeatState::StillRunning);

        // timer should fire again and expire in just ~200ms
        let state = t.poll_until_fire(&mut h);
        assert_duration_is_about(start.elapsed(), millis(600));
        assert_eq!(state, HeartbeatState::Expired);
    }

    #[test]
    fn rx_window_is_twice_the_interval() {
        let mut timer = Builder::default().tick_duration(millis(10)).build();
        let hb = RxTxHeartbeat::new(&mut timer, millis(100));
        assert_eq!(hb.rx.interval, millis(200));
        assert_eq!(hb.tx.interval, millis(100));
    }
}
