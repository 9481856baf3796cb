//! Per-channel content reassembly. After a content-bearing method
//! (deliver/return/get-ok), the next frames on that channel must be exactly
//! one header then body frames summing to the header's body size; anything
//! else is a protocol violation.

use crate::wire::method::{Deliver, GetOk as AmqpGetOk, Return as AmqpReturn};
use crate::wire::{BasicProperties, ContentHeader};
use crate::errors::*;
use crate::return_::Return;
use crate::{Delivery, Get};

pub(super) struct ContentCollector {
    kind: Option<Kind>,
}

pub(super) enum CollectorResult {
    Delivery((String, Delivery)),
    Return(Return),
    Get(Get),
}

impl ContentCollector {
    pub(super) fn new() -> ContentCollector {
        ContentCollector { kind: None }
    }

    pub(super) fn collect_deliver(&mut self, deliver: Deliver) -> Result<()> {
        match self.kind.take() {
            None => {
                self.kind = Some(Kind::Delivery(State::Start(deliver)));
                Ok(())
            }
            Some(_) => FrameUnexpectedSnafu.fail(),
        }
    }

    pub(super) fn collect_return(&mut self, return_: AmqpReturn) -> Result<()> {
        match self.kind.take() {
            None => {
                self.kind = Some(Kind::Return(State::Start(return_)));
                Ok(())
            }
            Some(_) => FrameUnexpectedSnafu.fail(),
        }
    }

    pub(super) fn collect_get(&mut self, get_ok: AmqpGetOk) -> Result<()> {
        match self.kind.take() {
            None => {
                self.kind = Some(Kind::Get(State::Start(get_ok)));
                Ok(())
            }
            Some(_) => FrameUnexpectedSnafu.fail(),
        }
    }

    /// True if a content-bearing method is mid-reassembly; receiving another
    /// method on this channel right now would violate frame ordering.
    pub(super) fn is_mid_content(&self) -> bool {
        self.kind.is_some()
    }

    pub(super) fn collect_header(
        &mut self,
        header: ContentHeader,
    ) -> Result<Option<CollectorResult>> {
        match self.kind.take() {
            Some(Kind::Delivery(state)) => match state.collect_header(header)? {
                Content::Done(done) => Ok(Some(CollectorResult::Delivery(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Delivery(state));
                    Ok(None)
                }
            },
            Some(Kind::Return(state)) => match state.collect_header(header)? {
                Content::Done(done) => Ok(Some(CollectorResult::Return(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Return(state));
                    Ok(None)
                }
            },
            Some(Kind::Get(state)) => match state.collect_header(header)? {
                Content::Done(done) => Ok(Some(CollectorResult::Get(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Get(state));
                    Ok(None)
                }
            },
            None => FrameUnexpectedSnafu.fail(),
        }
    }

    pub(super) fn collect_body(&mut self, body: Vec<u8>) -> Result<Option<CollectorResult>> {
        match self.kind.take() {
            Some(Kind::Delivery(state)) => match state.collect_body(body)? {
                Content::Done(done) => Ok(Some(CollectorResult::Delivery(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Delivery(state));
                    Ok(None)
                }
            },
            Some(Kind::Return(state)) => match state.collect_body(body)? {
                Content::Done(done) => Ok(Some(CollectorResult::Return(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Return(state));
                    Ok(None)
                }
            },
            Some(Kind::Get(state)) => match state.collect_body(body)? {
                Content::Done(done) => Ok(Some(CollectorResult::Get(done))),
                Content::NeedMore(state) => {
                    self.kind = Some(Kind::Get(state));
                    Ok(None)
                }
            },
            None => FrameUnexpectedSnafu.fail(),
        }
    }
}

enum Kind {
    Delivery(State<Delivery>),
    Return(State<Return>),
    Get(State<Get>),
}

trait ContentType {
    type Start;
    type Finish;

    fn new(start: Self::Start, buf: Vec<u8>, properties: BasicProperties) -> Self::Finish;
}

impl ContentType for Delivery {
    type Start = Deliver;
    type Finish = (String, Delivery);

    fn new(start: Deliver, buf: Vec<u8>, properties: BasicProperties) -> Self::Finish {
        Delivery::new(start, buf, properties)
    }
}

impl ContentType for Return {
    type Start = AmqpReturn;
    type Finish = Return;

    fn new(start: AmqpReturn, buf: Vec<u8>, properties: BasicProperties) -> Self::Finish {
        Return::new(start, buf, properties)
    }
}

impl ContentType for Get {
    type Start = AmqpGetOk;
    type Finish = Get;

    fn new(get_ok: AmqpGetOk, buf: Vec<u8>, properties: BasicProperties) -> Self::Finish {
        let message_count = get_ok.message_count;
        let delivery = Delivery::new_get_ok(get_ok, buf, properties);
        Get {
            delivery,
            message_count,
        }
    }
}

enum Content<T: ContentType> {
    Done(T::Finish),
    NeedMore(State<T>),
}

// Clippy warns about State::Body being much larger than the other variant,
// but we expect almost all instances of State to transition to Body.
#[allow(clippy::large_enum_variant)]
enum State<T: ContentType> {
    Start(T::Start),
    Body(T::Start, ContentHeader, Vec<u8>),
}

impl<T: ContentType> State<T> {
    fn collect_header(self, header: ContentHeader) -> Result<Content<T>> {
        match self {
            State::Start(start) => {
                if header.body_size == 0 {
                    Ok(Content::Done(T::new(start, Vec::new(), header.properties)))
                } else {
                    let buf = Vec::with_capacity(header.body_size as usize);
                    Ok(Content::NeedMore(State::Body(start, header, buf)))
                }
            }
            State::Body(_, _, _) => FrameUnexpectedSnafu.fail(),
        }
    }

    fn collect_body(self, mut body: Vec<u8>) -> Result<Content<T>> {
        match self {
            State::Body(start, header, mut buf) => {
                let body_size = header.body_size as usize;
                buf.append(&mut body);
                if buf.len() == body_size {
                    Ok(Content::Done(T::new(start, buf, header.properties)))
                } else if buf.len() < body_size {
                    Ok(Content::NeedMore(State::Body(start, header, buf)))
                } else {
                    FrameUnexpectedSnafu.fail()
                }
            }
            State::Start(_) => FrameUnexpectedSnafu.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::method::CLASS_BASIC;

    fn deliver() -> Deliver {
        Deliver {
            consumer_tag: "ctag".to_string(),
            delivery_tag: 1,
            redelivered: false,
            exchange: "ex".to_string(),
            routing_key: "rk".to_string(),
        }
    }

    fn header(body_size: u64) -> ContentHeader {
        ContentHeader {
            class_id: CLASS_BASIC,
            body_size,
            properties: BasicProperties::default(),
        }
    }

    #[test]
    fn reassembles_split_bodies() {
        let mut collector = ContentCollector::new();
        collector.collect_deliver(deliver()).unwrap();
        assert!(collector.collect_header(header(6)).unwrap().is_none());
        assert!(collector.collect_body(b"abc".to_vec()).unwrap().is_none());
        match collector.collect_body(b"def".to_vec()).unwrap() {
            Some(CollectorResult::Delivery((tag, delivery))) => {
                assert_eq!(tag, "ctag");
                assert_eq!(delivery.content, b"abcdef");
            }
            _ => panic!("expected completed delivery"),
        }
        assert!(!collector.is_mid_content());
    }

    #[test]
    fn zero_length_body_completes_at_header() {
        let mut collector = ContentCollector::new();
        collector.collect_deliver(deliver()).unwrap();
        match collector.collect_header(header(0)).unwrap() {
            Some(CollectorResult::Delivery((_, delivery))) => {
                assert!(delivery.content.is_empty());
            }
            _ => panic!("expected completed delivery"),
        }
    }

    #[test]
    fn header_without_method_rejected() {
        let mut collector = ContentCollector::new();
        match collector.collect_header(header(1)) {
            Err(Error::FrameUnexpected) => (),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn method_during_reassembly_rejected() {
        let mut collector = ContentCollector::new();
        collector.collect_deliver(deliver()).unwrap();
        assert!(collector.is_mid_content());
        match collector.collect_deliver(deliver()) {
            Err(Error::FrameUnexpected) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn body_overrun_rejected() {
        let mut collector = ContentCollector::new();
        collector.collect_deliver(deliver()).unwrap();
        collector.collect_header(header(2)).unwrap();
        match collector.collect_body(b"abc".to_vec()) {
            Err(Error::FrameUnexpected) => (),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }
}
