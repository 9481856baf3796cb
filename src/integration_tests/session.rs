use super::{open_session, with_session, with_test_url};
use crate::{
    ConfirmOutcome, ConsumerOptions, Error, ExchangeDeclareOptions, ExchangeType, Mandatory,
    Message, ProducerOptions, QueueDeclareOptions, SendStatus, TopologyUpdate,
};
use crossbeam_channel::bounded;
use std::time::Duration;

// Declare a durable direct exchange, publish with a bound routing key,
// expect an Ack confirmation and a clean wait_for_confirms.
#[test]
fn happy_path_publish() {
    with_session(|session| {
        let update = TopologyUpdate::new()
            .declare_exchange(
                ExchangeType::Direct,
                "duramq-it-ex",
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
            )
            .declare_queue(
                "duramq-it-q",
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
            )
            .bind_queue("duramq-it-q", "duramq-it-ex", "rk");
        session
            .update_topology(update, Some(Duration::from_secs(5)))
            .unwrap();

        let producer = session
            .producer("duramq-it-ex", ProducerOptions::default())
            .unwrap();

        let (outcome_tx, outcome_rx) = bounded(1);
        let status = producer
            .send(
                Message::new("hi"),
                "rk",
                move |confirmation| {
                    let _ = outcome_tx.send(confirmation.outcome);
                },
                None,
            )
            .unwrap();
        assert_eq!(status, SendStatus::Sending);

        producer
            .wait_for_confirms(Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(
            outcome_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            ConfirmOutcome::Ack
        );
    })
}

// A second send with the same GUID before the first confirm resolves is a
// Duplicate and its callback never runs.
#[test]
fn duplicate_guid_guard() {
    with_session(|session| {
        let producer = session
            .producer(
                "",
                ProducerOptions {
                    max_outstanding_confirms: 10,
                    ..ProducerOptions::default()
                },
            )
            .unwrap();

        let message = Message::new("dup");
        let status = producer
            .send(message.clone(), "duramq-it-nowhere", |_| (), None)
            .unwrap();
        assert_eq!(status, SendStatus::Sending);

        let status = producer
            .send(
                message,
                "duramq-it-nowhere",
                |_| panic!("duplicate callback must never fire"),
                None,
            )
            .unwrap();
        assert_eq!(status, SendStatus::Duplicate);

        producer
            .wait_for_confirms(Some(Duration::from_secs(5)))
            .unwrap();
    })
}

// Publishing to a routing key with no binding under ReturnUnroutable yields
// a Return outcome, and wait_for_confirms still succeeds afterwards.
#[test]
fn mandatory_return() {
    with_session(|session| {
        session
            .update_topology(
                TopologyUpdate::new().declare_exchange(
                    ExchangeType::Direct,
                    "duramq-it-ret",
                    ExchangeDeclareOptions::default(),
                ),
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        let producer = session
            .producer("duramq-it-ret", ProducerOptions::default())
            .unwrap();

        let (outcome_tx, outcome_rx) = bounded(1);
        producer
            .send_with_mandatory(
                Message::new("lost"),
                "absent",
                Mandatory::ReturnUnroutable,
                move |confirmation| {
                    let _ = outcome_tx.send(confirmation.outcome);
                },
                None,
            )
            .unwrap();

        match outcome_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ConfirmOutcome::Return { reply_code, .. } => assert_eq!(reply_code, 312),
            other => panic!("unexpected outcome {:?}", other),
        }
        producer
            .wait_for_confirms(Some(Duration::from_secs(5)))
            .unwrap();
    })
}

#[test]
fn consume_and_ack_through_session() {
    with_session(|session| {
        session
            .update_topology(
                TopologyUpdate::new().declare_queue(
                    "duramq-it-consume",
                    QueueDeclareOptions::default(),
                ),
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        let producer = session.producer("", ProducerOptions::default()).unwrap();
        producer
            .send(Message::new("payload"), "duramq-it-consume", |_| (), None)
            .unwrap();
        producer
            .wait_for_confirms(Some(Duration::from_secs(5)))
            .unwrap();

        let (delivery_tx, delivery_rx) = bounded(1);
        let consumer = session
            .consumer(
                "duramq-it-consume",
                ConsumerOptions {
                    prefetch_count: 1,
                    ..ConsumerOptions::default()
                },
                move |delivery| {
                    let _ = delivery_tx.send((delivery.delivery_tag(), delivery.content));
                },
            )
            .unwrap();

        let (tag, content) = delivery_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(content, b"payload");
        assert_eq!(consumer.unacked_count(), 1);
        consumer.ack(tag, false).unwrap();
        consumer.cancel().unwrap();
    })
}

// Redeclaring a queue with different durability is rejected by the broker
// with a channel-level 406; the session surfaces it to the declarer, reopens
// its control channel, and stays connected. (A single session's registry
// would catch the conflict client-side, so a second session does the
// conflicting declare.)
#[test]
fn conflicting_redeclare_is_surfaced() {
    with_test_url(|url| {
        let owner = open_session(url);
        owner
            .update_topology(
                TopologyUpdate::new().declare_queue(
                    "duramq-it-conflict",
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                ),
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        let other = open_session(url);
        let err = other
            .update_topology(
                TopologyUpdate::new().declare_queue(
                    "duramq-it-conflict",
                    QueueDeclareOptions::default(),
                ),
                Some(Duration::from_secs(5)),
            )
            .unwrap_err();
        match err {
            Error::ServerClosedChannel { code, .. } => assert_eq!(code, 406),
            other => panic!("unexpected error {}", other),
        }

        // the session survives and can declare with the original arguments
        other
            .update_topology(
                TopologyUpdate::new().declare_queue(
                    "duramq-it-conflict",
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                ),
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        other.close(None).unwrap();
        owner.close(None).unwrap();
    })
}

#[test]
fn get_fetches_a_published_message() {
    with_session(|session| {
        session
            .update_topology(
                TopologyUpdate::new().declare_queue("duramq-it-get", QueueDeclareOptions::default()),
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        let producer = session.producer("", ProducerOptions::default()).unwrap();
        producer
            .send(Message::new("fetched"), "duramq-it-get", |_| (), None)
            .unwrap();
        producer
            .wait_for_confirms(Some(Duration::from_secs(5)))
            .unwrap();

        let got = loop {
            if let Some(got) = session.get("duramq-it-get").unwrap() {
                break got;
            }
        };
        assert_eq!(got.delivery.content, b"fetched");

        // queue is now empty
        assert!(session.get("duramq-it-get").unwrap().is_none());
    })
}

#[test]
fn blocked_listener_registers_without_traffic() {
    with_session(|session| {
        // a healthy broker sends no blocked/unblocked notifications; the
        // listener should simply stay empty
        let listener = session.register_blocked_listener();
        assert!(listener.receiver().try_recv().is_err());
    })
}
