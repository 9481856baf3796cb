//! The topology registry: every exchange, queue, and binding the session has
//! declared, in declaration order, so the whole set can be replayed on a
//! fresh connection after a reconnect.

use crate::errors::*;
use crate::exchange::{ExchangeDeclareOptions, ExchangeType};
use crate::io_loop::ChannelHandle;
use crate::queue::QueueDeclareOptions;
use crate::wire::method::{
    ExchangeBind, ExchangeDeclare, ExchangeMethod, Method, QueueBind, QueueDeclare, QueueMethod,
};
use crate::wire::FieldTable;
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;

/// One declared entity.
#[derive(Clone, Debug, PartialEq)]
pub enum TopologyEntry {
    ExchangeDeclare(ExchangeDeclare),
    QueueDeclare(QueueDeclare),
    QueueBind(QueueBind),
    ExchangeBind(ExchangeBind),
}

impl TopologyEntry {
    fn kind(&self) -> &'static str {
        match self {
            TopologyEntry::ExchangeDeclare(_) => "exchange",
            TopologyEntry::QueueDeclare(_) => "queue",
            TopologyEntry::QueueBind(_) => "queue binding",
            TopologyEntry::ExchangeBind(_) => "exchange binding",
        }
    }

    /// The identity used for deduplication: what the entry names, not how
    /// it is configured.
    fn identity(&self) -> String {
        match self {
            TopologyEntry::ExchangeDeclare(m) => m.exchange.clone(),
            TopologyEntry::QueueDeclare(m) => m.queue.clone(),
            TopologyEntry::QueueBind(m) => {
                format!("{}|{}|{}", m.queue, m.exchange, m.routing_key)
            }
            TopologyEntry::ExchangeBind(m) => {
                format!("{}|{}|{}", m.destination, m.source, m.routing_key)
            }
        }
    }

    /// Hash over the full wire encoding (flags and arguments included), so
    /// any difference in configuration yields a different fingerprint.
    fn fingerprint(&self) -> u64 {
        let method: Method = match self.clone() {
            TopologyEntry::ExchangeDeclare(m) => ExchangeMethod::Declare(m).into(),
            TopologyEntry::QueueDeclare(m) => QueueMethod::Declare(m).into(),
            TopologyEntry::QueueBind(m) => QueueMethod::Bind(m).into(),
            TopologyEntry::ExchangeBind(m) => ExchangeMethod::Bind(m).into(),
        };
        let mut buf = Vec::new();
        method.encode(&mut buf);
        let mut hasher = DefaultHasher::new();
        hasher.write(&buf);
        hasher.finish()
    }

    /// Declares this entry on the given channel and checks the reply.
    pub(crate) fn apply(&self, handle: &mut ChannelHandle) -> Result<()> {
        debug!("declaring {} \"{}\"", self.kind(), self.identity());
        match self {
            TopologyEntry::ExchangeDeclare(m) => {
                match handle.call(ExchangeMethod::Declare(m.clone()))? {
                    Method::Exchange(ExchangeMethod::DeclareOk) => Ok(()),
                    _ => FrameUnexpectedSnafu.fail(),
                }
            }
            TopologyEntry::QueueDeclare(m) => match handle.call(QueueMethod::Declare(m.clone()))? {
                Method::Queue(QueueMethod::DeclareOk(_)) => Ok(()),
                _ => FrameUnexpectedSnafu.fail(),
            },
            TopologyEntry::QueueBind(m) => match handle.call(QueueMethod::Bind(m.clone()))? {
                Method::Queue(QueueMethod::BindOk) => Ok(()),
                _ => FrameUnexpectedSnafu.fail(),
            },
            TopologyEntry::ExchangeBind(m) => match handle.call(ExchangeMethod::Bind(m.clone()))? {
                Method::Exchange(ExchangeMethod::BindOk) => Ok(()),
                _ => FrameUnexpectedSnafu.fail(),
            },
        }
    }
}

/// The ordered set of everything declared on a session.
#[derive(Default)]
pub(crate) struct Topology {
    entries: Vec<TopologyEntry>,
    index: HashMap<(&'static str, String), u64>,
}

impl Topology {
    pub(crate) fn new() -> Topology {
        Topology::default()
    }

    /// Like [`record`](#method.record) but without mutating: reports
    /// whether the entry is new, a duplicate, or a conflict. Used to
    /// validate before talking to the broker.
    pub(crate) fn check(&self, entry: &TopologyEntry) -> Result<bool> {
        let key = (entry.kind(), entry.identity());
        match self.index.get(&key) {
            Some(existing) if *existing == entry.fingerprint() => Ok(false),
            Some(_) => TopologyConflictSnafu {
                kind: key.0,
                name: key.1,
            }
            .fail(),
            None => Ok(true),
        }
    }

    /// Records a declaration. Returns `false` if an identical entry is
    /// already recorded (idempotent re-declare), `true` if newly added, and
    /// `TopologyConflict` if the same entity was previously recorded with a
    /// different configuration.
    pub(crate) fn record(&mut self, entry: TopologyEntry) -> Result<bool> {
        let key = (entry.kind(), entry.identity());
        let fingerprint = entry.fingerprint();
        match self.index.get(&key) {
            Some(existing) if *existing == fingerprint => Ok(false),
            Some(_) => TopologyConflictSnafu {
                kind: key.0,
                name: key.1,
            }
            .fail(),
            None => {
                self.index.insert(key, fingerprint);
                self.entries.push(entry);
                Ok(true)
            }
        }
    }

    pub(crate) fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A batch of declarations to apply to the broker and, on success, record
/// for replay after reconnects.
///
/// ```rust
/// use duramq::{ExchangeDeclareOptions, ExchangeType, QueueDeclareOptions, TopologyUpdate};
///
/// let update = TopologyUpdate::new()
///     .declare_exchange(ExchangeType::Direct, "events", ExchangeDeclareOptions {
///         durable: true,
///         ..ExchangeDeclareOptions::default()
///     })
///     .declare_queue("audit", QueueDeclareOptions {
///         durable: true,
///         ..QueueDeclareOptions::default()
///     })
///     .bind_queue("audit", "events", "audit.#");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyUpdate {
    pub(crate) entries: Vec<TopologyEntry>,
}

impl TopologyUpdate {
    pub fn new() -> TopologyUpdate {
        TopologyUpdate::default()
    }

    pub fn declare_exchange<S: Into<String>>(
        mut self,
        type_: ExchangeType,
        name: S,
        options: ExchangeDeclareOptions,
    ) -> Self {
        self.entries.push(TopologyEntry::ExchangeDeclare(
            options.into_declare(type_, name.into(), false, false),
        ));
        self
    }

    pub fn declare_queue<S: Into<String>>(mut self, name: S, options: QueueDeclareOptions) -> Self {
        self.entries.push(TopologyEntry::QueueDeclare(
            options.into_declare(name.into(), false, false),
        ));
        self
    }

    pub fn bind_queue<S0: Into<String>, S1: Into<String>, S2: Into<String>>(
        self,
        queue: S0,
        exchange: S1,
        routing_key: S2,
    ) -> Self {
        self.bind_queue_with_arguments(queue, exchange, routing_key, FieldTable::new())
    }

    pub fn bind_queue_with_arguments<S0: Into<String>, S1: Into<String>, S2: Into<String>>(
        mut self,
        queue: S0,
        exchange: S1,
        routing_key: S2,
        arguments: FieldTable,
    ) -> Self {
        self.entries.push(TopologyEntry::QueueBind(QueueBind {
            ticket: 0,
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            nowait: false,
            arguments,
        }));
        self
    }

    pub fn bind_exchange<S0: Into<String>, S1: Into<String>, S2: Into<String>>(
        mut self,
        destination: S0,
        source: S1,
        routing_key: S2,
    ) -> Self {
        self.entries.push(TopologyEntry::ExchangeBind(ExchangeBind {
            ticket: 0,
            destination: destination.into(),
            source: source.into(),
            routing_key: routing_key.into(),
            nowait: false,
            arguments: FieldTable::new(),
        }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durable_queue(name: &str, durable: bool) -> TopologyEntry {
        TopologyEntry::QueueDeclare(
            QueueDeclareOptions {
                durable,
                ..QueueDeclareOptions::default()
            }
            .into_declare(name.to_string(), false, false),
        )
    }

    #[test]
    fn identical_redeclare_is_idempotent() {
        let mut topology = Topology::new();
        assert!(topology.record(durable_queue("q1", true)).unwrap());
        assert!(!topology.record(durable_queue("q1", true)).unwrap());
        assert_eq!(topology.len(), 1);
    }

    #[test]
    fn conflicting_redeclare_rejected() {
        let mut topology = Topology::new();
        topology.record(durable_queue("q1", true)).unwrap();
        match topology.record(durable_queue("q1", false)) {
            Err(Error::TopologyConflict { kind, name }) => {
                assert_eq!(kind, "queue");
                assert_eq!(name, "q1");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn conflicting_arguments_rejected() {
        fn with_ttl(ttl: i32) -> TopologyEntry {
            let mut arguments = FieldTable::new();
            arguments.insert("x-message-ttl", crate::FieldValue::LongInt(ttl));
            TopologyEntry::QueueDeclare(
                QueueDeclareOptions {
                    arguments,
                    ..QueueDeclareOptions::default()
                }
                .into_declare("q1".to_string(), false, false),
            )
        }

        let mut topology = Topology::new();
        topology.record(with_ttl(1000)).unwrap();
        match topology.record(with_ttl(2000)) {
            Err(Error::TopologyConflict { .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn same_name_different_kind_no_conflict() {
        let mut topology = Topology::new();
        topology.record(durable_queue("shared", true)).unwrap();
        let exchange = TopologyEntry::ExchangeDeclare(
            ExchangeDeclareOptions::default().into_declare(
                ExchangeType::Direct,
                "shared".to_string(),
                false,
                false,
            ),
        );
        assert!(topology.record(exchange).unwrap());
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn bindings_keyed_by_route() {
        fn bind(rk: &str) -> TopologyEntry {
            TopologyEntry::QueueBind(QueueBind {
                ticket: 0,
                queue: "q1".to_string(),
                exchange: "ex".to_string(),
                routing_key: rk.to_string(),
                nowait: false,
                arguments: FieldTable::new(),
            })
        }

        let mut topology = Topology::new();
        assert!(topology.record(bind("a")).unwrap());
        assert!(topology.record(bind("b")).unwrap());
        assert!(!topology.record(bind("a")).unwrap());
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn replay_preserves_declaration_order() {
        let mut topology = Topology::new();
        let update = TopologyUpdate::new()
            .declare_exchange(
                ExchangeType::Direct,
                "ex",
                ExchangeDeclareOptions::default(),
            )
            .declare_queue("q1", QueueDeclareOptions::default())
            .bind_queue("q1", "ex", "rk");
        for entry in update.entries {
            topology.record(entry).unwrap();
        }

        let kinds: Vec<&'static str> = topology.entries().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["exchange", "queue", "queue binding"]);
    }
}
