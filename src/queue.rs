use crate::wire::method::QueueDeclare;
use crate::wire::FieldTable;

/// Options passed to the server when declaring a queue.
///
/// The [`default`](#impl-Default) implementation sets all boolean fields to
/// false and has an empty set of arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeclareOptions {
    /// If true, declares queue as durable (survives server restarts); if
    /// false, the queue is deleted on a server restart.
    pub durable: bool,

    /// If true, declares queue as exclusive: the queue may only be accessed
    /// by the current connection, and it is deleted when the connection
    /// closes.
    pub exclusive: bool,

    /// If true, declares queue as auto-delete: the server will delete it
    /// once its last consumer is cancelled or disconnects.
    pub auto_delete: bool,

    /// Extra arguments; these are optional in general, but may be needed for
    /// some plugins or server-specific features.
    pub arguments: FieldTable,
}

impl QueueDeclareOptions {
    pub(crate) fn into_declare(self, name: String, passive: bool, nowait: bool) -> QueueDeclare {
        QueueDeclare {
            ticket: 0,
            queue: name,
            passive,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            nowait,
            arguments: self.arguments,
        }
    }
}
