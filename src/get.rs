use crate::Delivery;

/// A message fetched synchronously with
/// [`Session::get`](struct.Session.html#method.get).
#[derive(Clone, Debug)]
pub struct Get {
    /// The fetched message. The broker auto-acknowledges it at fetch time.
    pub delivery: Delivery,

    /// Number of messages left in the queue at fetch time.
    pub message_count: u32,
}
