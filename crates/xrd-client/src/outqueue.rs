//! The per-sub-stream queue of messages awaiting a socket slot.
//!
//! The queue itself is not synchronized; it lives under its stream's lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use xrd_proto::Message;

use crate::handler::OutgoingHandler;
use crate::status::XRootDStatus;

/// One queued outgoing message with its observer and metadata.
pub struct OutMessage {
    /// The marshalled frame.
    pub msg: Message,
    /// Observer notified around the write.
    pub handler: Arc<dyn OutgoingHandler>,
    /// Absolute expiration time.
    pub expires: Instant,
    /// Whether the message belongs to a session-bound exchange.
    pub stateful: bool,
}

impl std::fmt::Debug for OutMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutMessage")
            .field("msg", &self.msg.description())
            .field("expires", &self.expires)
            .field("stateful", &self.stateful)
            .finish()
    }
}

/// Ordered queue of outgoing messages.
#[derive(Debug, Default)]
pub struct OutQueue {
    items: VecDeque<OutMessage>,
}

impl OutQueue {
    /// An empty queue.
    pub fn new() -> Self {
        OutQueue::default()
    }

    /// Append a message.
    pub fn push_back(&mut self, item: OutMessage) {
        self.items.push_back(item);
    }

    /// Reinsert a message at the front (failed write, reconnect).
    pub fn push_front(&mut self, item: OutMessage) {
        self.items.push_front(item);
    }

    /// Take the next message to write.
    pub fn pop_front(&mut self) -> Option<OutMessage> {
        self.items.pop_front()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Number of queued stateless messages.
    pub fn len_stateless(&self) -> usize {
        self.items.iter().filter(|i| !i.stateful).count()
    }

    /// Move every item of `other` into this queue, preserving order.
    pub fn grab_items(&mut self, other: &mut OutQueue) {
        self.items.append(&mut other.items);
    }

    /// Move the stateful items of `other` into this queue.
    pub fn grab_stateful(&mut self, other: &mut OutQueue) {
        let mut keep = VecDeque::new();
        for item in other.items.drain(..) {
            if item.stateful {
                self.items.push_back(item);
            } else {
                keep.push_back(item);
            }
        }
        other.items = keep;
    }

    /// Move the items of `other` that expired at or before `now`.
    pub fn grab_expired(&mut self, other: &mut OutQueue, now: Instant) {
        let mut keep = VecDeque::new();
        for item in other.items.drain(..) {
            if item.expires <= now {
                self.items.push_back(item);
            } else {
                keep.push_back(item);
            }
        }
        other.items = keep;
    }

    /// Drain the queue, reporting `status` to every observer.
    pub fn report(&mut self, status: &XRootDStatus) {
        for item in self.items.drain(..) {
            item.handler.on_status_ready(&item.msg, status.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter(AtomicUsize);

    impl OutgoingHandler for Counter {
        fn on_ready_to_send(&self, _msg: &mut Message, _stream_num: u16) {}
        fn on_status_ready(&self, _msg: &Message, status: XRootDStatus) {
            assert!(!status.is_ok());
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn item(handler: &Arc<Counter>, expires: Instant, stateful: bool) -> OutMessage {
        OutMessage {
            msg: Message::new(24),
            handler: handler.clone() as Arc<dyn OutgoingHandler>,
            expires,
            stateful,
        }
    }

    #[test]
    fn grab_expired_partitions_by_deadline() {
        let handler = Arc::new(Counter(AtomicUsize::new(0)));
        let now = Instant::now();
        let mut queue = OutQueue::new();
        queue.push_back(item(&handler, now - Duration::from_secs(1), false));
        queue.push_back(item(&handler, now + Duration::from_secs(60), false));
        queue.push_back(item(&handler, now - Duration::from_secs(2), true));

        let mut expired = OutQueue::new();
        expired.grab_expired(&mut queue, now);
        assert_eq!(expired.len(), 2);
        assert_eq!(queue.len(), 1);

        expired.report(&XRootDStatus::error(ErrorKind::OperationExpired));
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn grab_stateful_leaves_stateless_behind() {
        let handler = Arc::new(Counter(AtomicUsize::new(0)));
        let now = Instant::now();
        let mut queue = OutQueue::new();
        queue.push_back(item(&handler, now, true));
        queue.push_back(item(&handler, now, false));
        queue.push_back(item(&handler, now, true));

        let mut stateful = OutQueue::new();
        stateful.grab_stateful(&mut queue);
        assert_eq!(stateful.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.len_stateless(), 1);
    }
}
