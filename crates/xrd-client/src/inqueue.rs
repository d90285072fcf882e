//! The per-channel registry of incoming-message handlers.
//!
//! Arriving messages are offered to the registered handlers in
//! registration order until one takes them; unclaimed messages are
//! retained and probed against handlers registered later.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use xrd_proto::Message;

use crate::handler::{HandlerAction, InVerdict, IncomingHandler, StreamEvent};
use crate::status::{ErrorKind, XRootDStatus};

struct Registration {
    handler: Arc<dyn IncomingHandler>,
    expires: Instant,
}

#[derive(Default)]
struct Inner {
    messages: VecDeque<Message>,
    handlers: Vec<Registration>,
}

/// Undelivered messages and the handlers waiting for them.
#[derive(Default)]
pub struct InQueue {
    inner: Mutex<Inner>,
}

impl InQueue {
    /// An empty queue.
    pub fn new() -> Self {
        InQueue::default()
    }

    /// Offer a message to the registered handlers; retain it if nobody
    /// takes it.
    pub fn add_message(&self, msg: Message) {
        let mut inner = self.inner.lock().unwrap();
        let mut msg = msg;
        let mut index = 0;
        while index < inner.handlers.len() {
            let handler = inner.handlers[index].handler.clone();
            match handler.on_incoming(msg) {
                InVerdict::Taken { remove_handler } => {
                    if remove_handler {
                        inner.handlers.remove(index);
                    }
                    return;
                }
                InVerdict::Ignored(back) => {
                    msg = back;
                    index += 1;
                }
            }
        }
        inner.messages.push_front(msg);
    }

    /// Register a handler, first probing it against retained messages. A
    /// handler that is already registered only has its expiration
    /// refreshed.
    pub fn add_handler(&self, handler: Arc<dyn IncomingHandler>, expires: Instant) {
        let mut inner = self.inner.lock().unwrap();

        let mut index = 0;
        while index < inner.messages.len() {
            let Some(msg) = inner.messages.remove(index) else {
                break;
            };
            match handler.on_incoming(msg) {
                InVerdict::Taken { remove_handler } => {
                    if remove_handler {
                        // terminal before it was ever registered
                        return;
                    }
                }
                InVerdict::Ignored(back) => {
                    inner.messages.insert(index, back);
                    index += 1;
                }
            }
        }

        if let Some(existing) = inner
            .handlers
            .iter_mut()
            .find(|r| Arc::ptr_eq(&r.handler, &handler))
        {
            existing.expires = expires;
            return;
        }
        inner.handlers.push(Registration { handler, expires });
    }

    /// Deregister a handler.
    pub fn remove_handler(&self, handler: &Arc<dyn IncomingHandler>) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.retain(|r| !Arc::ptr_eq(&r.handler, handler));
    }

    /// Dispatch a stream event to every handler, dropping those that ask
    /// to be removed.
    pub fn report_stream_event(&self, event: StreamEvent, stream_num: u16, status: XRootDStatus) {
        let mut inner = self.inner.lock().unwrap();
        let mut index = 0;
        while index < inner.handlers.len() {
            let handler = inner.handlers[index].handler.clone();
            match handler.on_stream_event(event, stream_num, status.clone()) {
                HandlerAction::Remove => {
                    inner.handlers.remove(index);
                }
                HandlerAction::Keep => index += 1,
            }
        }
    }

    /// Expire every handler whose deadline passed, delivering a `Timeout`
    /// event with `OperationExpired`.
    pub fn report_timeout(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        let mut index = 0;
        while index < inner.handlers.len() {
            if inner.handlers[index].expires <= now {
                let registration = inner.handlers.remove(index);
                registration.handler.on_stream_event(
                    StreamEvent::Timeout,
                    0,
                    XRootDStatus::error(ErrorKind::OperationExpired),
                );
            } else {
                index += 1;
            }
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.lock().unwrap().handlers.len()
    }

    /// Number of retained messages.
    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Takes messages whose response stream id matches; counts events.
    struct SidHandler {
        sid: u16,
        taken: AtomicUsize,
        events: AtomicUsize,
        remove_on_take: bool,
    }

    impl SidHandler {
        fn new(sid: u16, remove_on_take: bool) -> Arc<Self> {
            Arc::new(SidHandler {
                sid,
                taken: AtomicUsize::new(0),
                events: AtomicUsize::new(0),
                remove_on_take,
            })
        }
    }

    impl IncomingHandler for SidHandler {
        fn on_incoming(&self, msg: Message) -> InVerdict {
            if msg.resp_sid() == self.sid {
                self.taken.fetch_add(1, Ordering::SeqCst);
                InVerdict::Taken {
                    remove_handler: self.remove_on_take,
                }
            } else {
                InVerdict::Ignored(msg)
            }
        }

        fn on_stream_event(
            &self,
            _event: StreamEvent,
            _stream_num: u16,
            _status: XRootDStatus,
        ) -> HandlerAction {
            self.events.fetch_add(1, Ordering::SeqCst);
            HandlerAction::Remove
        }
    }

    fn response(sid: u16) -> Message {
        let mut data = Vec::new();
        data.extend_from_slice(&sid.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        Message::from_bytes(data)
    }

    #[test]
    fn message_goes_to_the_matching_handler() {
        let queue = InQueue::new();
        let expires = Instant::now() + Duration::from_secs(60);
        let first = SidHandler::new(1, true);
        let second = SidHandler::new(2, true);
        queue.add_handler(first.clone(), expires);
        queue.add_handler(second.clone(), expires);

        queue.add_message(response(2));
        assert_eq!(first.taken.load(Ordering::SeqCst), 0);
        assert_eq!(second.taken.load(Ordering::SeqCst), 1);
        assert_eq!(queue.handler_count(), 1);
        assert_eq!(queue.message_count(), 0);
    }

    #[test]
    fn unclaimed_message_is_retained_for_a_later_handler() {
        let queue = InQueue::new();
        queue.add_message(response(7));
        assert_eq!(queue.message_count(), 1);

        let handler = SidHandler::new(7, true);
        queue.add_handler(handler.clone(), Instant::now() + Duration::from_secs(60));
        assert_eq!(handler.taken.load(Ordering::SeqCst), 1);
        assert_eq!(queue.message_count(), 0);
        // terminal before registration: not registered
        assert_eq!(queue.handler_count(), 0);
    }

    #[test]
    fn reregistration_only_refreshes_expiry() {
        let queue = InQueue::new();
        let handler = SidHandler::new(1, false);
        let now = Instant::now();
        queue.add_handler(handler.clone(), now + Duration::from_secs(1));
        queue.add_handler(handler.clone(), now + Duration::from_secs(60));
        assert_eq!(queue.handler_count(), 1);

        queue.report_timeout(now + Duration::from_secs(30));
        assert_eq!(queue.handler_count(), 1);
        assert_eq!(handler.events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timeout_expires_old_handlers() {
        let queue = InQueue::new();
        let stale = SidHandler::new(1, false);
        let fresh = SidHandler::new(2, false);
        let now = Instant::now();
        queue.add_handler(stale.clone(), now - Duration::from_secs(1));
        queue.add_handler(fresh.clone(), now + Duration::from_secs(60));

        queue.report_timeout(now);
        assert_eq!(stale.events.load(Ordering::SeqCst), 1);
        assert_eq!(fresh.events.load(Ordering::SeqCst), 0);
        assert_eq!(queue.handler_count(), 1);
    }

    #[test]
    fn stream_events_can_remove_handlers() {
        let queue = InQueue::new();
        let handler = SidHandler::new(1, false);
        queue.add_handler(handler.clone(), Instant::now() + Duration::from_secs(60));
        queue.report_stream_event(
            StreamEvent::Broken,
            0,
            XRootDStatus::error(ErrorKind::SocketDisconnected),
        );
        assert_eq!(handler.events.load(Ordering::SeqCst), 1);
        assert_eq!(queue.handler_count(), 0);
    }
}
