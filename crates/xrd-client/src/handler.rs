//! Handler traits wiring the post master to per-request logic, plus the
//! typed response payload delivered to callers.

use std::sync::Mutex;

use tokio::sync::oneshot;

use xrd_proto::info::{
    BinaryData, ChunkInfo, DirectoryList, LocationInfo, OpenInfo, ProtocolInfo, RedirectInfo,
    StatInfo, StatInfoVfs, VectorReadInfo,
};
use xrd_proto::Message;

use crate::status::XRootDStatus;
use crate::url::Url;

/// Events a stream reports to registered incoming handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The stream (re)connected.
    Ready,
    /// The connection broke; the session is gone.
    Broken,
    /// A registered handler outlived its expiration.
    Timeout,
    /// The stream cannot recover.
    FatalError,
}

/// What an incoming handler decided about a message.
#[derive(Debug)]
pub enum InVerdict {
    /// The handler claimed the message; optionally deregister it.
    Taken {
        /// Remove the handler from the queue after this message.
        remove_handler: bool,
    },
    /// Not this handler's message; hand it back and keep scanning.
    Ignored(Message),
}

/// What to do with a handler after a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Keep the handler registered.
    Keep,
    /// Deregister the handler.
    Remove,
}

/// A filter over the incoming side of a channel.
pub trait IncomingHandler: Send + Sync {
    /// Examine a freshly arrived message and claim it or hand it back.
    fn on_incoming(&self, msg: Message) -> InVerdict;

    /// React to a stream event.
    fn on_stream_event(
        &self,
        event: StreamEvent,
        stream_num: u16,
        status: XRootDStatus,
    ) -> HandlerAction;
}

/// An observer of the outgoing side: called around the physical write of a
/// queued message.
pub trait OutgoingHandler: Send + Sync {
    /// Last-chance mutation right before the bytes hit the socket.
    fn on_ready_to_send(&self, msg: &mut Message, stream_num: u16);

    /// The write completed (or failed) with `status`.
    fn on_status_ready(&self, msg: &Message, status: XRootDStatus);
}

/// One attempted endpoint of a request, annotated after its response.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// The endpoint URL.
    pub url: Url,
    /// Server flags reported by the channel.
    pub flags: u32,
    /// Protocol version reported by the channel.
    pub protocol: u32,
    /// Whether this host was promoted to load-balancer.
    pub load_balancer: bool,
}

impl HostInfo {
    /// A fresh, unannotated record.
    pub fn new(url: Url) -> Self {
        HostInfo {
            url,
            flags: 0,
            protocol: 0,
            load_balancer: false,
        }
    }
}

/// The ordered list of endpoints a request went through.
pub type HostList = Vec<HostInfo>;

/// Typed payload of a terminal response.
#[derive(Debug, Clone)]
pub enum Response {
    /// No body (mv, truncate, rm, mkdir, rmdir, chmod, ping, close,
    /// write, sync).
    None,
    /// Locations of a path.
    Locate(LocationInfo),
    /// Object statistics.
    Stat(StatInfo),
    /// Filesystem statistics.
    StatVfs(StatInfoVfs),
    /// Server protocol information.
    Protocol(ProtocolInfo),
    /// Directory listing.
    DirList(DirectoryList),
    /// Open result.
    Open(OpenInfo),
    /// Data read by `read`.
    Chunk(ChunkInfo),
    /// Data read by `readv`.
    VectorRead(VectorReadInfo),
    /// A redirect returned as the answer.
    Redirect(RedirectInfo),
    /// Undecoded body.
    Binary(BinaryData),
}

/// The caller-supplied continuation of a request.
pub trait ResponseHandler: Send + Sync {
    /// Invoked exactly once with the terminal outcome.
    fn handle(&self, status: XRootDStatus, response: Response, hosts: HostList);
}

/// Terminal outcome as a value, for the oneshot-backed adapter.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Terminal status.
    pub status: XRootDStatus,
    /// Typed payload.
    pub response: Response,
    /// Endpoints attempted, in order.
    pub hosts: HostList,
}

/// [`ResponseHandler`] adapter that resolves a oneshot; backs the async
/// facade methods.
#[derive(Debug)]
pub struct OneshotHandler {
    tx: Mutex<Option<oneshot::Sender<RequestOutcome>>>,
}

impl OneshotHandler {
    /// Create the handler and the receiving end.
    pub fn new() -> (std::sync::Arc<Self>, oneshot::Receiver<RequestOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            std::sync::Arc::new(OneshotHandler {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl ResponseHandler for OneshotHandler {
    fn handle(&self, status: XRootDStatus, response: Response, hosts: HostList) {
        if let Some(tx) = self.tx.lock().unwrap().take() {
            let _ = tx.send(RequestOutcome {
                status,
                response,
                hosts,
            });
        }
    }
}

/// Await the outcome of a oneshot-backed request.
pub async fn wait_outcome(rx: oneshot::Receiver<RequestOutcome>) -> RequestOutcome {
    match rx.await {
        Ok(outcome) => outcome,
        // The sender can only disappear if the runtime is being torn down
        // mid-request.
        Err(_) => RequestOutcome {
            status: XRootDStatus::fatal(crate::status::ErrorKind::Internal)
                .with_message("request abandoned"),
            response: Response::None,
            hosts: Vec::new(),
        },
    }
}
