//! A channel: the connection group serving one `(scheme, host, port)`
//! endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use xrd_proto::Message;

use crate::env::{defaults, Env};
use crate::handler::{IncomingHandler, OutgoingHandler};
use crate::inqueue::InQueue;
use crate::status::XrdResult;
use crate::stream::Stream;
use crate::transport::{ChannelInfo, TransportHandler};
use crate::url::Url;

/// Owns the streams, the incoming queue and the channel-scoped transport
/// state for one endpoint, plus the tick task that expires stale work.
pub struct Channel {
    url: Url,
    info: Arc<ChannelInfo>,
    streams: Vec<Arc<Stream>>,
    in_queue: Arc<InQueue>,
    tick_task: JoinHandle<()>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("url", &self.url).finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel and arm its tick generator.
    pub fn new(url: Url, transport: Arc<dyn TransportHandler>, env: Arc<Env>) -> Arc<Self> {
        let info = Arc::new(ChannelInfo::default());
        let in_queue = Arc::new(InQueue::new());

        let stream_count = transport.stream_count(&env).max(1);
        tracing::debug!(target: "xrd::post", host = %url.host_id(), streams = stream_count,
            "creating new channel");

        let mut streams = Vec::with_capacity(stream_count as usize);
        for stream_num in 0..stream_count {
            streams.push(Stream::new(
                url.clone(),
                stream_num,
                transport.clone(),
                info.clone(),
                in_queue.clone(),
                env.clone(),
            ));
        }

        let resolution = Duration::from_secs(
            env.get_int_or("TimeoutResolution", defaults::TIMEOUT_RESOLUTION).max(1) as u64,
        );
        let tick_streams = streams.clone();
        let tick_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(resolution);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now = Instant::now();
                for stream in &tick_streams {
                    stream.tick(now);
                }
            }
        });

        Arc::new(Channel {
            url,
            info,
            streams,
            in_queue,
            tick_task,
        })
    }

    /// The endpoint this channel serves.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Channel-scoped transport state (SID manager, server flags,
    /// protocol version, session token).
    pub fn info(&self) -> &Arc<ChannelInfo> {
        &self.info
    }

    /// Queue a message on the stream the transport picks.
    pub fn send(
        &self,
        msg: Message,
        handler: Arc<dyn OutgoingHandler>,
        stateful: bool,
        expires: Instant,
    ) -> XrdResult<()> {
        self.streams[0].send(msg, handler, stateful, expires)
    }

    /// Register an incoming handler on this channel's queue.
    pub fn receive(&self, handler: Arc<dyn IncomingHandler>, expires: Instant) {
        self.in_queue.add_handler(handler, expires);
    }

    /// Deregister an incoming handler.
    pub fn remove_handler(&self, handler: &Arc<dyn IncomingHandler>) {
        self.in_queue.remove_handler(handler);
    }

    /// Current session id of the main stream.
    pub fn session_id(&self) -> u64 {
        self.streams[0].session_id()
    }

    /// Tear down the channel's streams and stop the tick generator.
    pub fn shutdown(&self) {
        self.tick_task.abort();
        for stream in &self.streams {
            stream.shutdown();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.tick_task.abort();
    }
}
