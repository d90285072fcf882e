//! The post master: the process-wide directory of channels and the
//! public send/receive/query surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use xrd_proto::Message;

use crate::channel::Channel;
use crate::env::Env;
use crate::handler::{IncomingHandler, OutgoingHandler};
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::transport::{ChannelInfo, TransportHandler, XRootDTransport};
use crate::url::Url;

static GLOBAL: OnceLock<Arc<PostMaster>> = OnceLock::new();

/// Directory of channels keyed by `(scheme, host, port)`, instantiated
/// lazily on first use. Every collaborator (environment, transport) is
/// explicit, so tests can run against their own instance.
pub struct PostMaster {
    env: Arc<Env>,
    transport: Arc<dyn TransportHandler>,
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    running: AtomicBool,
}

impl PostMaster {
    /// A post master over the given environment and the stock XRootD
    /// transport, already started.
    pub fn new(env: Arc<Env>) -> Arc<Self> {
        Self::with_transport(env, Arc::new(XRootDTransport::new()))
    }

    /// A post master with an explicit transport (tests install doubles
    /// here).
    pub fn with_transport(env: Arc<Env>, transport: Arc<dyn TransportHandler>) -> Arc<Self> {
        Arc::new(PostMaster {
            env,
            transport,
            channels: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        })
    }

    /// The process-wide instance, created on first use from the default
    /// environment.
    pub fn global() -> Arc<Self> {
        GLOBAL
            .get_or_init(|| PostMaster::new(Arc::new(Env::with_defaults())))
            .clone()
    }

    /// The environment this post master reads its tunables from.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    /// Accept new work.
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stop accepting work and tear down every channel.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let channels: Vec<Arc<Channel>> = {
            let mut map = self.channels.lock().unwrap();
            map.drain().map(|(_, channel)| channel).collect()
        };
        for channel in channels {
            channel.shutdown();
        }
    }

    /// The channel serving `url`'s endpoint, created on first use.
    pub fn channel(&self, url: &Url) -> XrdResult<Arc<Channel>> {
        if !self.running.load(Ordering::Acquire) {
            return Err(XRootDStatus::error(ErrorKind::Uninitialized)
                .with_message("post master is not running"));
        }
        let key = format!("{}://{}", url.scheme(), url.host_id());
        let mut map = self.channels.lock().unwrap();
        if let Some(channel) = map.get(&key) {
            return Ok(channel.clone());
        }
        let endpoint = url.with_endpoint(url.host(), url.port())?;
        let channel = Channel::new(endpoint, self.transport.clone(), self.env.clone());
        map.insert(key, channel.clone());
        Ok(channel)
    }

    /// Queue `msg` towards `url`'s endpoint.
    pub fn send(
        &self,
        url: &Url,
        msg: Message,
        handler: Arc<dyn OutgoingHandler>,
        stateful: bool,
        expires: Instant,
    ) -> XrdResult<()> {
        self.channel(url)?.send(msg, handler, stateful, expires)
    }

    /// Arm `handler` for messages arriving from `url`'s endpoint.
    pub fn receive(
        &self,
        url: &Url,
        handler: Arc<dyn IncomingHandler>,
        expires: Instant,
    ) -> XrdResult<()> {
        self.channel(url)?.receive(handler, expires);
        Ok(())
    }

    /// Channel-scoped transport state for `url`'s endpoint.
    pub fn query_transport(&self, url: &Url) -> XrdResult<Arc<ChannelInfo>> {
        Ok(self.channel(url)?.info().clone())
    }

    /// Session id of the main stream towards `url`'s endpoint.
    pub fn session_id(&self, url: &Url) -> XrdResult<u64> {
        Ok(self.channel(url)?.session_id())
    }
}

impl Drop for PostMaster {
    fn drop(&mut self) {
        self.stop();
    }
}
