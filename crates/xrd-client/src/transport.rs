//! Channel-scoped protocol policy: the handshake driver, transport
//! queries, sub-stream multiplexing and frame highjacking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use xrd_proto::codec;
use xrd_proto::constants::{self, server_flags, status};
use xrd_proto::handshake::{self, AuthHandler, HandShakeData, NoAuth};
use xrd_proto::response;
use xrd_proto::Message;

use crate::env::Env;
use crate::sid::SidManager;
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::url::Url;

/// Which sub-stream a message goes out on and which one its reply is
/// expected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathId {
    /// Sub-stream to write on.
    pub up: u16,
    /// Sub-stream the reply arrives on.
    pub down: u16,
}

/// Per-channel transport state: the SID allocator and what the endpoint
/// told us about itself.
#[derive(Debug)]
pub struct ChannelInfo {
    sid_manager: std::sync::Arc<SidManager>,
    server_flags: AtomicU32,
    protocol_version: AtomicU32,
    session_token: Mutex<[u8; 16]>,
}

impl Default for ChannelInfo {
    fn default() -> Self {
        ChannelInfo {
            sid_manager: std::sync::Arc::new(SidManager::new()),
            server_flags: AtomicU32::new(0),
            protocol_version: AtomicU32::new(0),
            session_token: Mutex::new([0; 16]),
        }
    }
}

impl ChannelInfo {
    /// This channel's SID allocator.
    pub fn sid_manager(&self) -> &std::sync::Arc<SidManager> {
        &self.sid_manager
    }

    /// Server role and attribute flags from the last handshake.
    pub fn server_flags(&self) -> u32 {
        self.server_flags.load(Ordering::Acquire)
    }

    /// Protocol version of the endpoint.
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version.load(Ordering::Acquire)
    }

    /// Whether the endpoint is a manager.
    pub fn is_manager(&self) -> bool {
        self.server_flags() & server_flags::IS_MANAGER != 0
    }

    /// The 16-byte login token of the current session.
    pub fn session_token(&self) -> [u8; 16] {
        *self.session_token.lock().unwrap()
    }
}

/// The policy interface a channel consults about its endpoint.
#[async_trait]
pub trait TransportHandler: Send + Sync + 'static {
    /// Transport name for logging and queries.
    fn name(&self) -> &'static str;

    /// Drive the connection establishment exchange on a fresh socket.
    async fn handshake(
        &self,
        socket: &mut TcpStream,
        url: &Url,
        stream_num: u16,
        sub_stream: u16,
        info: &ChannelInfo,
        env: &Env,
    ) -> XrdResult<()>;

    /// Pick the sub-stream pair for a message. A `hint` pins the answer
    /// path and lets the transport stamp the message accordingly.
    fn multiplex(&self, msg: &Message, info: &ChannelInfo, hint: Option<PathId>) -> PathId;

    /// Streams to maintain per channel.
    fn stream_count(&self, env: &Env) -> u16;

    /// Sub-streams to maintain per stream once connected.
    fn sub_stream_count(&self, info: &ChannelInfo, env: &Env) -> u16;

    /// Whether an idle sub-stream has outlived its keep-alive window.
    fn is_stream_ttl_elapsed(&self, idle: Duration, info: &ChannelInfo, env: &Env) -> bool;

    /// Offer an inbound frame to the transport; `true` means it was
    /// consumed internally and must not reach user handlers.
    fn highjack(&self, msg: &Message, info: &ChannelInfo) -> bool;

    /// The identity negotiated with the endpoint.
    fn auth(&self, info: &ChannelInfo) -> String;
}

/// The XRootD transport.
pub struct XRootDTransport {
    auth_handler: Box<dyn AuthHandler>,
}

impl Default for XRootDTransport {
    fn default() -> Self {
        XRootDTransport {
            auth_handler: Box::new(NoAuth),
        }
    }
}

impl XRootDTransport {
    /// A transport with the default no-op authentication hook.
    pub fn new() -> Self {
        XRootDTransport::default()
    }

    /// A transport continuing the handshake with `auth_handler`.
    pub fn with_auth(auth_handler: Box<dyn AuthHandler>) -> Self {
        XRootDTransport { auth_handler }
    }

    async fn read_frame_bounded(
        socket: &mut TcpStream,
        window: Duration,
        what: &'static str,
    ) -> XrdResult<Message> {
        match tokio::time::timeout(window, codec::read_frame(socket)).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(err)) => Err(XRootDStatus::fatal(ErrorKind::HandshakeFailed)
                .with_message(format!("{what}: {err}"))),
            Err(_) => Err(XRootDStatus::fatal(ErrorKind::SocketTimeout).with_message(what)),
        }
    }
}

#[async_trait]
impl TransportHandler for XRootDTransport {
    fn name(&self) -> &'static str {
        "XRootD"
    }

    async fn handshake(
        &self,
        socket: &mut TcpStream,
        url: &Url,
        stream_num: u16,
        sub_stream: u16,
        info: &ChannelInfo,
        env: &Env,
    ) -> XrdResult<()> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let window = Duration::from_secs(
            env.get_int_or("RequestTimeout", crate::env::defaults::REQUEST_TIMEOUT) as u64,
        );
        let host_id = url.host_id();
        tracing::debug!(target: "xrd::post", host = %host_id, stream_num, sub_stream,
            "attempting handshake");

        // Client hello with the piggy-backed protocol request.
        let hello = handshake::client_hello(constants::PROTOCOL_VERSION);
        socket.write_all(&hello).await.map_err(|err| {
            XRootDStatus::fatal(ErrorKind::HandshakeFailed).with_message(err.to_string())
        })?;

        let mut server_hello = [0u8; handshake::SERVER_HELLO_LEN];
        match tokio::time::timeout(window, socket.read_exact(&mut server_hello)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return Err(XRootDStatus::fatal(ErrorKind::HandshakeFailed)
                    .with_message(format!("server hello: {err}")))
            }
            Err(_) => {
                return Err(XRootDStatus::fatal(ErrorKind::SocketTimeout)
                    .with_message("server hello"))
            }
        }
        let hello = handshake::parse_server_hello(&server_hello).map_err(|err| {
            XRootDStatus::fatal(ErrorKind::HandshakeFailed).with_message(err.to_string())
        })?;

        info.protocol_version
            .store(hello.protocol_version, Ordering::Release);
        let initial_flags = if hello.server_type == constants::handshake::DATA_SERVER {
            server_flags::IS_SERVER
        } else {
            server_flags::IS_MANAGER
        };
        info.server_flags.store(initial_flags, Ordering::Release);

        // The protocol response refines the role flags on servers new
        // enough to report them.
        let proto_resp = Self::read_frame_bounded(socket, window, "protocol response").await?;
        if proto_resp.resp_status() != status::OK {
            return Err(XRootDStatus::fatal(ErrorKind::HandshakeFailed)
                .with_message("protocol request rejected"));
        }
        let proto = response::protocol_body(&proto_resp).map_err(|err| {
            XRootDStatus::fatal(ErrorKind::HandshakeFailed).with_message(err.to_string())
        })?;
        if proto.version >= 0x297 {
            info.server_flags.store(proto.flags, Ordering::Release);
        }

        // Log in.
        let login = handshake::login(std::process::id(), url.username());
        codec::write_frame(socket, &login).await.map_err(|err| {
            XRootDStatus::fatal(ErrorKind::LoginFailed).with_message(err.to_string())
        })?;
        let login_resp = Self::read_frame_bounded(socket, window, "login response").await?;
        if login_resp.resp_status() != status::OK {
            return Err(XRootDStatus::fatal(ErrorKind::LoginFailed)
                .with_message("login rejected"));
        }
        let token = response::login_session(&login_resp).map_err(|err| {
            XRootDStatus::fatal(ErrorKind::LoginFailed).with_message(err.to_string())
        })?;
        *info.session_token.lock().unwrap() = token;

        // Pluggable continuation of the exchange.
        let mut data = HandShakeData {
            step: 0,
            inbound: None,
            host_id: host_id.clone(),
            stream_id: stream_num,
            sub_stream_id: sub_stream,
            client_name: url.username().to_string(),
        };
        loop {
            let out = self.auth_handler.next(&mut data).map_err(|err| {
                XRootDStatus::fatal(ErrorKind::HandshakeFailed).with_message(err.to_string())
            })?;
            let Some(out) = out else { break };
            codec::write_frame(socket, &out).await.map_err(|err| {
                XRootDStatus::fatal(ErrorKind::HandshakeFailed).with_message(err.to_string())
            })?;
            let inbound = Self::read_frame_bounded(socket, window, "auth response").await?;
            data.inbound = Some(inbound);
            data.step += 1;
        }

        tracing::debug!(target: "xrd::post", host = %host_id, stream_num, sub_stream,
            flags = info.server_flags(), protocol = format_args!("{:#x}", info.protocol_version()),
            "handshake successful");
        Ok(())
    }

    fn multiplex(&self, _msg: &Message, _info: &ChannelInfo, hint: Option<PathId>) -> PathId {
        hint.unwrap_or_default()
    }

    fn stream_count(&self, env: &Env) -> u16 {
        env.get_int_or(
            "StreamsPerChannel",
            crate::env::defaults::STREAMS_PER_CHANNEL,
        )
        .max(1) as u16
    }

    fn sub_stream_count(&self, _info: &ChannelInfo, _env: &Env) -> u16 {
        1
    }

    fn is_stream_ttl_elapsed(&self, idle: Duration, info: &ChannelInfo, env: &Env) -> bool {
        let ttl = if info.server_flags() & server_flags::IS_SERVER != 0 {
            env.get_int_or("DataServerTTL", crate::env::defaults::DATA_SERVER_TTL)
        } else {
            env.get_int_or("ManagerTTL", crate::env::defaults::MANAGER_TTL)
        };
        idle >= Duration::from_secs(ttl.max(0) as u64)
    }

    fn highjack(&self, msg: &Message, info: &ChannelInfo) -> bool {
        if msg.len() < 8 {
            return false;
        }

        // A straggling answer to a request that already expired lifts the
        // quarantine on its stream id and goes no further.
        let sid = msg.resp_sid();
        if info.sid_manager().is_timed_out(sid) {
            tracing::debug!(target: "xrd::post", sid,
                "consuming a late response to an expired request");
            info.sid_manager().release(sid);
            return true;
        }

        if msg.len() < 12 || msg.resp_status() != status::ATTN {
            return false;
        }
        match response::attn_action(msg) {
            // asynresp carries a response for a registered handler and
            // must surface
            Ok(constants::attn::ASYNRESP) => false,
            Ok(constants::attn::ASYNCMS) => {
                let text = String::from_utf8_lossy(&msg.resp_body()[4..]).into_owned();
                tracing::info!(target: "xrd::post", notice = %text, "server notice");
                true
            }
            Ok(action) => {
                tracing::debug!(target: "xrd::post", action, "consuming unsupported async event");
                true
            }
            Err(_) => true,
        }
    }

    fn auth(&self, _info: &ChannelInfo) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attn(action: u32, tail: &[u8]) -> Message {
        let mut body = (action as i32).to_be_bytes().to_vec();
        body.extend_from_slice(tail);
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&status::ATTN.to_be_bytes());
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(&body);
        Message::from_bytes(data)
    }

    #[test]
    fn highjack_consumes_notices_but_not_asynresp() {
        let transport = XRootDTransport::new();
        let info = ChannelInfo::default();
        assert!(transport.highjack(&attn(constants::attn::ASYNCMS, b"maintenance"), &info));
        assert!(!transport.highjack(&attn(constants::attn::ASYNRESP, &[0u8; 12]), &info));

        let mut ok = Message::new(8);
        ok.bytes_mut()[2..4].copy_from_slice(&status::OK.to_be_bytes());
        assert!(!transport.highjack(&ok, &info));
    }

    #[test]
    fn ttl_uses_the_role_specific_window() {
        let transport = XRootDTransport::new();
        let env = Env::with_defaults();
        let info = ChannelInfo::default();

        info.server_flags
            .store(server_flags::IS_SERVER, Ordering::Release);
        assert!(transport.is_stream_ttl_elapsed(Duration::from_secs(301), &info, &env));
        assert!(!transport.is_stream_ttl_elapsed(Duration::from_secs(299), &info, &env));

        info.server_flags
            .store(server_flags::IS_MANAGER, Ordering::Release);
        assert!(!transport.is_stream_ttl_elapsed(Duration::from_secs(301), &info, &env));
        assert!(transport.is_stream_ttl_elapsed(Duration::from_secs(1201), &info, &env));
    }
}
