//! One logical conduit to an endpoint: sub-stream sockets, their out
//! queues, the connect/reconnect procedure and the error recovery rules.
//!
//! All bookkeeping lives under one mutex that is never held across an
//! await; socket work happens on spawned reader/writer/connector tasks
//! that call back into the stream. Handlers are always invoked with the
//! stream lock released.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use xrd_proto::codec;
use xrd_proto::Message;

use crate::env::{defaults, Env};
use crate::handler::{OutgoingHandler, StreamEvent};
use crate::inqueue::InQueue;
use crate::outqueue::{OutMessage, OutQueue};
use crate::socket;
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::transport::{ChannelInfo, PathId, TransportHandler};
use crate::url::Url;

/// Connection policy knobs, read from the environment at stream creation.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Seconds one connection round may take.
    pub connection_window: Duration,
    /// Connection rounds before giving up.
    pub connection_retry: u32,
    /// Fast-fail window after a fatal stream error.
    pub stream_error_window: Duration,
}

impl StreamConfig {
    /// Read the knobs from `env`.
    pub fn from_env(env: &Env) -> Self {
        StreamConfig {
            connection_window: Duration::from_secs(
                env.get_int_or("ConnectionWindow", defaults::CONNECTION_WINDOW).max(1) as u64,
            ),
            connection_retry: env.get_int_or("ConnectionRetry", defaults::CONNECTION_RETRY).max(1)
                as u32,
            stream_error_window: Duration::from_secs(
                env.get_int_or("StreamErrorWindow", defaults::STREAM_ERROR_WINDOW).max(0) as u64,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubStatus {
    Disconnected,
    Connecting,
    Connected,
}

struct SubStream {
    status: SubStatus,
    out_queue: OutQueue,
    writer_notify: Arc<Notify>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
    last_activity: Instant,
}

impl SubStream {
    fn new() -> Self {
        SubStream {
            status: SubStatus::Disconnected,
            out_queue: OutQueue::new(),
            writer_notify: Arc::new(Notify::new()),
            reader_task: None,
            writer_task: None,
            last_activity: Instant::now(),
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
    }
}

struct StreamState {
    subs: Vec<SubStream>,
    last_stream_error: Option<Instant>,
    connection_count: u32,
    session_id: u64,
}

/// A stream: the main sub-stream plus any auxiliaries the transport asked
/// for after the first handshake.
pub struct Stream {
    url: Url,
    stream_num: u16,
    name: String,
    transport: Arc<dyn TransportHandler>,
    info: Arc<ChannelInfo>,
    in_queue: Arc<InQueue>,
    env: Arc<Env>,
    cfg: StreamConfig,
    state: Mutex<StreamState>,
}

impl Stream {
    /// Create a disconnected stream.
    pub fn new(
        url: Url,
        stream_num: u16,
        transport: Arc<dyn TransportHandler>,
        info: Arc<ChannelInfo>,
        in_queue: Arc<InQueue>,
        env: Arc<Env>,
    ) -> Arc<Self> {
        let cfg = StreamConfig::from_env(&env);
        let name = format!("{} #{}", url.host_id(), stream_num);
        Arc::new(Stream {
            url,
            stream_num,
            name,
            transport,
            info,
            in_queue,
            env,
            cfg,
            state: Mutex::new(StreamState {
                subs: vec![SubStream::new()],
                last_stream_error: None,
                connection_count: 0,
                session_id: 0,
            }),
        })
    }

    /// Current session id; bumped on every successful main-sub-stream
    /// connect.
    pub fn session_id(&self) -> u64 {
        self.state.lock().unwrap().session_id
    }

    /// Queue a message for sending.
    pub fn send(
        self: &Arc<Self>,
        msg: Message,
        handler: Arc<dyn OutgoingHandler>,
        stateful: bool,
        expires: Instant,
    ) -> XrdResult<()> {
        let mut st = self.state.lock().unwrap();

        // A message bound to a session can only travel on that session.
        if msg.session_id() != 0
            && (st.subs[0].status != SubStatus::Connected || st.session_id != msg.session_id())
        {
            return Err(XRootDStatus::error(ErrorKind::InvalidSession));
        }

        let mut path = self.transport.multiplex(&msg, &self.info, None);
        if path.up as usize >= st.subs.len() {
            tracing::warn!(target: "xrd::post", stream = %self.name, up = path.up,
                "unable to send through requested sub-stream, using 0 instead");
            path.up = 0;
        }
        if path.down as usize >= st.subs.len() {
            path.down = 0;
        }

        if let Err(status) = self.enable_link(&mut st, &mut path) {
            return Err(status.make_fatal());
        }

        // Second pass lets the transport stamp the message with the path
        // that was actually granted.
        let path = self.transport.multiplex(&msg, &self.info, Some(path));
        let up = (path.up as usize).min(st.subs.len() - 1);

        tracing::trace!(target: "xrd::post", stream = %self.name, msg = %msg.description(),
            up, down = path.down, "queueing message");
        st.subs[up].out_queue.push_back(OutMessage {
            msg,
            handler,
            expires,
            stateful,
        });
        st.subs[up].writer_notify.notify_one();
        Ok(())
    }

    /// Make sure a usable path to the endpoint exists, rewriting `path`
    /// to the main sub-stream where the requested one is unavailable.
    fn enable_link(self: &Arc<Self>, st: &mut StreamState, path: &mut PathId) -> XrdResult<()> {
        match st.subs[0].status {
            // The in-progress connect will bring up the auxiliaries too.
            SubStatus::Connecting => Ok(()),

            SubStatus::Connected => {
                if st.subs[path.down as usize].status != SubStatus::Connected {
                    path.down = 0;
                }
                match st.subs[path.up as usize].status {
                    SubStatus::Disconnected => {
                        path.up = 0;
                        st.subs[0].writer_notify.notify_one();
                        Ok(())
                    }
                    SubStatus::Connected => {
                        st.subs[path.up as usize].writer_notify.notify_one();
                        Ok(())
                    }
                    SubStatus::Connecting => Ok(()),
                }
            }

            SubStatus::Disconnected => {
                if let Some(last_error) = st.last_stream_error {
                    if last_error.elapsed() < self.cfg.stream_error_window {
                        return Err(XRootDStatus::fatal(ErrorKind::ConnectionError)
                            .with_message("within the stream error window"));
                    }
                }
                st.connection_count = 1;
                st.subs[0].status = SubStatus::Connecting;
                let stream = self.clone();
                tokio::spawn(async move { stream.run_connect(0).await });
                Ok(())
            }
        }
    }

    /// The connector task: walk the resolved addresses within the
    /// connection window, handshake, and retry whole rounds until the
    /// retry budget is spent.
    async fn run_connect(self: Arc<Self>, sub: u16) {
        loop {
            let round_start = Instant::now();
            let deadline = round_start + self.cfg.connection_window;

            let addresses = match socket::resolve(&self.url).await {
                Ok(addresses) => addresses,
                Err(status) => {
                    tracing::error!(target: "xrd::post", stream = %self.name,
                        "unable to resolve the host address");
                    self.connect_round_failed(sub, status.make_fatal());
                    return;
                }
            };

            for addr in addresses.into_iter().rev() {
                if Instant::now() >= deadline {
                    break;
                }
                let mut sock = match socket::connect(addr, deadline).await {
                    Ok(sock) => sock,
                    Err(status) => {
                        tracing::debug!(target: "xrd::post", stream = %self.name, %addr,
                            %status, "connect attempt failed");
                        continue;
                    }
                };
                match self
                    .transport
                    .handshake(&mut sock, &self.url, self.stream_num, sub, &self.info, &self.env)
                    .await
                {
                    Ok(()) => {
                        self.on_connected(sub, sock);
                        return;
                    }
                    Err(status) => {
                        tracing::warn!(target: "xrd::post", stream = %self.name, %addr,
                            %status, "handshake failed");
                        continue;
                    }
                }
            }

            let retries_left = {
                let st = self.state.lock().unwrap();
                st.connection_count < self.cfg.connection_retry
            };
            if !retries_left {
                self.connect_round_failed(
                    sub,
                    XRootDStatus::fatal(ErrorKind::ConnectionError)
                        .with_message("connection retries exhausted"),
                );
                return;
            }

            tracing::info!(target: "xrd::post", stream = %self.name,
                "attempting reconnection at the end of the connection window");
            tokio::time::sleep_until(deadline.into()).await;
            let mut st = self.state.lock().unwrap();
            st.connection_count += 1;
        }
    }

    fn connect_round_failed(self: &Arc<Self>, sub: u16, status: XRootDStatus) {
        if sub == 0 {
            let st = self.state.lock().unwrap();
            self.on_fatal_error(st, 0, status);
        } else {
            self.on_aux_connect_failed(sub);
        }
    }

    /// A sub-stream finished its handshake.
    fn on_connected(self: &Arc<Self>, sub: u16, sock: TcpStream) {
        let (read_half, write_half) = sock.into_split();
        let mut aux_to_connect = Vec::new();
        {
            let mut st = self.state.lock().unwrap();
            {
                let entry = &mut st.subs[sub as usize];
                entry.status = SubStatus::Connected;
                entry.last_activity = Instant::now();
                let notify = entry.writer_notify.clone();
                let stream = self.clone();
                entry.reader_task =
                    Some(tokio::spawn(async move { stream.reader_loop(sub, read_half).await }));
                let stream = self.clone();
                entry.writer_task = Some(tokio::spawn(async move {
                    stream.writer_loop(sub, write_half, notify).await
                }));
            }

            if sub == 0 {
                st.last_stream_error = None;
                st.connection_count = 0;
                st.session_id += 1;

                let want = self.transport.sub_stream_count(&self.info, &self.env) as usize;
                while st.subs.len() < want.max(1) {
                    st.subs.push(SubStream::new());
                }
                for index in 1..st.subs.len() {
                    if st.subs[index].status == SubStatus::Disconnected {
                        st.subs[index].status = SubStatus::Connecting;
                        aux_to_connect.push(index as u16);
                    }
                }
            }
            st.subs[sub as usize].writer_notify.notify_one();
        }

        tracing::debug!(target: "xrd::post", stream = %self.name, sub, "sub-stream connected");
        for index in aux_to_connect {
            let stream = self.clone();
            tokio::spawn(async move { stream.run_connect(index).await });
        }
    }

    /// An auxiliary sub-stream could not be brought up; its queued work
    /// moves to the main sub-stream.
    fn on_aux_connect_failed(self: &Arc<Self>, sub: u16) {
        let mut st = self.state.lock().unwrap();
        st.subs[sub as usize].status = SubStatus::Disconnected;
        st.subs[sub as usize].abort_tasks();
        let mut queue = std::mem::take(&mut st.subs[sub as usize].out_queue);
        st.subs[0].out_queue.grab_items(&mut queue);
        match st.subs[0].status {
            SubStatus::Connected => st.subs[0].writer_notify.notify_one(),
            SubStatus::Connecting => {}
            SubStatus::Disconnected => {
                self.on_fatal_error(
                    st,
                    sub,
                    XRootDStatus::fatal(ErrorKind::ConnectionError)
                        .with_message("auxiliary sub-stream connect failed"),
                );
            }
        }
    }

    async fn reader_loop(self: Arc<Self>, sub: u16, mut read_half: OwnedReadHalf) {
        loop {
            match codec::read_frame(&mut read_half).await {
                Ok(msg) => {
                    {
                        let mut st = self.state.lock().unwrap();
                        st.subs[sub as usize].last_activity = Instant::now();
                    }
                    self.on_incoming(sub, msg);
                }
                Err(err) => {
                    let kind = match &err {
                        xrd_proto::ProtoError::Io(io)
                            if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                        {
                            ErrorKind::SocketDisconnected
                        }
                        _ => ErrorKind::SocketError,
                    };
                    self.on_error(sub, XRootDStatus::error(kind).with_message(err.to_string()));
                    return;
                }
            }
        }
    }

    async fn writer_loop(
        self: Arc<Self>,
        sub: u16,
        mut write_half: OwnedWriteHalf,
        notify: Arc<Notify>,
    ) {
        loop {
            let item = {
                let mut st = self.state.lock().unwrap();
                let entry = &mut st.subs[sub as usize];
                if entry.status != SubStatus::Connected {
                    return;
                }
                entry.out_queue.pop_front()
            };
            let Some(mut item) = item else {
                notify.notified().await;
                continue;
            };

            item.handler.on_ready_to_send(&mut item.msg, self.stream_num);
            match codec::write_frame(&mut write_half, &item.msg).await {
                Ok(()) => {
                    tracing::trace!(target: "xrd::post", stream = %self.name, sub,
                        msg = %item.msg.description(), "message sent");
                    item.handler.on_status_ready(&item.msg, XRootDStatus::ok());
                }
                Err(err) => {
                    {
                        let mut st = self.state.lock().unwrap();
                        st.subs[sub as usize].out_queue.push_front(item);
                    }
                    self.on_error(
                        sub,
                        XRootDStatus::error(ErrorKind::SocketError).with_message(err.to_string()),
                    );
                    return;
                }
            }
        }
    }

    /// A frame arrived: stamp the session, give the transport a chance to
    /// consume it, otherwise queue it for the handlers.
    fn on_incoming(&self, _sub: u16, mut msg: Message) {
        let session_id = self.state.lock().unwrap().session_id;
        msg.set_session_id(session_id);
        if self.transport.highjack(&msg, &self.info) {
            return;
        }
        self.in_queue.add_message(msg);
    }

    /// A socket died. Recover what can be recovered, report what cannot.
    fn on_error(self: &Arc<Self>, sub: u16, status: XRootDStatus) {
        tracing::debug!(target: "xrd::post", stream = %self.name, sub, %status,
            "recovering stream error");
        let mut stateful = OutQueue::new();
        {
            let mut st = self.state.lock().unwrap();
            st.subs[sub as usize].abort_tasks();
            st.subs[sub as usize].status = SubStatus::Disconnected;

            if sub > 0 {
                // Peripheral stream: move pending work to the main
                // sub-stream if that is viable, otherwise give up on it.
                if st.subs[sub as usize].out_queue.is_empty() {
                    return;
                }
                if st.subs[0].status != SubStatus::Disconnected {
                    let mut queue = std::mem::take(&mut st.subs[sub as usize].out_queue);
                    st.subs[0].out_queue.grab_items(&mut queue);
                    if st.subs[0].status == SubStatus::Connected {
                        st.subs[0].writer_notify.notify_one();
                    }
                    return;
                }
                self.on_fatal_error(st, sub, status);
                return;
            }

            // The main sub-stream is gone, and the session with it.
            // Stateless work survives a reconnect; stateful work is bound
            // to the dead session and must be failed.
            let outstanding: usize = st.subs.iter().map(|s| s.out_queue.len_stateless()).sum();
            if outstanding > 0 {
                let mut path = PathId::default();
                if let Err(err) = self.enable_link(&mut st, &mut path) {
                    self.on_fatal_error(st, 0, err);
                    return;
                }
            }
            for entry in st.subs.iter_mut() {
                stateful.grab_stateful(&mut entry.out_queue);
            }
        }

        tracing::debug!(target: "xrd::post", stream = %self.name,
            "reporting disconnection to queued message handlers");
        stateful.report(&status);
        self.in_queue
            .report_stream_event(StreamEvent::Broken, self.stream_num, status);
    }

    /// No recovery possible: drain everything and tell everyone.
    fn on_fatal_error(
        self: &Arc<Self>,
        mut st: MutexGuard<'_, StreamState>,
        sub: u16,
        status: XRootDStatus,
    ) {
        st.subs[sub as usize].status = SubStatus::Disconnected;
        st.subs[sub as usize].abort_tasks();
        st.connection_count = 0;
        st.last_stream_error = Some(Instant::now());

        let mut drained = OutQueue::new();
        for entry in st.subs.iter_mut() {
            drained.grab_items(&mut entry.out_queue);
        }
        drop(st);

        let status = status.make_fatal();
        tracing::error!(target: "xrd::post", stream = %self.name, %status, "unable to recover");
        drained.report(&status);
        self.in_queue
            .report_stream_event(StreamEvent::FatalError, self.stream_num, status);
    }

    /// Expiration sweep, driven by the channel tick.
    pub fn tick(&self, now: Instant) {
        let mut expired = OutQueue::new();
        {
            let mut st = self.state.lock().unwrap();
            let subs = &mut st.subs;
            for (index, entry) in subs.iter_mut().enumerate() {
                expired.grab_expired(&mut entry.out_queue, now);
                if index > 0
                    && entry.status == SubStatus::Connected
                    && self.transport.is_stream_ttl_elapsed(
                        now.saturating_duration_since(entry.last_activity),
                        &self.info,
                        &self.env,
                    )
                {
                    tracing::debug!(target: "xrd::post", stream = %self.name, sub = index,
                        "closing idle sub-stream");
                    entry.abort_tasks();
                    entry.status = SubStatus::Disconnected;
                }
            }
        }
        expired.report(&XRootDStatus::error(ErrorKind::SocketTimeout));
        if self.stream_num == 0 {
            self.in_queue.report_timeout(now);
        }
    }

    /// Tear the stream down, failing anything still queued.
    pub fn shutdown(&self) {
        let mut drained = OutQueue::new();
        {
            let mut st = self.state.lock().unwrap();
            for entry in st.subs.iter_mut() {
                entry.abort_tasks();
                entry.status = SubStatus::Disconnected;
                drained.grab_items(&mut entry.out_queue);
            }
        }
        drained.report(
            &XRootDStatus::fatal(ErrorKind::ConnectionError).with_message("post master stopped"),
        );
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Ok(mut st) = self.state.lock() {
            for entry in st.subs.iter_mut() {
                entry.abort_tasks();
            }
        }
    }
}
