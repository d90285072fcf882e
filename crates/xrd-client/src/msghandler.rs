//! The per-request state machine.
//!
//! One handler instance shepherds exactly one logical request from the
//! first send through any sequence of redirects, waits, partial responses
//! and recoverable errors to exactly one terminal delivery. It observes
//! the outgoing side (to arm itself for the reply once the write lands)
//! and filters the incoming side of whichever channel the request is
//! currently travelling on.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use xrd_proto::constants::{attn, errcode, open_flags, stat_flags, status, RequestId};
use xrd_proto::info::{
    BinaryData, ChunkInfo, DirectoryList, LocationInfo, OpenInfo, ProtocolInfo, RedirectInfo,
    StatInfo, StatInfoVfs, VectorReadInfo,
};
use xrd_proto::request::{self, Chunk};
use xrd_proto::response;
use xrd_proto::Message;

use crate::handler::{
    HandlerAction, HostInfo, HostList, InVerdict, IncomingHandler, OutgoingHandler, Response,
    ResponseHandler, StreamEvent,
};
use crate::postmaster::PostMaster;
use crate::sid::SidManager;
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::url::Url;

const LOG: &str = "xrd::xmsg";

struct HandlerState {
    request: Message,
    response: Option<Message>,
    partials: Vec<Message>,
    response_handler: Option<Arc<dyn ResponseHandler>>,
    url: Url,
    sid_mgr: Arc<SidManager>,
    status: XRootDStatus,
    expiration: Instant,
    stateful: bool,
    redirect_as_answer: bool,
    redirect_counter: u32,
    redirect_cgi: String,
    load_balancer: Option<HostInfo>,
    hosts: HostList,
    chunks: Option<Vec<Chunk>>,
    has_session_id: bool,
    finished: bool,
}

/// Per-request message handler; see the module docs.
pub struct XRootDMsgHandler {
    me: Weak<XRootDMsgHandler>,
    post: Arc<PostMaster>,
    state: Mutex<HandlerState>,
}

/// Knobs for one request submission.
#[derive(Debug, Clone)]
pub struct SendParams {
    /// Time budget for the whole request, every retry included.
    pub timeout: Duration,
    /// Deliver the first redirect as a typed answer instead of following.
    pub redirect_as_answer: bool,
    /// Whether the request belongs to a session-bound exchange.
    pub stateful: bool,
    /// Chunk list for read/readv validation.
    pub chunks: Option<Vec<Chunk>>,
    /// Redirects allowed before giving up.
    pub redirect_limit: u32,
}

impl Default for SendParams {
    fn default() -> Self {
        SendParams {
            timeout: Duration::from_secs(crate::env::defaults::REQUEST_TIMEOUT as u64),
            redirect_as_answer: false,
            stateful: false,
            chunks: None,
            redirect_limit: 16,
        }
    }
}

impl XRootDMsgHandler {
    /// Create the handler for a marshalled request headed to `url`.
    pub fn new(
        post: Arc<PostMaster>,
        request: Message,
        url: Url,
        sid_mgr: Arc<SidManager>,
        response_handler: Arc<dyn ResponseHandler>,
        params: &SendParams,
    ) -> Arc<Self> {
        let has_session_id = request.session_id() != 0;
        Arc::new_cyclic(|me| XRootDMsgHandler {
            me: me.clone(),
            post,
            state: Mutex::new(HandlerState {
                request,
                response: None,
                partials: Vec::new(),
                response_handler: Some(response_handler),
                hosts: vec![HostInfo::new(url.clone())],
                url,
                sid_mgr,
                status: XRootDStatus::ok(),
                expiration: Instant::now() + params.timeout,
                stateful: params.stateful,
                redirect_as_answer: params.redirect_as_answer,
                redirect_counter: params.redirect_limit,
                redirect_cgi: String::new(),
                load_balancer: None,
                chunks: params.chunks.clone(),
                has_session_id,
                finished: false,
            }),
        })
    }

    /// Submit the request for the first time.
    pub fn send(self: &Arc<Self>) -> XrdResult<()> {
        let (url, msg, stateful, expiration) = {
            let st = self.state.lock().unwrap();
            (
                st.url.clone(),
                st.request.clone(),
                st.stateful,
                st.expiration,
            )
        };
        self.post
            .send(&url, msg, self.clone(), stateful, expiration)
    }

    fn arc(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    //--------------------------------------------------------------------
    // Incoming dispatch
    //--------------------------------------------------------------------

    fn process(&self, st: &mut MutexGuard<'_, HandlerState>, msg: Message) -> InVerdict {
        let rsp_status = msg.resp_status();

        // Asynchronous carrier: only asynresp with our stream id is of
        // interest; everything else is somebody else's business.
        if rsp_status == status::ATTN {
            if !matches!(response::attn_action(&msg), Ok(action) if action == attn::ASYNRESP) {
                return InVerdict::Ignored(msg);
            }
            let embedded = match response::attn_embedded(&msg) {
                Ok(embedded) => embedded,
                Err(_) => return InVerdict::Ignored(msg),
            };
            if embedded.resp_sid() != st.request.req_sid() {
                return InVerdict::Ignored(msg);
            }
            tracing::trace!(target: LOG, host = %st.url.host_id(),
                msg = %st.request.description(), "processing an async response");
            return self.process(st, embedded);
        }

        if msg.resp_sid() != st.request.req_sid() {
            return InVerdict::Ignored(msg);
        }

        // We got an answer; note who we were talking to.
        if let Ok(info) = self.post.query_transport(&st.url) {
            if let Some(last) = st.hosts.last_mut() {
                last.flags = info.server_flags();
                last.protocol = info.protocol_version();
            }
        }

        match rsp_status {
            status::OK => {
                tracing::trace!(target: LOG, host = %st.url.host_id(),
                    msg = %st.request.description(), "got an ok response");
                st.response = Some(msg);
                st.status = XRootDStatus::ok();
                self.handle_response(st);
                InVerdict::Taken { remove_handler: true }
            }

            status::ERROR => {
                let err = match response::error_body(&msg) {
                    Ok(err) => err,
                    Err(_) => {
                        st.status = XRootDStatus::error(ErrorKind::InvalidResponse);
                        self.handle_response(st);
                        return InVerdict::Taken { remove_handler: true };
                    }
                };
                tracing::trace!(target: LOG, host = %st.url.host_id(),
                    msg = %st.request.description(), code = err.code, text = %err.message,
                    "got an error response");
                st.response = Some(msg);
                self.handle_error(st, XRootDStatus::server_error(err.code, err.message));
                InVerdict::Taken { remove_handler: true }
            }

            status::REDIRECT => self.process_redirect(st, msg),

            status::WAIT => {
                let wait = match response::wait_body(&msg) {
                    Ok(wait) => wait,
                    Err(_) => {
                        st.status = XRootDStatus::error(ErrorKind::InvalidResponse);
                        self.handle_response(st);
                        return InVerdict::Taken { remove_handler: true };
                    }
                };
                tracing::trace!(target: LOG, host = %st.url.host_id(), seconds = wait.seconds,
                    msg = %st.request.description(), info = %wait.info, "got a wait response");

                // A locate/open retried after wait must not ask for fresh
                // data again.
                request::clear_refresh(&mut st.request);

                if let Some(me) = self.arc() {
                    let delay = Duration::from_secs(wait.seconds as u64);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        me.wait_done();
                    });
                }
                InVerdict::Taken { remove_handler: false }
            }

            status::WAITRESP => {
                let seconds = response::waitresp_seconds(&msg).unwrap_or(0);
                tracing::trace!(target: LOG, host = %st.url.host_id(), seconds,
                    msg = %st.request.description(),
                    "got a waitresp response, answer will arrive asynchronously");
                InVerdict::Taken { remove_handler: false }
            }

            status::OKSOFAR => {
                tracing::trace!(target: LOG, host = %st.url.host_id(),
                    msg = %st.request.description(), "got a partial response");
                st.partials.push(msg);
                InVerdict::Taken { remove_handler: false }
            }

            other => {
                tracing::debug!(target: LOG, host = %st.url.host_id(), status = other,
                    msg = %st.request.description(), "got an unrecognized response");
                st.status = XRootDStatus::error(ErrorKind::InvalidResponse);
                self.handle_response(st);
                InVerdict::Taken { remove_handler: true }
            }
        }
    }

    fn process_redirect(
        &self,
        st: &mut MutexGuard<'_, HandlerState>,
        msg: Message,
    ) -> InVerdict {
        let redirect = match response::redirect_body(&msg) {
            Ok(redirect) => redirect,
            Err(_) => {
                st.status = XRootDStatus::error(ErrorKind::InvalidResponse);
                self.handle_response(st);
                return InVerdict::Taken { remove_handler: true };
            }
        };
        tracing::trace!(target: LOG, host = %st.url.host_id(), target = %redirect.target,
            port = redirect.port, msg = %st.request.description(), "got a redirect response");

        if st.redirect_counter == 0 {
            tracing::debug!(target: LOG, host = %st.url.host_id(),
                msg = %st.request.description(), "redirect limit reached");
            st.status = XRootDStatus::fatal(ErrorKind::RedirectLimit);
            self.handle_response(st);
            return InVerdict::Taken { remove_handler: true };
        }
        st.redirect_counter -= 1;

        // A redirecting manager becomes the recovery point: a meta
        // manager supersedes a remembered load-balancer, a plain manager
        // only fills a vacancy.
        let last_flags = st.hosts.last().map(|h| h.flags).unwrap_or(0);
        if last_flags & xrd_proto::constants::server_flags::IS_MANAGER != 0 {
            let is_meta = last_flags & xrd_proto::constants::server_flags::ATTR_META != 0;
            if is_meta || st.load_balancer.is_none() {
                for host in st.hosts.iter_mut() {
                    host.load_balancer = false;
                }
                if let Some(last) = st.hosts.last_mut() {
                    last.load_balancer = true;
                }
                st.load_balancer = st.hosts.last().cloned();
                tracing::trace!(target: LOG, host = %st.url.host_id(),
                    msg = %st.request.description(), "assigned as load-balancer");
            }
        }

        let (host_part, cgi) = match redirect.target.split_once('?') {
            Some((host, cgi)) => (host, cgi.to_string()),
            None => (redirect.target.as_str(), String::new()),
        };
        let host_part = host_part.trim_end_matches('/');
        // Some servers embed the port in the host part; it wins over the
        // port field.
        let (host_part, embedded_port) = if host_part.starts_with('[') {
            (host_part, None)
        } else {
            match host_part.rsplit_once(':') {
                Some((host, port)) if !port.is_empty() => (host, port.parse::<u16>().ok()),
                _ => (host_part, None),
            }
        };
        let port = embedded_port.unwrap_or(if redirect.port > 0 {
            redirect.port as u16
        } else {
            st.url.port()
        });
        let new_url = match st.url.with_endpoint(host_part, port) {
            Ok(url) => url,
            Err(_) => {
                tracing::debug!(target: LOG, host = %st.url.host_id(),
                    target = %redirect.target, "got an invalid redirection URL");
                st.status = XRootDStatus::error(ErrorKind::InvalidRedirectUrl);
                self.handle_response(st);
                return InVerdict::Taken { remove_handler: true };
            }
        };
        st.url = new_url;
        st.redirect_cgi = cgi.clone();

        if st.redirect_as_answer {
            st.status = XRootDStatus::ok_with(ErrorKind::XrdRedirect);
            st.response = Some(msg);
            self.handle_response(st);
            return InVerdict::Taken { remove_handler: true };
        }

        if let Err(err) = self.rewrite_for_redirect(st, &cgi) {
            st.status = err;
            self.handle_response(st);
            return InVerdict::Taken { remove_handler: true };
        }

        let target = st.url.clone();
        if let Err(err) = self.retry_at_server(st, target) {
            self.handle_error(st, err);
        }
        InVerdict::Taken { remove_handler: true }
    }

    //--------------------------------------------------------------------
    // Rewrites
    //--------------------------------------------------------------------

    /// Swap the request onto the destination channel: release the old
    /// SID, allocate one from the new channel's manager, merge redirect
    /// CGI into the opaque tail.
    fn rewrite_for_redirect(
        &self,
        st: &mut MutexGuard<'_, HandlerState>,
        cgi: &str,
    ) -> XrdResult<()> {
        let old_sid = st.request.req_sid();
        st.sid_mgr.release(old_sid);

        let info = self.post.query_transport(&st.url)?;
        st.sid_mgr = info.sid_manager().clone();
        let sid = st.sid_mgr.allocate()?;
        st.request.set_req_sid(sid);

        if !cgi.is_empty() {
            let params: Vec<(String, String)> = cgi
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| match p.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (p.to_string(), String::new()),
                })
                .collect();
            request::append_cgi(&mut st.request, &params);
        }
        Ok(())
    }

    /// Record the current host in the `tried=` list, once per distinct
    /// host.
    fn update_tried_cgi(&self, st: &mut MutexGuard<'_, HandlerState>) {
        let host = st.url.host().to_string();
        let tried = match request::get_cgi_param(&st.request, "tried") {
            Some(existing) => {
                if existing.split(',').any(|h| h == host) {
                    existing
                } else {
                    format!("{existing},{host}")
                }
            }
            None => host,
        };
        request::set_cgi_param(&mut st.request, "tried", &tried);
    }

    /// Re-submit the request at `url`.
    fn retry_at_server(
        &self,
        st: &mut MutexGuard<'_, HandlerState>,
        url: Url,
    ) -> XrdResult<()> {
        let Some(me) = self.arc() else {
            return Err(XRootDStatus::fatal(ErrorKind::Internal));
        };
        st.url = url.clone();
        st.hosts.push(HostInfo::new(url.clone()));
        self.post
            .send(&url, st.request.clone(), me, st.stateful, st.expiration)
    }

    /// The wait interval elapsed; re-issue at the current URL.
    fn wait_done(&self) {
        let mut st = self.state.lock().unwrap();
        if st.finished {
            return;
        }
        let url = st.url.clone();
        if let Err(err) = self.retry_at_server(&mut st, url) {
            self.handle_error(&mut st, err);
        }
    }

    //--------------------------------------------------------------------
    // Error recovery
    //--------------------------------------------------------------------

    fn handle_error(&self, st: &mut MutexGuard<'_, HandlerState>, error: XRootDStatus) {
        if error.is_ok() {
            return;
        }
        tracing::debug!(target: LOG, host = %st.url.host_id(),
            msg = %st.request.description(), %error, "handling error");

        // Server error responses recover at the load-balancer, and only
        // for the retriable subset.
        if error.kind == ErrorKind::ErrorResponse {
            let recoverable = matches!(
                error.errno,
                errcode::FS_ERROR | errcode::IO_ERROR | errcode::SERVER_ERROR | errcode::NOT_FOUND
            );
            let lb = st
                .load_balancer
                .as_ref()
                .filter(|lb| lb.url.host_id() != st.url.host_id())
                .map(|lb| lb.url.clone());
            if let (true, Some(lb_url)) = (recoverable, lb) {
                self.update_tried_cgi(st);
                if error.errno == errcode::NOT_FOUND {
                    request::set_refresh(&mut st.request);
                }
                st.response = None;
                if let Err(err) = self.retry_at_server(st, lb_url) {
                    st.status = err;
                    self.handle_response(st);
                }
                return;
            }
            st.status = error;
            self.handle_response(st);
            return;
        }

        // Nothing to be done for expired requests, session-bound
        // requests, or anything past its deadline.
        if error.kind == ErrorKind::OperationExpired
            || st.has_session_id
            || Instant::now() >= st.expiration
        {
            tracing::debug!(target: LOG, host = %st.url.host_id(),
                msg = %st.request.description(), "unable to get the response");
            st.status = error;
            self.handle_response(st);
            return;
        }

        // Transport-level trouble: prefer the load-balancer, else retry
        // in place while the error is not fatal.
        let lb = st
            .load_balancer
            .as_ref()
            .filter(|lb| lb.url.host_id() != st.url.host_id())
            .map(|lb| lb.url.clone());
        if let Some(lb_url) = lb {
            self.update_tried_cgi(st);
            if let Err(err) = self.retry_at_server(st, lb_url) {
                st.status = err;
                self.handle_response(st);
            }
            return;
        }
        if !error.is_fatal() {
            let url = st.url.clone();
            if let Err(err) = self.retry_at_server(st, url) {
                st.status = err;
                self.handle_response(st);
            }
            return;
        }
        st.status = error;
        self.handle_response(st);
    }

    //--------------------------------------------------------------------
    // Terminal delivery
    //--------------------------------------------------------------------

    fn handle_response(&self, st: &mut MutexGuard<'_, HandlerState>) {
        if st.finished {
            return;
        }
        st.finished = true;

        let mut terminal = st.status.clone();
        let mut payload = Response::None;
        if terminal.is_ok() {
            match self.parse_response(st) {
                Ok(parsed) => payload = parsed,
                Err(err) => {
                    terminal = err;
                    payload = Response::None;
                }
            }
        }

        // An expired request's SID is quarantined: a straggling answer
        // must not be matched to a future request.
        let sid = st.request.req_sid();
        if !terminal.is_ok() && terminal.kind == ErrorKind::OperationExpired {
            st.sid_mgr.time_out(sid);
        } else {
            st.sid_mgr.release(sid);
        }

        let hosts = std::mem::take(&mut st.hosts);
        if let Some(handler) = st.response_handler.take() {
            handler.handle(terminal, payload, hosts);
        }
    }

    fn assembled_body(&self, st: &HandlerState) -> Vec<u8> {
        let final_body = st.response.as_ref().map(|m| m.resp_body()).unwrap_or(&[]);
        if st.partials.is_empty() {
            return final_body.to_vec();
        }
        let total: usize =
            st.partials.iter().map(|p| p.resp_body().len()).sum::<usize>() + final_body.len();
        let mut body = Vec::with_capacity(total);
        for partial in &st.partials {
            body.extend_from_slice(partial.resp_body());
        }
        body.extend_from_slice(final_body);
        body
    }

    fn parse_response(&self, st: &mut MutexGuard<'_, HandlerState>) -> Result<Response, XRootDStatus> {
        // A redirect returned as the answer has no body to decode.
        if st.status.kind == ErrorKind::XrdRedirect {
            return Ok(Response::Redirect(RedirectInfo {
                host: st.url.host().to_string(),
                port: st.url.port() as i32,
                cgi: st.redirect_cgi.clone(),
            }));
        }

        let invalid = |what: &str| {
            XRootDStatus::error(ErrorKind::InvalidResponse).with_message(what.to_string())
        };
        let body = self.assembled_body(st);
        let request_id = RequestId::from_u16(st.request.req_id());

        match request_id {
            Some(
                RequestId::Mv
                | RequestId::Truncate
                | RequestId::Rm
                | RequestId::Mkdir
                | RequestId::Rmdir
                | RequestId::Chmod
                | RequestId::Ping
                | RequestId::Close
                | RequestId::Write
                | RequestId::Sync,
            ) => Ok(Response::None),

            Some(RequestId::Locate) => LocationInfo::parse(&body)
                .map(Response::Locate)
                .map_err(|err| invalid(&err.to_string())),

            Some(RequestId::Stat) => {
                if st.request.bytes()[4] & stat_flags::VFS != 0 {
                    StatInfoVfs::parse(&body)
                        .map(Response::StatVfs)
                        .map_err(|err| invalid(&err.to_string()))
                } else {
                    StatInfo::parse(&body)
                        .map(Response::Stat)
                        .map_err(|err| invalid(&err.to_string()))
                }
            }

            Some(RequestId::Protocol) => {
                if body.len() < 8 {
                    return Err(invalid("protocol body too short"));
                }
                Ok(Response::Protocol(ProtocolInfo {
                    version: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                    host_info: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                }))
            }

            Some(RequestId::Dirlist) => {
                let payload = String::from_utf8_lossy(st.request.req_payload());
                let parent = payload.split('?').next().unwrap_or("").to_string();
                DirectoryList::parse(&st.url.host_id(), &parent, &body)
                    .map(Response::DirList)
                    .map_err(|err| invalid(&err.to_string()))
            }

            Some(RequestId::Open) => {
                let options =
                    u16::from_be_bytes([st.request.bytes()[6], st.request.bytes()[7]]);
                let session_id = st
                    .response
                    .as_ref()
                    .map(|m| m.session_id())
                    .unwrap_or_default();
                OpenInfo::parse(&body, session_id, options & open_flags::RETSTAT != 0)
                    .map(Response::Open)
                    .map_err(|err| invalid(&err.to_string()))
            }

            Some(RequestId::Read) => {
                let chunk = st
                    .chunks
                    .as_ref()
                    .and_then(|chunks| chunks.first().copied())
                    .ok_or_else(|| invalid("read response without a chunk list"))?;
                if (chunk.length as usize) < body.len() {
                    tracing::debug!(target: LOG, host = %st.url.host_id(),
                        wanted = chunk.length, got = body.len(),
                        "buffer too small for the read response");
                    return Err(invalid("more data than the supplied buffer holds"));
                }
                Ok(Response::Chunk(ChunkInfo {
                    offset: chunk.offset,
                    length: body.len() as u32,
                    data: body,
                }))
            }

            Some(RequestId::Readv) => {
                let requested = st
                    .chunks
                    .as_ref()
                    .ok_or_else(|| invalid("readv response without a chunk list"))?;
                let mut info = VectorReadInfo::default();
                let mut index = 0usize;
                for record in response::readv_records(&body) {
                    let record = record.map_err(|err| invalid(&err.to_string()))?;
                    let Some(expected) = requested.get(index) else {
                        tracing::debug!(target: LOG, host = %st.url.host_id(),
                            "server responded with more chunks than asked for");
                        return Err(XRootDStatus::fatal(ErrorKind::InvalidResponse)
                            .with_message("excess readv chunks"));
                    };
                    if record.rlen != expected.length || record.offset != expected.offset {
                        tracing::debug!(target: LOG, host = %st.url.host_id(),
                            got_offset = record.offset, got_len = record.rlen,
                            want_offset = expected.offset, want_len = expected.length,
                            "response chunk does not match the requested one");
                        return Err(XRootDStatus::fatal(ErrorKind::InvalidResponse)
                            .with_message("readv chunk mismatch"));
                    }
                    info.size += record.rlen;
                    info.chunks.push(ChunkInfo {
                        offset: record.offset,
                        length: record.rlen,
                        data: record.data.to_vec(),
                    });
                    index += 1;
                }
                Ok(Response::VectorRead(info))
            }

            // query, set, prepare and anything else: opaque pass-through
            _ => Ok(Response::Binary(BinaryData { data: body })),
        }
    }
}

impl IncomingHandler for XRootDMsgHandler {
    fn on_incoming(&self, msg: Message) -> InVerdict {
        let mut st = self.state.lock().unwrap();
        if st.finished {
            return InVerdict::Ignored(msg);
        }
        self.process(&mut st, msg)
    }

    fn on_stream_event(
        &self,
        event: StreamEvent,
        stream_num: u16,
        status: XRootDStatus,
    ) -> HandlerAction {
        if event == StreamEvent::Ready || stream_num != 0 {
            return HandlerAction::Keep;
        }
        let mut st = self.state.lock().unwrap();
        if st.finished {
            return HandlerAction::Remove;
        }
        tracing::trace!(target: LOG, host = %st.url.host_id(),
            msg = %st.request.description(), ?event, "stream event reported");
        self.handle_error(&mut st, status);
        HandlerAction::Remove
    }
}

impl OutgoingHandler for XRootDMsgHandler {
    fn on_ready_to_send(&self, _msg: &mut Message, _stream_num: u16) {}

    fn on_status_ready(&self, msg: &Message, status: XRootDStatus) {
        if status.is_ok() {
            let (url, expiration, finished) = {
                let st = self.state.lock().unwrap();
                (st.url.clone(), st.expiration, st.finished)
            };
            if finished {
                return;
            }
            tracing::trace!(target: LOG, host = %url.host_id(), msg = %msg.description(),
                "message successfully sent, arming for the response");
            if let Some(me) = self.arc() {
                if let Err(err) = self.post.receive(&url, me, expiration) {
                    let mut st = self.state.lock().unwrap();
                    self.handle_error(&mut st, err);
                }
            }
            return;
        }

        tracing::debug!(target: LOG, msg = %msg.description(), %status,
            "unable to send the message, trying to recover");
        let mut st = self.state.lock().unwrap();
        if !st.finished {
            self.handle_error(&mut st, status);
        }
    }
}
