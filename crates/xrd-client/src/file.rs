//! The stateful file layer: remembers where a file was opened, pins
//! handle-bound requests to that session, and tracks the open/close state
//! machine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use xrd_proto::constants::open_flags;
use xrd_proto::info::{ChunkInfo, StatInfo, VectorReadInfo};
use xrd_proto::request::{self, Chunk};
use xrd_proto::Message;

use crate::dispatch;
use crate::env::defaults;
use crate::handler::Response;
use crate::msghandler::SendParams;
use crate::postmaster::PostMaster;
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::url::Url;

const LOG: &str = "xrd::file";

/// Lifecycle state of a [`File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No file is open.
    Closed,
    /// The file is open; the handle is valid.
    Opened,
    /// A previous operation left the file unusable.
    Error,
    /// An open is in flight.
    OpenInProgress,
    /// A close is in flight.
    CloseInProgress,
}

struct FileState {
    status: FileStatus,
    last_status: XRootDStatus,
    stat_info: Option<StatInfo>,
    file_url: Option<Url>,
    data_server: Option<Url>,
    load_balancer: Option<Url>,
    file_handle: [u8; 4],
    session_id: u64,
}

/// A remote file. All handle-bound operations travel to the data server
/// the open landed on, pinned to the session the open established; losing
/// that session surfaces as `InvalidSession`.
pub struct File {
    post: Arc<PostMaster>,
    timeout: Duration,
    state: Mutex<FileState>,
}

impl Default for File {
    fn default() -> Self {
        File::new(PostMaster::global())
    }
}

impl File {
    /// A file object over an explicit post master.
    pub fn new(post: Arc<PostMaster>) -> Self {
        let timeout = Duration::from_secs(
            post.env().get_int_or("RequestTimeout", defaults::REQUEST_TIMEOUT).max(1) as u64,
        );
        File {
            post,
            timeout,
            state: Mutex::new(FileState {
                status: FileStatus::Closed,
                last_status: XRootDStatus::ok(),
                stat_info: None,
                file_url: None,
                data_server: None,
                load_balancer: None,
                file_handle: [0; 4],
                session_id: 0,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> FileStatus {
        self.state.lock().unwrap().status
    }

    /// Whether the file is open.
    pub fn is_open(&self) -> bool {
        self.status() == FileStatus::Opened
    }

    /// Stat information captured by the open, if the server supplied it.
    pub fn cached_stat(&self) -> Option<StatInfo> {
        self.state.lock().unwrap().stat_info.clone()
    }

    /// The URL the file was opened with.
    pub fn file_url(&self) -> Option<Url> {
        self.state.lock().unwrap().file_url.clone()
    }

    /// The data server the file was opened on.
    pub fn data_server(&self) -> Option<Url> {
        self.state.lock().unwrap().data_server.clone()
    }

    /// The load-balancer remembered from the open's redirect chain.
    pub fn load_balancer(&self) -> Option<Url> {
        self.state.lock().unwrap().load_balancer.clone()
    }

    fn params(&self) -> SendParams {
        SendParams {
            timeout: self.timeout,
            stateful: true,
            ..SendParams::default()
        }
    }

    /// Open the file at `url`.
    pub async fn open(&self, url: &str, flags: u16, mode: u16) -> XrdResult<()> {
        {
            let mut st = self.state.lock().unwrap();
            match st.status {
                FileStatus::Opened => {
                    return Err(XRootDStatus::error(ErrorKind::InvalidOp)
                        .with_message("file is already open"))
                }
                FileStatus::Error => return Err(st.last_status.clone()),
                FileStatus::OpenInProgress => {
                    return Err(XRootDStatus::error(ErrorKind::InProgress))
                }
                FileStatus::CloseInProgress => {
                    return Err(XRootDStatus::error(ErrorKind::InvalidOp))
                }
                FileStatus::Closed => {}
            }
            st.status = FileStatus::OpenInProgress;
        }

        let file_url = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(status) => {
                tracing::debug!(target: LOG, url, "trying to open an invalid url");
                let mut st = self.state.lock().unwrap();
                st.status = FileStatus::Error;
                st.last_status = status.clone();
                return Err(status);
            }
        };

        tracing::trace!(target: LOG, host = %file_url.host_id(),
            path = %file_url.path_with_params(), "sending an open request");
        let msg = request::open(
            &file_url.path_with_params(),
            flags | open_flags::ASYNC | open_flags::RETSTAT,
            mode,
        );
        let outcome =
            dispatch::send_request_async(&self.post, &file_url, msg, &self.params()).await;

        let mut st = self.state.lock().unwrap();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(status) => {
                st.status = FileStatus::Error;
                st.last_status = status.clone();
                return Err(status);
            }
        };

        st.data_server = outcome.hosts.last().map(|h| h.url.clone());
        st.load_balancer = outcome
            .hosts
            .iter()
            .find(|h| h.load_balancer)
            .map(|h| h.url.clone());
        st.last_status = outcome.status.clone();

        if !outcome.status.is_ok() {
            st.status = FileStatus::Error;
            tracing::debug!(target: LOG, path = %file_url.path(),
                status = %outcome.status, "error opening file");
            return Err(outcome.status);
        }

        let Response::Open(info) = outcome.response else {
            st.status = FileStatus::Error;
            st.last_status = XRootDStatus::error(ErrorKind::InvalidResponse);
            return Err(st.last_status.clone());
        };

        st.status = FileStatus::Opened;
        st.file_url = Some(file_url.clone());
        st.file_handle = info.file_handle;
        st.session_id = info.session_id;
        st.stat_info = info.stat_info;
        tracing::debug!(target: LOG, path = %file_url.path(),
            handle = format_args!("{:#010x}", u32::from_be_bytes(info.file_handle)),
            "file successfully opened");
        Ok(())
    }

    /// Close the file.
    pub async fn close(&self) -> XrdResult<()> {
        let (handle, session_id) = {
            let mut st = self.state.lock().unwrap();
            match st.status {
                FileStatus::Closed => {
                    return Err(XRootDStatus::error(ErrorKind::InvalidOp)
                        .with_message("file is not open"))
                }
                FileStatus::Error => return Err(st.last_status.clone()),
                FileStatus::CloseInProgress => {
                    return Err(XRootDStatus::error(ErrorKind::InProgress))
                }
                FileStatus::OpenInProgress => {
                    return Err(XRootDStatus::error(ErrorKind::InvalidOp))
                }
                FileStatus::Opened => {}
            }
            st.status = FileStatus::CloseInProgress;
            (st.file_handle, st.session_id)
        };

        tracing::trace!(target: LOG,
            handle = format_args!("{:#010x}", u32::from_be_bytes(handle)),
            "sending a close request");
        let mut msg = request::close(handle);
        msg.set_session_id(session_id);
        let result = self.round_trip(msg).await;

        // Whatever the server said, the handle is gone.
        let mut st = self.state.lock().unwrap();
        st.status = FileStatus::Closed;
        st.file_handle = [0; 4];
        st.session_id = 0;
        st.stat_info = None;
        match result {
            Ok(_) => {
                st.last_status = XRootDStatus::ok();
                Ok(())
            }
            Err(status) => {
                st.last_status = status.clone();
                Err(status)
            }
        }
    }

    /// Stat the open file.
    pub async fn stat(&self) -> XrdResult<StatInfo> {
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::stat_handle(handle);
        msg.set_session_id(session_id);
        match self.round_trip(msg).await? {
            Response::Stat(info) => {
                self.state.lock().unwrap().stat_info = Some(info.clone());
                Ok(info)
            }
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Read up to `length` bytes at `offset`.
    pub async fn read(&self, offset: u64, length: u32) -> XrdResult<ChunkInfo> {
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::read(handle, offset, length);
        msg.set_session_id(session_id);
        let params = SendParams {
            chunks: Some(vec![Chunk { offset, length }]),
            ..self.params()
        };
        let outcome = self.round_trip_with(msg, &params).await?;
        match outcome {
            Response::Chunk(chunk) => Ok(chunk),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Write `data` at `offset`.
    pub async fn write(&self, offset: u64, data: &[u8]) -> XrdResult<()> {
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::write(handle, offset, data);
        msg.set_session_id(session_id);
        self.round_trip(msg).await.map(|_| ())
    }

    /// Commit pending writes on the server.
    pub async fn sync(&self) -> XrdResult<()> {
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::sync(handle);
        msg.set_session_id(session_id);
        self.round_trip(msg).await.map(|_| ())
    }

    /// Truncate the open file to `size` bytes.
    pub async fn truncate(&self, size: u64) -> XrdResult<()> {
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::truncate_handle(handle, size);
        msg.set_session_id(session_id);
        self.round_trip(msg).await.map(|_| ())
    }

    /// Read several ranges in one exchange. The response must match the
    /// request element-wise.
    pub async fn vector_read(&self, chunks: Vec<Chunk>) -> XrdResult<VectorReadInfo> {
        if chunks.is_empty() {
            return Err(XRootDStatus::error(ErrorKind::InvalidArgs)
                .with_message("empty chunk list"));
        }
        let (handle, session_id) = self.handle_for_io()?;
        let mut msg = request::readv(handle, &chunks);
        msg.set_session_id(session_id);
        let params = SendParams {
            chunks: Some(chunks),
            ..self.params()
        };
        match self.round_trip_with(msg, &params).await? {
            Response::VectorRead(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    fn handle_for_io(&self) -> XrdResult<([u8; 4], u64)> {
        let st = self.state.lock().unwrap();
        if st.status != FileStatus::Opened {
            return Err(XRootDStatus::error(ErrorKind::InvalidOp)
                .with_message("file is not open"));
        }
        Ok((st.file_handle, st.session_id))
    }

    fn data_server_url(&self) -> XrdResult<Url> {
        self.state
            .lock()
            .unwrap()
            .data_server
            .clone()
            .ok_or_else(|| XRootDStatus::error(ErrorKind::InvalidOp))
    }

    async fn round_trip(&self, msg: Message) -> XrdResult<Response> {
        let params = self.params();
        self.round_trip_with(msg, &params).await
    }

    async fn round_trip_with(&self, msg: Message, params: &SendParams) -> XrdResult<Response> {
        let url = self.data_server_url()?;
        let outcome = dispatch::send_request_async(&self.post, &url, msg, params).await?;
        if !outcome.status.is_ok() {
            return Err(outcome.status);
        }
        Ok(outcome.response)
    }
}
