//! The filesystem facade: a stateless request builder over the post
//! master, plus the aggregated operations (deep locate, fanned-out
//! directory listings).

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use xrd_proto::constants::{errcode, QueryCode};
use xrd_proto::info::{
    DirectoryList, LocationInfo, ProtocolInfo, StatInfo, StatInfoVfs,
};
use xrd_proto::request;

use crate::dispatch;
use crate::env::defaults;
use crate::handler::{HostList, Response, ResponseHandler};
use crate::msghandler::SendParams;
use crate::postmaster::PostMaster;
use crate::requestsync::RequestSync;
use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::url::Url;

const LOG: &str = "xrd::app";

/// Flags for [`FileSystem::dirlist`].
pub mod dirlist_flags {
    /// Back-fill each entry with its stat information.
    pub const STAT: u8 = 1;
    /// Resolve every server holding the directory and merge their
    /// listings.
    pub const LOCATE: u8 = 2;
}

/// Outcome of a directory listing.
#[derive(Debug, Clone)]
pub struct DirListing {
    /// The merged listing.
    pub list: DirectoryList,
    /// Whether any contributing request failed.
    pub partial: bool,
}

/// Send/receive facade for the path-based operations.
pub struct FileSystem {
    url: Url,
    post: Arc<PostMaster>,
    timeout: Duration,
}

impl FileSystem {
    /// A facade talking to `url`'s endpoint through the process-wide post
    /// master.
    pub fn new(url: &str) -> XrdResult<Self> {
        Self::with_post(url, PostMaster::global())
    }

    /// A facade over an explicit post master.
    pub fn with_post(url: &str, post: Arc<PostMaster>) -> XrdResult<Self> {
        let url = Url::parse(url)?;
        let timeout = Duration::from_secs(
            post.env().get_int_or("RequestTimeout", defaults::REQUEST_TIMEOUT).max(1) as u64,
        );
        Ok(FileSystem { url, post, timeout })
    }

    /// The endpoint this facade talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn params(&self) -> SendParams {
        SendParams {
            timeout: self.timeout,
            ..SendParams::default()
        }
    }

    async fn round_trip(&self, msg: xrd_proto::Message) -> XrdResult<Response> {
        let outcome = dispatch::send_request_async(&self.post, &self.url, msg, &self.params())
            .await?;
        if !outcome.status.is_ok() {
            return Err(outcome.status);
        }
        Ok(outcome.response)
    }

    //--------------------------------------------------------------------
    // locate
    //--------------------------------------------------------------------

    /// Locate a path; the handler receives the terminal outcome.
    pub fn locate_with_handler(
        &self,
        path: &str,
        flags: u16,
        handler: Arc<dyn ResponseHandler>,
    ) -> XrdResult<()> {
        tracing::trace!(target: LOG, host = %self.url.host_id(), path, "sending locate request");
        dispatch::send_request(
            &self.post,
            &self.url,
            request::locate(path, flags),
            handler,
            &self.params(),
        )
    }

    /// Locate a path.
    pub async fn locate(&self, path: &str, flags: u16) -> XrdResult<LocationInfo> {
        match self.round_trip(request::locate(path, flags)).await? {
            Response::Locate(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Locate a path and recursively resolve every manager entry down to
    /// the servers beneath it; the handler receives the aggregate.
    pub fn deep_locate_with_handler(
        &self,
        path: &str,
        flags: u16,
        handler: Arc<dyn ResponseHandler>,
    ) -> XrdResult<()> {
        let deep = DeepLocateHandler::new(self.post.clone(), path.to_string(), flags, handler);
        self.locate_with_handler(path, flags, deep)
    }

    /// Locate a path down to the servers holding it.
    pub async fn deep_locate(&self, path: &str, flags: u16) -> XrdResult<LocationInfo> {
        let (handler, rx) = crate::handler::OneshotHandler::new();
        self.deep_locate_with_handler(path, flags, handler)?;
        let outcome = crate::handler::wait_outcome(rx).await;
        if !outcome.status.is_ok() {
            return Err(outcome.status);
        }
        match outcome.response {
            Response::Locate(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    //--------------------------------------------------------------------
    // plain operations
    //--------------------------------------------------------------------

    /// Move or rename a path.
    pub async fn mv(&self, source: &str, dest: &str) -> XrdResult<()> {
        tracing::trace!(target: LOG, host = %self.url.host_id(), source, dest,
            "sending mv request");
        self.round_trip(request::mv(source, dest)).await.map(|_| ())
    }

    /// Query server information.
    pub async fn query(&self, code: QueryCode, arg: &[u8]) -> XrdResult<Vec<u8>> {
        match self.round_trip(request::query(code, arg)).await? {
            Response::Binary(data) => Ok(data.data),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Truncate a path to `size` bytes.
    pub async fn truncate(&self, path: &str, size: u64) -> XrdResult<()> {
        self.round_trip(request::truncate(path, size)).await.map(|_| ())
    }

    /// Remove a file.
    pub async fn rm(&self, path: &str) -> XrdResult<()> {
        self.round_trip(request::rm(path)).await.map(|_| ())
    }

    /// Create a directory.
    pub async fn mkdir(&self, path: &str, flags: u8, mode: u16) -> XrdResult<()> {
        self.round_trip(request::mkdir(path, flags, mode)).await.map(|_| ())
    }

    /// Remove a directory.
    pub async fn rmdir(&self, path: &str) -> XrdResult<()> {
        self.round_trip(request::rmdir(path)).await.map(|_| ())
    }

    /// Change the access mode of a path.
    pub async fn chmod(&self, path: &str, mode: u16) -> XrdResult<()> {
        self.round_trip(request::chmod(path, mode)).await.map(|_| ())
    }

    /// Check that the endpoint is alive.
    pub async fn ping(&self) -> XrdResult<()> {
        self.round_trip(request::ping()).await.map(|_| ())
    }

    /// Stat a path, delivering to a handler.
    pub fn stat_with_handler(
        &self,
        path: &str,
        handler: Arc<dyn ResponseHandler>,
    ) -> XrdResult<()> {
        dispatch::send_request(
            &self.post,
            &self.url,
            request::stat(path, 0),
            handler,
            &self.params(),
        )
    }

    /// Stat a path.
    pub async fn stat(&self, path: &str) -> XrdResult<StatInfo> {
        match self.round_trip(request::stat(path, 0)).await? {
            Response::Stat(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Stat the filesystem behind a path.
    pub async fn stat_vfs(&self, path: &str) -> XrdResult<StatInfoVfs> {
        let msg = request::stat(path, xrd_proto::constants::stat_flags::VFS);
        match self.round_trip(msg).await? {
            Response::StatVfs(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    /// Query protocol version and role of the endpoint.
    pub async fn protocol(&self) -> XrdResult<ProtocolInfo> {
        let msg = request::protocol(xrd_proto::constants::PROTOCOL_VERSION);
        match self.round_trip(msg).await? {
            Response::Protocol(info) => Ok(info),
            _ => Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        }
    }

    //--------------------------------------------------------------------
    // dirlist
    //--------------------------------------------------------------------

    /// List a directory. `flags` may ask for per-entry stats and for the
    /// locate-driven fan-out across every server holding the directory.
    pub async fn dirlist(&self, path: &str, flags: u8) -> XrdResult<DirListing> {
        if flags & dirlist_flags::LOCATE != 0 {
            return self.dirlist_everywhere(path, flags).await;
        }

        let list = match self.round_trip(request::dirlist(path)).await? {
            Response::DirList(list) => list,
            _ => return Err(XRootDStatus::error(ErrorKind::InvalidResponse)),
        };

        let mut listing = DirListing {
            list,
            partial: false,
        };
        if flags & dirlist_flags::STAT != 0 {
            self.backfill_stats(&mut listing).await;
        }
        Ok(listing)
    }

    /// Deep-locate the directory, list it on every server and merge.
    async fn dirlist_everywhere(&self, path: &str, flags: u8) -> XrdResult<DirListing> {
        let locate_path = format!("*{path}");
        let locations = self.deep_locate(&locate_path, 0).await?;

        let mut parent = path.to_string();
        if !parent.ends_with('/') {
            parent.push('/');
        }
        let mut merged = DirListing {
            list: DirectoryList {
                parent,
                entries: Vec::new(),
            },
            partial: false,
        };

        let sub_flags = flags & !dirlist_flags::LOCATE;
        for location in &locations.locations {
            let child = match FileSystem::with_post(
                &format!("{}://{}/", self.url.scheme(), location.address),
                self.post.clone(),
            ) {
                Ok(child) => child,
                Err(_) => {
                    merged.partial = true;
                    continue;
                }
            };
            match Box::pin(child.dirlist(path, sub_flags)).await {
                Ok(listing) => {
                    merged.partial |= listing.partial;
                    merged.list.merge(listing.list);
                }
                Err(status) => {
                    tracing::debug!(target: LOG, server = %location.address, %status,
                        "directory listing failed on one server");
                    merged.partial = true;
                }
            }
        }
        Ok(merged)
    }

    /// Stat every listing entry, at most 1024 requests in flight.
    async fn backfill_stats(&self, listing: &mut DirListing) {
        let total = listing.list.len() as u32;
        if total == 0 {
            return;
        }
        let quota = total.min(1024);
        let sync = Arc::new(RequestSync::new(total, quota));
        let results: Arc<Mutex<Vec<Option<StatInfo>>>> =
            Arc::new(Mutex::new(vec![None; total as usize]));

        for index in 0..total as usize {
            sync.wait_for_quota().await;
            let full_path = format!("{}{}", listing.list.parent, listing.list.entries[index].name);
            let handler = Arc::new(DirListStatHandler {
                results: results.clone(),
                index,
                sync: sync.clone(),
            });
            if self.stat_with_handler(&full_path, handler).is_err() {
                sync.task_done(false);
            }
        }
        sync.wait_for_all().await;

        let mut results = results.lock().unwrap();
        for (entry, stat) in listing.list.entries.iter_mut().zip(results.iter_mut()) {
            entry.stat_info = stat.take();
        }
        if sync.failures() > 0 {
            listing.partial = true;
        }
    }
}

/// Back-fills one listing entry with its stat result.
struct DirListStatHandler {
    results: Arc<Mutex<Vec<Option<StatInfo>>>>,
    index: usize,
    sync: Arc<RequestSync>,
}

impl ResponseHandler for DirListStatHandler {
    fn handle(&self, status: XRootDStatus, response: Response, _hosts: HostList) {
        if !status.is_ok() {
            self.sync.task_done(false);
            return;
        }
        if let Response::Stat(info) = response {
            self.results.lock().unwrap()[self.index] = Some(info);
            self.sync.task_done(true);
        } else {
            self.sync.task_done(false);
        }
    }
}

struct DeepLocateState {
    first_time: bool,
    outstanding: u32,
    locations: LocationInfo,
    user: Option<Arc<dyn ResponseHandler>>,
}

/// Recursively expands manager entries of a locate response into the
/// servers beneath them, delivering the aggregate exactly once.
struct DeepLocateHandler {
    me: Weak<DeepLocateHandler>,
    post: Arc<PostMaster>,
    path: String,
    flags: u16,
    state: Mutex<DeepLocateState>,
}

impl DeepLocateHandler {
    fn new(
        post: Arc<PostMaster>,
        path: String,
        flags: u16,
        user: Arc<dyn ResponseHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| DeepLocateHandler {
            me: me.clone(),
            post,
            path,
            flags,
            state: Mutex::new(DeepLocateState {
                first_time: true,
                outstanding: 1,
                locations: LocationInfo::default(),
                user: Some(user),
            }),
        })
    }

    fn finish(&self, state: &mut DeepLocateState) {
        let Some(user) = state.user.take() else {
            return;
        };

        // Aggregate only servers, one entry per address.
        let mut seen = std::collections::HashSet::new();
        let mut aggregate = LocationInfo::default();
        for location in state.locations.locations.drain(..) {
            if seen.insert(location.address.clone()) {
                aggregate.locations.push(location);
            }
        }

        if aggregate.is_empty() {
            user.handle(
                XRootDStatus::server_error(errcode::NOT_FOUND, "no valid location found"),
                Response::None,
                Vec::new(),
            );
        } else {
            user.handle(XRootDStatus::ok(), Response::Locate(aggregate), Vec::new());
        }
    }
}

impl ResponseHandler for DeepLocateHandler {
    fn handle(&self, status: XRootDStatus, response: Response, hosts: HostList) {
        let mut state = self.state.lock().unwrap();
        state.outstanding -= 1;

        if !status.is_ok() {
            tracing::trace!(target: LOG, %status, "deep locate child failed");
            if state.first_time {
                if let Some(user) = state.user.take() {
                    user.handle(status, response, hosts);
                }
                return;
            }
            if state.outstanding == 0 {
                self.finish(&mut state);
            }
            return;
        }
        state.first_time = false;

        if let Response::Locate(info) = response {
            tracing::trace!(target: LOG, count = info.len(), "deep locate got locations");
            for location in info.locations {
                if location.is_server() {
                    state.locations.locations.push(location);
                    continue;
                }
                if !location.is_manager() {
                    continue;
                }
                let Some(me) = self.me.upgrade() else { continue };
                let url = format!("root://{}/", location.address);
                let submitted = FileSystem::with_post(&url, self.post.clone())
                    .and_then(|fs| fs.locate_with_handler(&self.path, self.flags, me));
                match submitted {
                    Ok(()) => state.outstanding += 1,
                    Err(status) => {
                        tracing::debug!(target: LOG, manager = %location.address, %status,
                            "unable to query manager during deep locate");
                    }
                }
            }
        }

        if state.outstanding == 0 {
            self.finish(&mut state);
        }
    }
}
