//! Asynchronous XRootD client runtime.
//!
//! The post master owns one channel per endpoint; a channel multiplexes
//! any number of in-flight requests over its streams using two-byte
//! stream ids. Each logical request is driven by a per-request state
//! machine that follows redirects, honours wait/waitresp, reassembles
//! partial responses and recovers retriable failures at the remembered
//! load-balancer. The [`fs::FileSystem`] and [`file::File`] facades are
//! the intended entry points.

pub mod channel;
pub mod dispatch;
pub mod env;
pub mod file;
pub mod fs;
pub mod handler;
pub mod inqueue;
pub mod logging;
pub mod msghandler;
pub mod outqueue;
pub mod postmaster;
pub mod requestsync;
pub mod sid;
pub mod socket;
pub mod status;
pub mod stream;
pub mod transport;
pub mod url;

pub use file::{File, FileStatus};
pub use fs::{dirlist_flags, DirListing, FileSystem};
pub use handler::{HostInfo, HostList, Response, ResponseHandler};
pub use postmaster::PostMaster;
pub use status::{ErrorKind, Severity, XRootDStatus, XrdResult};
pub use url::Url;
