//! Protocol constants.
//!
//! All multi-byte fields on the wire are big-endian. Request ids live in
//! the 3000 range, response status codes in the 4000 range and asynchronous
//! event codes in the 5000 range, matching the deployed protocol.

/// Size of a request header: `streamid[2] requestid[2] body[16] dlen[4]`.
pub const REQUEST_HEADER_SIZE: usize = 24;

/// Size of a response header: `streamid[2] status[2] dlen[4]`.
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 0x297;

/// Request ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestId {
    /// Authentication exchange
    Auth = 3000,
    /// Generic information query
    Query = 3001,
    /// Change access mode
    Chmod = 3002,
    /// Close an open file
    Close = 3003,
    /// List a directory
    Dirlist = 3004,
    /// Server protocol and role query
    Protocol = 3006,
    /// Session login
    Login = 3007,
    /// Create a directory
    Mkdir = 3008,
    /// Move or rename
    Mv = 3009,
    /// Open a file
    Open = 3010,
    /// Liveness probe
    Ping = 3011,
    /// Read from an open file
    Read = 3013,
    /// Remove a file
    Rm = 3014,
    /// Remove a directory
    Rmdir = 3015,
    /// Commit pending writes
    Sync = 3016,
    /// Stat a path or an open file
    Stat = 3017,
    /// Set server parameters
    Set = 3018,
    /// Write to an open file
    Write = 3019,
    /// Prepare a file for access
    Prepare = 3021,
    /// End a session
    Endsess = 3023,
    /// Vector read from an open file
    Readv = 3025,
    /// Locate a file in the cluster
    Locate = 3027,
    /// Truncate a file
    Truncate = 3028,
}

impl RequestId {
    /// Decode a request id from its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            3000 => Some(Self::Auth),
            3001 => Some(Self::Query),
            3002 => Some(Self::Chmod),
            3003 => Some(Self::Close),
            3004 => Some(Self::Dirlist),
            3006 => Some(Self::Protocol),
            3007 => Some(Self::Login),
            3008 => Some(Self::Mkdir),
            3009 => Some(Self::Mv),
            3010 => Some(Self::Open),
            3011 => Some(Self::Ping),
            3013 => Some(Self::Read),
            3014 => Some(Self::Rm),
            3015 => Some(Self::Rmdir),
            3016 => Some(Self::Sync),
            3017 => Some(Self::Stat),
            3018 => Some(Self::Set),
            3019 => Some(Self::Write),
            3021 => Some(Self::Prepare),
            3023 => Some(Self::Endsess),
            3025 => Some(Self::Readv),
            3027 => Some(Self::Locate),
            3028 => Some(Self::Truncate),
            _ => None,
        }
    }
}

/// Response status codes.
pub mod status {
    /// Request completed.
    pub const OK: u16 = 0;
    /// Partial response, more to follow.
    pub const OKSOFAR: u16 = 4000;
    /// Asynchronous event.
    pub const ATTN: u16 = 4001;
    /// More authentication data needed.
    pub const AUTHMORE: u16 = 4002;
    /// Server-side error.
    pub const ERROR: u16 = 4003;
    /// Go elsewhere.
    pub const REDIRECT: u16 = 4004;
    /// Retry the same request later.
    pub const WAIT: u16 = 4005;
    /// The answer will arrive as an unsolicited message.
    pub const WAITRESP: u16 = 4006;
}

/// Server error codes carried in an error response body.
pub mod errcode {
    /// Invalid argument
    pub const ARG_INVALID: u32 = 3000;
    /// Required argument missing
    pub const ARG_MISSING: u32 = 3001;
    /// Argument too long
    pub const ARG_TOO_LONG: u32 = 3002;
    /// File is locked
    pub const FILE_LOCKED: u32 = 3003;
    /// File handle does not refer to an open file
    pub const FILE_NOT_OPEN: u32 = 3004;
    /// Filesystem error
    pub const FS_ERROR: u32 = 3005;
    /// Request is invalid in this context
    pub const INVALID_REQUEST: u32 = 3006;
    /// I/O error
    pub const IO_ERROR: u32 = 3007;
    /// Server out of memory
    pub const NO_MEMORY: u32 = 3008;
    /// No space left
    pub const NO_SPACE: u32 = 3009;
    /// Access denied
    pub const NOT_AUTHORIZED: u32 = 3010;
    /// Path not found
    pub const NOT_FOUND: u32 = 3011;
    /// Internal server error
    pub const SERVER_ERROR: u32 = 3012;
    /// Operation not supported
    pub const UNSUPPORTED: u32 = 3013;
}

/// `attn` event codes.
pub mod attn {
    /// Abort the request
    pub const ASYNCAB: u32 = 5000;
    /// Server notice for display
    pub const ASYNCMS: u32 = 5002;
    /// Redirect all further requests
    pub const ASYNCRD: u32 = 5003;
    /// Response to a `waitresp`-deferred request
    pub const ASYNRESP: u32 = 5008;
}

/// Option bits for `open` (and, where noted, `locate`).
pub mod open_flags {
    /// Data may arrive compressed
    pub const COMPRESS: u16 = 1;
    /// Re-create if it exists
    pub const DELETE: u16 = 2;
    /// Ignore file usage rules
    pub const FORCE: u16 = 4;
    /// The file must not exist
    pub const NEW: u16 = 8;
    /// Open for reading
    pub const READ: u16 = 16;
    /// Open for update
    pub const UPDATE: u16 = 32;
    /// Asynchronous processing allowed
    pub const ASYNC: u16 = 64;
    /// Bypass cached location data (also a `locate` option)
    pub const REFRESH: u16 = 128;
    /// Create missing path components
    pub const MKPATH: u16 = 256;
    /// Open in append mode
    pub const APPEND: u16 = 512;
    /// Return stat information with the open response
    pub const RETSTAT: u16 = 1024;
}

/// Option bits for `locate`.
pub mod locate_flags {
    /// Provide an answer without waiting for staging
    pub const NOWAIT: u16 = 64;
    /// Bypass cached location data
    pub const REFRESH: u16 = 128;
}

/// Option bits for `mkdir`.
pub mod mkdir_flags {
    /// Create missing path components
    pub const MKPATH: u8 = 1;
}

/// Option bits for `stat`.
pub mod stat_flags {
    /// Virtual-filesystem statistics instead of object statistics
    pub const VFS: u8 = 1;
}

/// Flag bits of a decoded object-stat response.
pub mod stat_info_flags {
    /// Executable / searchable
    pub const X_BIT_SET: u32 = 1;
    /// Directory
    pub const IS_DIR: u32 = 2;
    /// Neither file nor directory
    pub const OTHER: u32 = 4;
    /// Not online
    pub const OFFLINE: u32 = 8;
    /// Readable
    pub const IS_READABLE: u32 = 16;
    /// Writable
    pub const IS_WRITABLE: u32 = 32;
    /// Opened with POSC, not yet closed
    pub const POSC_PENDING: u32 = 64;
}

/// Server role and attribute flags, as reported by `protocol`.
pub mod server_flags {
    /// Data server
    pub const IS_SERVER: u32 = 0x0000_0001;
    /// Manager
    pub const IS_MANAGER: u32 = 0x0000_0002;
    /// Meta attribute (meta-manager)
    pub const ATTR_META: u32 = 0x0000_0100;
    /// Proxy attribute
    pub const ATTR_PROXY: u32 = 0x0000_0200;
    /// Supervisor attribute
    pub const ATTR_SUPER: u32 = 0x0000_0400;
}

/// `query` information types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum QueryCode {
    /// Server statistics
    Stats = 1,
    /// Prepare status
    Prepare = 2,
    /// File checksum
    Checksum = 3,
    /// Extended attributes
    XAttr = 4,
    /// Space utilisation
    Space = 5,
    /// Checksum cancellation
    ChecksumCancel = 6,
    /// Configuration value
    Config = 7,
    /// Visa attributes
    Visa = 8,
    /// Implementation-specific query
    Opaque = 16,
    /// Implementation-specific file query
    OpaqueFile = 32,
}

/// Access mode bits (owner/group/other, read/write/execute).
pub mod access_mode {
    /// Owner read
    pub const UR: u16 = 0x100;
    /// Owner write
    pub const UW: u16 = 0x080;
    /// Owner execute
    pub const UX: u16 = 0x040;
    /// Group read
    pub const GR: u16 = 0x020;
    /// Group write
    pub const GW: u16 = 0x010;
    /// Group execute
    pub const GX: u16 = 0x008;
    /// Other read
    pub const OR: u16 = 0x004;
    /// Other write
    pub const OW: u16 = 0x002;
    /// Other execute
    pub const OX: u16 = 0x001;
}

/// Initial-handshake server type values.
pub mod handshake {
    /// The endpoint balances load across servers.
    pub const LOAD_BALANCER: u32 = 0;
    /// The endpoint serves data itself.
    pub const DATA_SERVER: u32 = 1;
}

/// Login capability byte: asynchronous responses supported, protocol
/// capability version 3.
pub const LOGIN_CAPVER: u8 = 0x80 | 3;

/// Login role: ordinary user.
pub const LOGIN_ROLE_USER: u8 = 0;
