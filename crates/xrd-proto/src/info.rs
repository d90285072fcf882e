//! Typed objects decoded from `ok` response bodies.
//!
//! Several responses carry text bodies (space- or newline-separated); the
//! parsers here are strict: a body that does not match the advertised
//! layout is reported as malformed rather than silently zeroed.

use crate::constants::stat_info_flags;
use crate::error::ProtoError;

fn parse_u64(field: &str, what: &'static str) -> Result<u64, ProtoError> {
    field.parse::<u64>().map_err(|_| ProtoError::MalformedBody(what))
}

fn parse_u32(field: &str, what: &'static str) -> Result<u32, ProtoError> {
    field.parse::<u32>().map_err(|_| ProtoError::MalformedBody(what))
}

/// Object statistics: `id size flags modtime` as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    /// Server-assigned object id.
    pub id: String,
    /// Size in bytes.
    pub size: u64,
    /// Flag bits, see [`crate::constants::stat_info_flags`].
    pub flags: u32,
    /// Modification time, seconds since the epoch.
    pub mod_time: u64,
}

impl StatInfo {
    /// Parse the text body of a `stat` response.
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtoError::MalformedBody("stat body is not valid text"))?;
        let text = text.trim_end_matches('\0').trim();
        let mut fields = text.split_whitespace();
        let id = fields
            .next()
            .ok_or(ProtoError::MalformedBody("stat body missing id"))?
            .to_string();
        let size = parse_u64(
            fields.next().ok_or(ProtoError::MalformedBody("stat body missing size"))?,
            "stat size is not a number",
        )?;
        let flags = parse_u32(
            fields.next().ok_or(ProtoError::MalformedBody("stat body missing flags"))?,
            "stat flags is not a number",
        )?;
        let mod_time = parse_u64(
            fields
                .next()
                .ok_or(ProtoError::MalformedBody("stat body missing modtime"))?,
            "stat modtime is not a number",
        )?;
        Ok(StatInfo { id, size, flags, mod_time })
    }

    /// Whether the given flag bits are all set.
    pub fn test_flags(&self, flags: u32) -> bool {
        self.flags & flags == flags
    }

    /// Whether the object is a directory.
    pub fn is_dir(&self) -> bool {
        self.test_flags(stat_info_flags::IS_DIR)
    }
}

/// Virtual-filesystem statistics: six numbers as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatInfoVfs {
    /// Nodes providing read/write space.
    pub nodes_rw: u64,
    /// Largest contiguous free r/w area, in MB.
    pub free_rw: u64,
    /// Utilisation of the r/w partition, percent.
    pub utilization_rw: u32,
    /// Nodes providing staging space.
    pub nodes_staging: u64,
    /// Largest contiguous free staging area, in MB.
    pub free_staging: u64,
    /// Utilisation of the staging partition, percent.
    pub utilization_staging: u32,
}

impl StatInfoVfs {
    /// Parse the text body of a `stat` response issued with the vfs option.
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtoError::MalformedBody("statvfs body is not valid text"))?;
        let text = text.trim_end_matches('\0').trim();
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(ProtoError::MalformedBody("statvfs body needs six fields"));
        }
        Ok(StatInfoVfs {
            nodes_rw: parse_u64(fields[0], "statvfs nodes_rw")?,
            free_rw: parse_u64(fields[1], "statvfs free_rw")?,
            utilization_rw: parse_u32(fields[2], "statvfs utilization_rw")?,
            nodes_staging: parse_u64(fields[3], "statvfs nodes_staging")?,
            free_staging: parse_u64(fields[4], "statvfs free_staging")?,
            utilization_staging: parse_u32(fields[5], "statvfs utilization_staging")?,
        })
    }
}

/// Node type of a location entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    /// Manager with the file online.
    ManagerOnline,
    /// Manager with the file pending.
    ManagerPending,
    /// Server with the file online.
    ServerOnline,
    /// Server with the file pending.
    ServerPending,
}

/// Access allowed at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Read only.
    Read,
    /// Read and write.
    ReadWrite,
}

/// One entry of a `locate` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// `host:port` of the node.
    pub address: String,
    /// Node type.
    pub location_type: LocationType,
    /// Access allowed there.
    pub access: AccessType,
}

impl Location {
    /// Whether this entry points at a data server.
    pub fn is_server(&self) -> bool {
        matches!(
            self.location_type,
            LocationType::ServerOnline | LocationType::ServerPending
        )
    }

    /// Whether this entry points at a manager.
    pub fn is_manager(&self) -> bool {
        matches!(
            self.location_type,
            LocationType::ManagerOnline | LocationType::ManagerPending
        )
    }
}

/// Decoded `locate` response: a list of [`Location`]s.
///
/// The wire format is space-separated entries, each a type character
/// (`M m S s`), an access character (`r w`) and the address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationInfo {
    /// The locations, in server order.
    pub locations: Vec<Location>,
}

impl LocationInfo {
    /// Parse the text body of a `locate` response. Unrecognised entries
    /// are skipped, matching server behaviour for extension entries.
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtoError::MalformedBody("locate body is not valid text"))?;
        let text = text.trim_end_matches('\0');
        let mut info = LocationInfo::default();
        for entry in text.split(' ').filter(|e| e.len() >= 3) {
            let mut chars = entry.chars();
            let location_type = match chars.next() {
                Some('M') => LocationType::ManagerOnline,
                Some('m') => LocationType::ManagerPending,
                Some('S') => LocationType::ServerOnline,
                Some('s') => LocationType::ServerPending,
                _ => continue,
            };
            let access = match chars.next() {
                Some('r') => AccessType::Read,
                Some('w') => AccessType::ReadWrite,
                _ => continue,
            };
            info.locations.push(Location {
                address: entry[2..].to_string(),
                location_type,
                access,
            });
        }
        Ok(info)
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no location was reported.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Decoded `protocol` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Binary protocol version of the server.
    pub version: u32,
    /// Server role and attribute flags.
    pub host_info: u32,
}

impl ProtocolInfo {
    /// Whether the given host-info flag bits are all set.
    pub fn test_host_info(&self, flags: u32) -> bool {
        self.host_info & flags == flags
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// `host:port` the entry was reported by.
    pub host_address: String,
    /// Entry name, relative to the parent.
    pub name: String,
    /// Statistics, filled in when the listing was requested with stats.
    pub stat_info: Option<StatInfo>,
}

/// Decoded `dirlist` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryList {
    /// Parent path, always ending in `/`.
    pub parent: String,
    /// The entries, in server order.
    pub entries: Vec<ListEntry>,
}

impl DirectoryList {
    /// Build a listing from the newline-separated body of a `dirlist`
    /// response. `host_address` tags every entry with its origin.
    pub fn parse(host_address: &str, parent: &str, data: &[u8]) -> Result<Self, ProtoError> {
        let mut parent = parent.trim_end_matches('\0').to_string();
        if !parent.ends_with('/') {
            parent.push('/');
        }
        let mut list = DirectoryList {
            parent,
            entries: Vec::new(),
        };
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtoError::MalformedBody("dirlist body is not valid text"))?;
        for name in text
            .trim_end_matches('\0')
            .split('\n')
            .filter(|n| !n.is_empty())
        {
            list.entries.push(ListEntry {
                host_address: host_address.to_string(),
                name: name.to_string(),
                stat_info: None,
            });
        }
        Ok(list)
    }

    /// Append another listing's entries.
    pub fn merge(&mut self, other: DirectoryList) {
        self.entries.extend(other.entries);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoded `open` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInfo {
    /// The 4-byte file handle to stamp on handle-bound requests.
    pub file_handle: [u8; 4],
    /// Session the file was opened under.
    pub session_id: u64,
    /// Statistics, present when the open asked for them and the server
    /// supplied them.
    pub stat_info: Option<StatInfo>,
}

impl OpenInfo {
    /// Parse an `open` body. `with_stat` says whether the request carried
    /// the retstat option; the stat text, if any, starts after the handle
    /// and the 8 bytes of compression info.
    pub fn parse(body: &[u8], session_id: u64, with_stat: bool) -> Result<Self, ProtoError> {
        if body.len() < 4 {
            return Err(ProtoError::TooShort {
                expected: 4,
                actual: body.len(),
            });
        }
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&body[0..4]);
        let stat_info = if with_stat && body.len() > 12 {
            Some(StatInfo::parse(&body[12..])?)
        } else {
            None
        };
        Ok(OpenInfo {
            file_handle,
            session_id,
            stat_info,
        })
    }
}

/// A contiguous piece of file data returned by `read` or `readv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Absolute file offset of the data.
    pub offset: u64,
    /// Number of bytes.
    pub length: u32,
    /// The data itself.
    pub data: Vec<u8>,
}

/// Decoded `readv` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorReadInfo {
    /// Total bytes across all chunks.
    pub size: u32,
    /// The chunks, in request order.
    pub chunks: Vec<ChunkInfo>,
}

/// A redirect delivered as an answer instead of being followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    /// Host to go to.
    pub host: String,
    /// Port to go to.
    pub port: i32,
    /// Raw CGI tail of the redirect URL.
    pub cgi: String,
}

/// Opaque response body, passed through undecoded (`query`, `set`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryData {
    /// The concatenated body bytes.
    pub data: Vec<u8>,
}
