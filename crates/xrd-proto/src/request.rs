//! Request marshalling.
//!
//! Every builder produces a complete frame in network byte order with the
//! stream id left as zero; the sender stamps a stream id just before the
//! message is queued. The mutators at the bottom support the rewrite steps
//! of the redirect/wait machinery and operate on the marshalled bytes in
//! place.

use crate::constants::{open_flags, QueryCode, RequestId, REQUEST_HEADER_SIZE};
use crate::message::Message;

/// A single element of a vector-read request: `length` bytes at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute file offset.
    pub offset: u64,
    /// Number of bytes to read.
    pub length: u32,
}

fn new_request(id: RequestId, payload_len: usize) -> Message {
    let mut msg = Message::new(REQUEST_HEADER_SIZE + payload_len);
    msg.bytes_mut()[2..4].copy_from_slice(&(id as u16).to_be_bytes());
    msg.set_req_dlen(payload_len as u32);
    msg.set_cursor(REQUEST_HEADER_SIZE);
    msg
}

/// Build a `locate` request.
pub fn locate(path: &str, options: u16) -> Message {
    let mut msg = new_request(RequestId::Locate, path.len());
    msg.bytes_mut()[4..6].copy_from_slice(&options.to_be_bytes());
    msg.append(path.as_bytes());
    msg.set_description(format!("locate {path}"));
    msg
}

/// Build an `mv` request; source and destination are joined by a space.
pub fn mv(source: &str, dest: &str) -> Message {
    let payload = format!("{source} {dest}");
    let mut msg = new_request(RequestId::Mv, payload.len());
    msg.append(payload.as_bytes());
    msg.set_description(format!("mv {source} {dest}"));
    msg
}

/// Build a `query` request.
pub fn query(code: QueryCode, arg: &[u8]) -> Message {
    let mut msg = new_request(RequestId::Query, arg.len());
    msg.bytes_mut()[4..6].copy_from_slice(&(code as u16).to_be_bytes());
    msg.append(arg);
    msg.set_description(format!("query {code:?}"));
    msg
}

/// Build a path-based `truncate` request.
pub fn truncate(path: &str, size: u64) -> Message {
    let mut msg = new_request(RequestId::Truncate, path.len());
    msg.bytes_mut()[8..16].copy_from_slice(&(size as i64).to_be_bytes());
    msg.append(path.as_bytes());
    msg.set_description(format!("truncate {path} to {size}"));
    msg
}

/// Build a handle-based `truncate` request.
pub fn truncate_handle(fhandle: [u8; 4], size: u64) -> Message {
    let mut msg = new_request(RequestId::Truncate, 0);
    msg.bytes_mut()[4..8].copy_from_slice(&fhandle);
    msg.bytes_mut()[8..16].copy_from_slice(&(size as i64).to_be_bytes());
    msg.set_description(format!("truncate handle to {size}"));
    msg
}

/// Build an `rm` request.
pub fn rm(path: &str) -> Message {
    let mut msg = new_request(RequestId::Rm, path.len());
    msg.append(path.as_bytes());
    msg.set_description(format!("rm {path}"));
    msg
}

/// Build a `mkdir` request.
pub fn mkdir(path: &str, options: u8, mode: u16) -> Message {
    let mut msg = new_request(RequestId::Mkdir, path.len());
    msg.bytes_mut()[4] = options;
    msg.bytes_mut()[18..20].copy_from_slice(&mode.to_be_bytes());
    msg.append(path.as_bytes());
    msg.set_description(format!("mkdir {path}"));
    msg
}

/// Build an `rmdir` request.
pub fn rmdir(path: &str) -> Message {
    let mut msg = new_request(RequestId::Rmdir, path.len());
    msg.append(path.as_bytes());
    msg.set_description(format!("rmdir {path}"));
    msg
}

/// Build a `chmod` request.
pub fn chmod(path: &str, mode: u16) -> Message {
    let mut msg = new_request(RequestId::Chmod, path.len());
    msg.bytes_mut()[18..20].copy_from_slice(&mode.to_be_bytes());
    msg.append(path.as_bytes());
    msg.set_description(format!("chmod {path}"));
    msg
}

/// Build a `ping` request.
pub fn ping() -> Message {
    let mut msg = new_request(RequestId::Ping, 0);
    msg.set_description("ping");
    msg
}

/// Build a `stat` request for a path.
pub fn stat(path: &str, options: u8) -> Message {
    let mut msg = new_request(RequestId::Stat, path.len());
    msg.bytes_mut()[4] = options;
    msg.append(path.as_bytes());
    msg.set_description(format!("stat {path}"));
    msg
}

/// Build a `stat` request for an open file handle.
pub fn stat_handle(fhandle: [u8; 4]) -> Message {
    let mut msg = new_request(RequestId::Stat, 0);
    msg.bytes_mut()[16..20].copy_from_slice(&fhandle);
    msg.set_description("stat handle");
    msg
}

/// Build a `protocol` request.
pub fn protocol(client_protocol_version: u32) -> Message {
    let mut msg = new_request(RequestId::Protocol, 0);
    msg.bytes_mut()[4..8].copy_from_slice(&client_protocol_version.to_be_bytes());
    msg.set_description("protocol");
    msg
}

/// Build a `dirlist` request.
pub fn dirlist(path: &str) -> Message {
    let mut msg = new_request(RequestId::Dirlist, path.len());
    msg.append(path.as_bytes());
    msg.set_description(format!("dirlist {path}"));
    msg
}

/// Build an `open` request. `path` may carry opaque CGI after a `?`.
pub fn open(path: &str, options: u16, mode: u16) -> Message {
    let mut msg = new_request(RequestId::Open, path.len());
    msg.bytes_mut()[4..6].copy_from_slice(&mode.to_be_bytes());
    msg.bytes_mut()[6..8].copy_from_slice(&options.to_be_bytes());
    msg.append(path.as_bytes());
    msg.set_description(format!("open {path}"));
    msg
}

/// Build a `close` request.
pub fn close(fhandle: [u8; 4]) -> Message {
    let mut msg = new_request(RequestId::Close, 0);
    msg.bytes_mut()[4..8].copy_from_slice(&fhandle);
    msg.set_description("close");
    msg
}

/// Build a `read` request.
pub fn read(fhandle: [u8; 4], offset: u64, length: u32) -> Message {
    let mut msg = new_request(RequestId::Read, 0);
    msg.bytes_mut()[4..8].copy_from_slice(&fhandle);
    msg.bytes_mut()[8..16].copy_from_slice(&(offset as i64).to_be_bytes());
    msg.bytes_mut()[16..20].copy_from_slice(&(length as i32).to_be_bytes());
    msg.set_description(format!("read {length}@{offset}"));
    msg
}

/// Build a `write` request.
pub fn write(fhandle: [u8; 4], offset: u64, data: &[u8]) -> Message {
    let mut msg = new_request(RequestId::Write, data.len());
    msg.bytes_mut()[4..8].copy_from_slice(&fhandle);
    msg.bytes_mut()[8..16].copy_from_slice(&(offset as i64).to_be_bytes());
    msg.append(data);
    msg.set_description(format!("write {}@{}", data.len(), offset));
    msg
}

/// Build a `sync` request.
pub fn sync(fhandle: [u8; 4]) -> Message {
    let mut msg = new_request(RequestId::Sync, 0);
    msg.bytes_mut()[4..8].copy_from_slice(&fhandle);
    msg.set_description("sync");
    msg
}

/// Build a `readv` request. The payload carries one 16-byte record
/// `{fhandle[4] rlen[4] offset[8]}` per chunk, in request order.
pub fn readv(fhandle: [u8; 4], chunks: &[Chunk]) -> Message {
    let mut msg = new_request(RequestId::Readv, chunks.len() * 16);
    for chunk in chunks {
        msg.append(&fhandle);
        msg.append(&(chunk.length as i32).to_be_bytes());
        msg.append(&(chunk.offset as i64).to_be_bytes());
    }
    msg.set_description(format!("readv {} chunks", chunks.len()));
    msg
}

//------------------------------------------------------------------------
// In-place rewrite helpers.
//------------------------------------------------------------------------

/// Merge CGI parameters into a request's opaque payload tail.
///
/// Keys already present in the payload win over `params` entries, so a
/// caller-supplied value is never overridden by redirect CGI. The declared
/// payload length is fixed up afterwards.
pub fn append_cgi(msg: &mut Message, params: &[(String, String)]) {
    if params.is_empty() {
        return;
    }

    let payload = String::from_utf8_lossy(msg.req_payload()).into_owned();
    let (base, existing) = match payload.split_once('?') {
        Some((base, cgi)) => (base.to_string(), cgi.to_string()),
        None => (payload, String::new()),
    };

    let mut merged: Vec<(String, String)> = Vec::new();
    for part in existing.split('&').filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((k, v)) => merged.push((k.to_string(), v.to_string())),
            None => merged.push((part.to_string(), String::new())),
        }
    }
    for (key, value) in params {
        if merged.iter().any(|(k, _)| k == key) {
            continue;
        }
        merged.push((key.clone(), value.clone()));
    }

    let mut rebuilt = base;
    if !merged.is_empty() {
        rebuilt.push('?');
        let joined: Vec<String> = merged
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        rebuilt.push_str(&joined.join("&"));
    }

    msg.truncate(REQUEST_HEADER_SIZE);
    msg.set_cursor(REQUEST_HEADER_SIZE);
    msg.append(rebuilt.as_bytes());
    msg.set_req_dlen(rebuilt.len() as u32);
}

/// Set one CGI parameter in a request's opaque payload tail, replacing an
/// existing value for the key.
pub fn set_cgi_param(msg: &mut Message, key: &str, value: &str) {
    let payload = String::from_utf8_lossy(msg.req_payload()).into_owned();
    let (base, existing) = match payload.split_once('?') {
        Some((base, cgi)) => (base.to_string(), cgi.to_string()),
        None => (payload, String::new()),
    };

    let mut merged: Vec<(String, String)> = Vec::new();
    for part in existing.split('&').filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((k, v)) => merged.push((k.to_string(), v.to_string())),
            None => merged.push((part.to_string(), String::new())),
        }
    }
    match merged.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value.to_string(),
        None => merged.push((key.to_string(), value.to_string())),
    }

    let joined: Vec<String> = merged
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect();
    let rebuilt = format!("{base}?{}", joined.join("&"));

    msg.truncate(REQUEST_HEADER_SIZE);
    msg.set_cursor(REQUEST_HEADER_SIZE);
    msg.append(rebuilt.as_bytes());
    msg.set_req_dlen(rebuilt.len() as u32);
}

/// Read one CGI parameter from a request's payload tail.
pub fn get_cgi_param(msg: &Message, key: &str) -> Option<String> {
    let payload = String::from_utf8_lossy(msg.req_payload()).into_owned();
    let (_, cgi) = payload.split_once('?')?;
    for part in cgi.split('&') {
        match part.split_once('=') {
            Some((k, v)) if k == key => return Some(v.to_string()),
            None if part == key => return Some(String::new()),
            _ => {}
        }
    }
    None
}

fn options_range(msg: &Message) -> Option<std::ops::Range<usize>> {
    match RequestId::from_u16(msg.req_id()) {
        Some(RequestId::Locate) => Some(4..6),
        Some(RequestId::Open) => Some(6..8),
        _ => None,
    }
}

/// Set the `refresh` option bit on `locate` and `open` requests.
pub fn set_refresh(msg: &mut Message) {
    if let Some(range) = options_range(msg) {
        let mut options = u16::from_be_bytes([msg.bytes()[range.start], msg.bytes()[range.start + 1]]);
        options |= open_flags::REFRESH;
        msg.bytes_mut()[range].copy_from_slice(&options.to_be_bytes());
    }
}

/// Clear the `refresh` option bit on `locate` and `open` requests.
pub fn clear_refresh(msg: &mut Message) {
    if let Some(range) = options_range(msg) {
        let mut options = u16::from_be_bytes([msg.bytes()[range.start], msg.bytes()[range.start + 1]]);
        options &= !open_flags::REFRESH;
        msg.bytes_mut()[range].copy_from_slice(&options.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::locate_flags;

    #[test]
    fn ping_is_a_bare_header() {
        let msg = ping();
        assert_eq!(msg.len(), 24);
        assert_eq!(msg.req_id(), RequestId::Ping as u16);
        assert_eq!(msg.req_dlen(), 0);
    }

    #[test]
    fn read_layout() {
        let msg = read([0xde, 0xad, 0xbe, 0xef], 1 << 20, 8192);
        assert_eq!(&msg.bytes()[4..8], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            i64::from_be_bytes(msg.bytes()[8..16].try_into().unwrap()),
            1 << 20
        );
        assert_eq!(
            i32::from_be_bytes(msg.bytes()[16..20].try_into().unwrap()),
            8192
        );
    }

    #[test]
    fn readv_records() {
        let chunks = [
            Chunk { offset: 0, length: 100 },
            Chunk { offset: 4096, length: 200 },
        ];
        let msg = readv([1, 2, 3, 4], &chunks);
        assert_eq!(msg.req_dlen(), 32);
        let body = msg.req_payload();
        assert_eq!(&body[0..4], &[1, 2, 3, 4]);
        assert_eq!(i32::from_be_bytes(body[4..8].try_into().unwrap()), 100);
        assert_eq!(i64::from_be_bytes(body[8..16].try_into().unwrap()), 0);
        assert_eq!(i64::from_be_bytes(body[24..32].try_into().unwrap()), 4096);
    }

    #[test]
    fn append_cgi_caller_wins() {
        let mut msg = open("/data/f?tried=first", 0, 0);
        append_cgi(
            &mut msg,
            &[
                ("tried".to_string(), "second".to_string()),
                ("cms.sel".to_string(), "1".to_string()),
            ],
        );
        let payload = String::from_utf8(msg.req_payload().to_vec()).unwrap();
        assert_eq!(payload, "/data/f?tried=first&cms.sel=1");
        assert_eq!(msg.req_dlen() as usize, payload.len());
    }

    #[test]
    fn append_cgi_plain_path() {
        let mut msg = locate("/x", 0);
        append_cgi(&mut msg, &[("tried".to_string(), "hostA".to_string())]);
        assert_eq!(msg.req_payload(), b"/x?tried=hostA");
    }

    #[test]
    fn set_cgi_param_overwrites() {
        let mut msg = locate("/x?tried=a", 0);
        set_cgi_param(&mut msg, "tried", "a,b");
        assert_eq!(msg.req_payload(), b"/x?tried=a,b");
        assert_eq!(get_cgi_param(&msg, "tried").as_deref(), Some("a,b"));
        set_cgi_param(&mut msg, "extra", "1");
        assert_eq!(msg.req_payload(), b"/x?tried=a,b&extra=1");
        assert_eq!(msg.req_dlen() as usize, msg.req_payload().len());
    }

    #[test]
    fn refresh_toggles() {
        let mut msg = locate("/x", locate_flags::NOWAIT);
        set_refresh(&mut msg);
        let options = u16::from_be_bytes(msg.bytes()[4..6].try_into().unwrap());
        assert_eq!(options, locate_flags::NOWAIT | locate_flags::REFRESH);
        clear_refresh(&mut msg);
        let options = u16::from_be_bytes(msg.bytes()[4..6].try_into().unwrap());
        assert_eq!(options, locate_flags::NOWAIT);

        // refresh is meaningless for other request types and must not
        // touch their bytes
        let mut stat = stat("/x", 0);
        let before = stat.bytes().to_vec();
        set_refresh(&mut stat);
        assert_eq!(stat.bytes(), &before[..]);
    }
}
