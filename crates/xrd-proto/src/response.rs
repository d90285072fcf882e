//! Response unmarshalling.
//!
//! A response frame is an 8-byte header followed by a status-specific body.
//! The helpers here turn raw bodies into structured views; interpretation
//! of an `ok` body depends on the request that solicited it and lives with
//! the typed objects in [`crate::info`].

use crate::constants::RESPONSE_HEADER_SIZE;
use crate::error::ProtoError;
use crate::message::Message;

/// Body of an `error` response: a server error code and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// Server error code (`errcode` module values).
    pub code: u32,
    /// Human-readable explanation from the server.
    pub message: String,
}

/// Decode the body of an `error` response.
pub fn error_body(msg: &Message) -> Result<ErrorBody, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 4 {
        return Err(ProtoError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    let code = i32::from_be_bytes(body[0..4].try_into().unwrap()) as u32;
    let text = &body[4..];
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    Ok(ErrorBody {
        code,
        message: String::from_utf8_lossy(&text[..end]).into_owned(),
    })
}

/// Body of a `redirect` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectBody {
    /// Port to connect to.
    pub port: i32,
    /// `host` optionally followed by `?cgi`.
    pub target: String,
}

/// Decode the body of a `redirect` response.
pub fn redirect_body(msg: &Message) -> Result<RedirectBody, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 4 {
        return Err(ProtoError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    let port = i32::from_be_bytes(body[0..4].try_into().unwrap());
    Ok(RedirectBody {
        port,
        target: String::from_utf8_lossy(&body[4..]).into_owned(),
    })
}

/// Body of a `wait` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitBody {
    /// Seconds to wait before re-issuing the request.
    pub seconds: u32,
    /// Informational message from the server.
    pub info: String,
}

/// Decode the body of a `wait` response.
pub fn wait_body(msg: &Message) -> Result<WaitBody, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 4 {
        return Err(ProtoError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    Ok(WaitBody {
        seconds: i32::from_be_bytes(body[0..4].try_into().unwrap()) as u32,
        info: String::from_utf8_lossy(&body[4..]).into_owned(),
    })
}

/// Decode the seconds field of a `waitresp` response.
pub fn waitresp_seconds(msg: &Message) -> Result<u32, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 4 {
        return Err(ProtoError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    Ok(i32::from_be_bytes(body[0..4].try_into().unwrap()) as u32)
}

/// Decode the action code of an `attn` response.
pub fn attn_action(msg: &Message) -> Result<u32, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 4 {
        return Err(ProtoError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    Ok(i32::from_be_bytes(body[0..4].try_into().unwrap()) as u32)
}

/// Extract the response embedded in an `attn`/`asynresp` frame.
///
/// The embedded frame starts at byte 16 of the carrier (8-byte header,
/// 4-byte action code, 4 reserved bytes) and spans `dlen - 8` bytes. The
/// extracted message keeps the carrier's session id.
pub fn attn_embedded(msg: &Message) -> Result<Message, ProtoError> {
    let total = msg.resp_dlen() as usize;
    if total < 8 + RESPONSE_HEADER_SIZE || msg.len() < 16 + RESPONSE_HEADER_SIZE {
        return Err(ProtoError::MalformedBody("asynresp carrier too short"));
    }
    let embedded_len = total - 8;
    if msg.len() < 16 + embedded_len {
        return Err(ProtoError::MalformedBody("asynresp body truncated"));
    }
    let mut embedded = Message::from_bytes(msg.bytes()[16..16 + embedded_len].to_vec());
    embedded.set_session_id(msg.session_id());
    Ok(embedded)
}

/// Body of a `protocol` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolBody {
    /// Binary protocol version of the server.
    pub version: u32,
    /// Server role and attribute flags.
    pub flags: u32,
}

/// Decode the body of a `protocol` response.
pub fn protocol_body(msg: &Message) -> Result<ProtocolBody, ProtoError> {
    let body = msg.resp_body();
    if body.len() < 8 {
        return Err(ProtoError::TooShort {
            expected: 8,
            actual: body.len(),
        });
    }
    Ok(ProtocolBody {
        version: u32::from_be_bytes(body[0..4].try_into().unwrap()),
        flags: u32::from_be_bytes(body[4..8].try_into().unwrap()),
    })
}

/// Decode the 16-byte session token of a `login` response.
pub fn login_session(msg: &Message) -> Result<[u8; 16], ProtoError> {
    let body = msg.resp_body();
    if body.len() < 16 {
        return Err(ProtoError::TooShort {
            expected: 16,
            actual: body.len(),
        });
    }
    let mut session = [0u8; 16];
    session.copy_from_slice(&body[0..16]);
    Ok(session)
}

/// One record of a `readv` response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk<'a> {
    /// Length the server read.
    pub rlen: u32,
    /// Offset the server read at.
    pub offset: u64,
    /// The data itself.
    pub data: &'a [u8],
}

/// Iterate the `{fhandle[4] rlen[4] offset[8]} data` records of a `readv`
/// body. Iteration stops before a trailing fragment shorter than a record
/// header, matching the server's framing rules.
pub fn readv_records(body: &[u8]) -> ReadvRecords<'_> {
    ReadvRecords { body, pos: 0 }
}

/// Iterator over [`RawChunk`]s; see [`readv_records`].
#[derive(Debug)]
pub struct ReadvRecords<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for ReadvRecords<'a> {
    type Item = Result<RawChunk<'a>, ProtoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 16 > self.body.len() {
            return None;
        }
        let header = &self.body[self.pos..self.pos + 16];
        let rlen = i32::from_be_bytes(header[4..8].try_into().unwrap()) as u32;
        let offset = i64::from_be_bytes(header[8..16].try_into().unwrap()) as u64;
        let start = self.pos + 16;
        let end = start + rlen as usize;
        if end > self.body.len() {
            self.pos = self.body.len();
            return Some(Err(ProtoError::MalformedBody(
                "readv record data truncated",
            )));
        }
        self.pos = end;
        Some(Ok(RawChunk {
            rlen,
            offset,
            data: &self.body[start..end],
        }))
    }
}
