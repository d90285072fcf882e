//! The connection establishment exchange.
//!
//! A freshly connected sub-stream sends a fixed 20-byte hello with a
//! `protocol` request piggy-backed behind it, reads the 16-byte server
//! hello, reads the `protocol` response, then logs in. An [`AuthHandler`]
//! may continue the exchange after login; the default does nothing.

use crate::constants::{RequestId, LOGIN_CAPVER, LOGIN_ROLE_USER, REQUEST_HEADER_SIZE};
use crate::error::ProtoError;
use crate::message::Message;

/// Length of the client hello.
pub const CLIENT_HELLO_LEN: usize = 20;

/// Length of the server hello.
pub const SERVER_HELLO_LEN: usize = 16;

/// Build the 20-byte client hello with a `protocol` request appended, so
/// both can go out in a single write.
pub fn client_hello(client_protocol_version: u32) -> Vec<u8> {
    let mut out = vec![0u8; CLIENT_HELLO_LEN];
    out[12..16].copy_from_slice(&4i32.to_be_bytes());
    out[16..20].copy_from_slice(&2012i32.to_be_bytes());
    out.extend_from_slice(crate::request::protocol(client_protocol_version).bytes());
    out
}

/// Decoded server hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHello {
    /// Binary protocol version of the server.
    pub protocol_version: u32,
    /// Endpoint type, see [`crate::constants::handshake`].
    pub server_type: u32,
}

/// Decode the 16-byte server hello: an 8-byte ok header with `dlen = 8`,
/// then the protocol version and the endpoint type.
pub fn parse_server_hello(data: &[u8]) -> Result<ServerHello, ProtoError> {
    if data.len() < SERVER_HELLO_LEN {
        return Err(ProtoError::TooShort {
            expected: SERVER_HELLO_LEN,
            actual: data.len(),
        });
    }
    let status = u16::from_be_bytes([data[2], data[3]]);
    let dlen = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if status != 0 || dlen != 8 {
        return Err(ProtoError::HandshakeFailed("invalid server hello"));
    }
    Ok(ServerHello {
        protocol_version: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        server_type: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
    })
}

/// Build a `login` request.
pub fn login(pid: u32, username: &str) -> Message {
    let mut msg = Message::new(REQUEST_HEADER_SIZE);
    msg.bytes_mut()[2..4].copy_from_slice(&(RequestId::Login as u16).to_be_bytes());
    msg.bytes_mut()[4..8].copy_from_slice(&(pid as i32).to_be_bytes());
    let name = username.as_bytes();
    let take = name.len().min(8);
    msg.bytes_mut()[8..8 + take].copy_from_slice(&name[..take]);
    msg.bytes_mut()[18] = LOGIN_CAPVER;
    msg.bytes_mut()[19] = LOGIN_ROLE_USER;
    msg.set_cursor(REQUEST_HEADER_SIZE);
    msg.set_description(format!("login as {username}"));
    msg
}

/// The state handed to an [`AuthHandler`] between exchange steps.
#[derive(Debug)]
pub struct HandShakeData {
    /// Step counter, starting at zero after login.
    pub step: u32,
    /// The last inbound message, if any.
    pub inbound: Option<Message>,
    /// `host:port` of the endpoint.
    pub host_id: String,
    /// Stream the exchange runs on.
    pub stream_id: u16,
    /// Sub-stream the exchange runs on.
    pub sub_stream_id: u16,
    /// Name the client logged in with.
    pub client_name: String,
}

/// Pluggable continuation of the handshake after login.
///
/// Called repeatedly with the exchange state; returning a message sends it
/// and feeds the reply back in the next call, returning `None` completes
/// the handshake.
pub trait AuthHandler: Send + Sync + 'static {
    /// Produce the next outgoing message of the exchange, or `None` when
    /// the exchange is complete.
    fn next(&self, data: &mut HandShakeData) -> Result<Option<Message>, ProtoError>;
}

/// The default [`AuthHandler`]: no exchange beyond login.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthHandler for NoAuth {
    fn next(&self, _data: &mut HandShakeData) -> Result<Option<Message>, ProtoError> {
        Ok(None)
    }
}
