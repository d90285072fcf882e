#![warn(missing_docs)]

//! Wire-level layer of the XRD client.
//!
//! This crate knows how bytes are laid out on the wire and nothing else:
//! protocol constants, the [`Message`] byte buffer, request marshalling,
//! response unmarshalling, the framed socket codec, the handshake/login
//! exchange and the typed objects a decoded response turns into. Routing,
//! retries and recovery policy live in `xrd-client`.

pub mod codec;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod info;
pub mod message;
pub mod request;
pub mod response;

pub use error::ProtoError;
pub use message::Message;
