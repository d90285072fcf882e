//! Name resolution and bounded non-blocking connects.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::TcpStream;

use crate::status::{ErrorKind, XRootDStatus, XrdResult};
use crate::url::Url;

/// Resolve a URL's host to its addresses. The order is the resolver's;
/// the connect loop walks it from the back.
pub async fn resolve(url: &Url) -> XrdResult<Vec<SocketAddr>> {
    let host = url.host().trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, url.port()))
        .await
        .map_err(|err| {
            XRootDStatus::error(ErrorKind::InvalidAddr)
                .with_message(format!("{}: {err}", url.host()))
        })?
        .collect();
    if addrs.is_empty() {
        return Err(XRootDStatus::error(ErrorKind::InvalidAddr)
            .with_message(format!("no addresses for {}", url.host())));
    }
    tracing::debug!(target: "xrd::post", host = %url.host_id(), count = addrs.len(),
        addresses = ?addrs, "resolved");
    Ok(addrs)
}

/// Connect to `addr`, giving up at `deadline`.
pub async fn connect(addr: SocketAddr, deadline: Instant) -> XrdResult<TcpStream> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(XRootDStatus::error(ErrorKind::ConnectionError)
            .with_message("connection window elapsed"));
    }
    match tokio::time::timeout(remaining, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).map_err(|err| {
                XRootDStatus::error(ErrorKind::SocketError).with_message(err.to_string())
            })?;
            tracing::debug!(target: "xrd::post", %addr, "connected");
            Ok(stream)
        }
        Ok(Err(err)) => Err(XRootDStatus::error(ErrorKind::ConnectionError)
            .with_message(format!("{addr}: {err}"))),
        Err(_) => Err(XRootDStatus::error(ErrorKind::SocketTimeout)
            .with_message(format!("{addr}: connect timed out"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolve_localhost() {
        let url = Url::parse("root://127.0.0.1:1094/x").unwrap();
        let addrs = resolve(&url).await.unwrap();
        assert!(!addrs.is_empty());
        assert_eq!(addrs[0].port(), 1094);
    }

    #[tokio::test]
    async fn resolve_failure_is_invalid_addr() {
        let url = Url::parse("root://no-such-host.invalid./x").unwrap();
        let err = resolve(&url).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAddr);
    }

    #[tokio::test]
    async fn connect_to_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let stream = connect(addr, deadline).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn elapsed_window_fails_fast() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let err = connect(addr, Instant::now()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionError);
    }
}
