#![allow(dead_code)]

//! A scripted XRootD endpoint for integration tests: accepts
//! connections, performs the server side of the handshake and answers
//! requests according to a test-supplied script.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use xrd_proto::constants::status;

/// A request as seen on the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub sid: u16,
    pub req_id: u16,
    pub body: [u8; 16],
    pub payload: Vec<u8>,
}

impl RawRequest {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// One scripted reaction to a request.
pub enum Reply {
    /// Send a frame.
    Frame(Vec<u8>),
    /// Sleep before processing the remaining replies.
    Delay(Duration),
    /// Drop the connection.
    Shutdown,
}

pub type Script = Arc<dyn Fn(&RawRequest) -> Vec<Reply> + Send + Sync>;

pub struct MockServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RawRequest>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Spawn an endpoint reporting `flags` as its role and answering with
    /// `script`.
    pub async fn spawn(flags: u32, script: Script) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<RawRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((conn, _)) = listener.accept().await else {
                    return;
                };
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(conn, flags, script, log).await;
                });
            }
        });

        MockServer {
            addr,
            requests,
            handle,
        }
    }

    /// `root://127.0.0.1:port` for this endpoint.
    pub fn url(&self) -> String {
        format!("root://{}", self.addr)
    }

    /// `host:port` as it appears in locate entries.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Number of requests of the given kind seen so far.
    pub fn count(&self, req_id: u16) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.req_id == req_id)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut conn: TcpStream,
    flags: u32,
    script: Script,
    log: Arc<Mutex<Vec<RawRequest>>>,
) -> std::io::Result<()> {
    use xrd_proto::constants::{handshake, server_flags};

    // Client hello plus the piggy-backed protocol request.
    let mut hello = [0u8; 44];
    conn.read_exact(&mut hello).await?;

    let server_type = if flags & server_flags::IS_SERVER != 0 {
        handshake::DATA_SERVER
    } else {
        handshake::LOAD_BALANCER
    };
    let mut server_hello = vec![0u8; 16];
    server_hello[4..8].copy_from_slice(&8u32.to_be_bytes());
    server_hello[8..12].copy_from_slice(&0x297u32.to_be_bytes());
    server_hello[12..16].copy_from_slice(&server_type.to_be_bytes());
    conn.write_all(&server_hello).await?;

    let proto_sid = u16::from_be_bytes([hello[20], hello[21]]);
    let mut proto_body = 0x297u32.to_be_bytes().to_vec();
    proto_body.extend_from_slice(&flags.to_be_bytes());
    conn.write_all(&frame(proto_sid, status::OK, &proto_body)).await?;

    let mut login = [0u8; 24];
    conn.read_exact(&mut login).await?;
    let login_sid = u16::from_be_bytes([login[0], login[1]]);
    conn.write_all(&frame(login_sid, status::OK, &[7u8; 16])).await?;

    // Request loop.
    loop {
        let mut header = [0u8; 24];
        conn.read_exact(&mut header).await?;
        let dlen = u32::from_be_bytes(header[20..24].try_into().unwrap()) as usize;
        let mut payload = vec![0u8; dlen];
        if dlen > 0 {
            conn.read_exact(&mut payload).await?;
        }
        let request = RawRequest {
            sid: u16::from_be_bytes([header[0], header[1]]),
            req_id: u16::from_be_bytes([header[2], header[3]]),
            body: header[4..20].try_into().unwrap(),
            payload,
        };
        let replies = script(&request);
        log.lock().unwrap().push(request);

        for reply in replies {
            match reply {
                Reply::Frame(bytes) => conn.write_all(&bytes).await?,
                Reply::Delay(delay) => tokio::time::sleep(delay).await,
                Reply::Shutdown => return Ok(()),
            }
        }
    }
}

//------------------------------------------------------------------------
// Frame builders
//------------------------------------------------------------------------

pub fn frame(sid: u16, status: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&sid.to_be_bytes());
    out.extend_from_slice(&status.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn ok(sid: u16, body: &[u8]) -> Vec<u8> {
    frame(sid, status::OK, body)
}

pub fn oksofar(sid: u16, body: &[u8]) -> Vec<u8> {
    frame(sid, status::OKSOFAR, body)
}

pub fn error(sid: u16, code: u32, text: &str) -> Vec<u8> {
    let mut body = (code as i32).to_be_bytes().to_vec();
    body.extend_from_slice(text.as_bytes());
    body.push(0);
    frame(sid, status::ERROR, &body)
}

pub fn redirect(sid: u16, port: u16, target: &str) -> Vec<u8> {
    let mut body = (port as i32).to_be_bytes().to_vec();
    body.extend_from_slice(target.as_bytes());
    frame(sid, status::REDIRECT, &body)
}

pub fn wait(sid: u16, seconds: u32, text: &str) -> Vec<u8> {
    let mut body = (seconds as i32).to_be_bytes().to_vec();
    body.extend_from_slice(text.as_bytes());
    frame(sid, status::WAIT, &body)
}

pub fn waitresp(sid: u16, seconds: u32) -> Vec<u8> {
    frame(sid, status::WAITRESP, &(seconds as i32).to_be_bytes())
}

/// Wrap a complete response frame into an `attn`/`asynresp` carrier.
pub fn asynresp(inner: Vec<u8>) -> Vec<u8> {
    let mut body = 5008i32.to_be_bytes().to_vec();
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(&inner);
    frame(0, status::ATTN, &body)
}

/// An open response body: file handle, compression info, optional stat
/// text.
pub fn open_body(fhandle: [u8; 4], stat: Option<&str>) -> Vec<u8> {
    let mut body = fhandle.to_vec();
    if let Some(stat) = stat {
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(stat.as_bytes());
    }
    body
}

/// A readv response body matching the requested records, with `fill`
/// producing each chunk's data.
pub fn readv_body(payload: &[u8], fill: impl Fn(u64, u32) -> Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    for record in payload.chunks_exact(16) {
        let rlen = i32::from_be_bytes(record[4..8].try_into().unwrap()) as u32;
        let offset = i64::from_be_bytes(record[8..16].try_into().unwrap()) as u64;
        out.extend_from_slice(&record[0..4]);
        out.extend_from_slice(&(rlen as i32).to_be_bytes());
        out.extend_from_slice(&(offset as i64).to_be_bytes());
        let data = fill(offset, rlen);
        assert_eq!(data.len(), rlen as usize);
        out.extend_from_slice(&data);
    }
    out
}

/// A post master over a fresh environment with test-friendly tunables.
pub fn test_post_master() -> Arc<xrd_client::PostMaster> {
    let env = xrd_client::env::Env::with_defaults();
    env.put_int("ConnectionWindow", 5);
    env.put_int("ConnectionRetry", 1);
    env.put_int("StreamErrorWindow", 0);
    xrd_client::PostMaster::new(Arc::new(env))
}
