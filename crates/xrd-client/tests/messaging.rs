//! End-to-end exercises of the messaging runtime against scripted
//! endpoints: round trips, redirects, waits, partial responses, error
//! recovery, expiration.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use support::{MockServer, Reply, Script};
use xrd_client::msghandler::SendParams;
use xrd_client::{dispatch, ErrorKind, File, FileSystem, Response, Url};
use xrd_proto::constants::{errcode, server_flags, RequestId};
use xrd_proto::request;

fn script(f: impl Fn(&support::RawRequest) -> Vec<Reply> + Send + Sync + 'static) -> Script {
    Arc::new(f)
}

#[tokio::test]
async fn ping_round_trip() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| {
            assert_eq!(req.req_id, RequestId::Ping as u16);
            assert!(req.payload.is_empty());
            vec![Reply::Frame(support::ok(req.sid, &[]))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&server.url(), post.clone()).unwrap();
    fs.ping().await.unwrap();
    assert_eq!(server.count(RequestId::Ping as u16), 1);
    post.stop();
}

#[tokio::test]
async fn redirect_chase_records_hosts_and_load_balancer() {
    let data = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => vec![Reply::Frame(support::ok(
                req.sid,
                &support::open_body([0xde, 0xad, 0xbe, 0xef], Some("8379 1024 51 1318341350")),
            ))],
            Some(RequestId::Close) => {
                assert_eq!(&req.body[0..4], &[0xde, 0xad, 0xbe, 0xef]);
                vec![Reply::Frame(support::ok(req.sid, &[]))]
            }
            _ => vec![Reply::Frame(support::error(req.sid, errcode::INVALID_REQUEST, "?"))],
        }),
    )
    .await;

    let data_port = data.addr.port();
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(move |req| {
            assert_eq!(req.req_id, RequestId::Open as u16);
            vec![Reply::Frame(support::redirect(req.sid, data_port, "127.0.0.1"))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/data/f", manager.url()), 0, 0)
        .await
        .unwrap();

    assert!(file.is_open());
    assert_eq!(file.cached_stat().unwrap().size, 1024);
    assert_eq!(
        file.data_server().unwrap().host_id(),
        format!("127.0.0.1:{data_port}")
    );
    // the redirecting manager was promoted to load-balancer
    assert_eq!(
        file.load_balancer().unwrap().host_id(),
        format!("127.0.0.1:{}", manager.addr.port())
    );

    file.close().await.unwrap();
    assert!(!file.is_open());
    assert_eq!(data.count(RequestId::Close as u16), 1);
    post.stop();
}

#[tokio::test]
async fn oksofar_bodies_are_concatenated_in_order() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => vec![Reply::Frame(support::ok(
                req.sid,
                &support::open_body([1, 2, 3, 4], Some("1 8 51 0")),
            ))],
            Some(RequestId::Read) => vec![
                Reply::Frame(support::oksofar(req.sid, b"abc")),
                Reply::Frame(support::ok(req.sid, b"defgh")),
            ],
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/f", server.url()), 0, 0).await.unwrap();

    let chunk = file.read(0, 8).await.unwrap();
    assert_eq!(chunk.offset, 0);
    assert_eq!(chunk.length, 8);
    assert_eq!(chunk.data, b"abcdefgh");
    post.stop();
}

#[tokio::test]
async fn read_overflowing_the_buffer_is_invalid() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => {
                vec![Reply::Frame(support::ok(req.sid, &support::open_body([1, 2, 3, 4], None)))]
            }
            Some(RequestId::Read) => {
                vec![Reply::Frame(support::ok(req.sid, b"way too many bytes"))]
            }
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/f", server.url()), 0, 0).await.unwrap();

    let err = file.read(0, 4).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidResponse);
    post.stop();
}

#[tokio::test]
async fn wait_then_retry_same_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_script = calls.clone();
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(move |req| {
            assert_eq!(req.req_id, RequestId::Mv as u16);
            assert_eq!(req.payload_text(), "/a /b");
            match calls_in_script.fetch_add(1, Ordering::SeqCst) {
                0 => vec![Reply::Frame(support::wait(req.sid, 1, "busy"))],
                _ => vec![Reply::Frame(support::ok(req.sid, &[]))],
            }
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&server.url(), post.clone()).unwrap();
    let started = Instant::now();
    fs.mv("/a", "/b").await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // both attempts carried the same stream id
    let requests = server.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].sid, requests[1].sid);
    post.stop();
}

#[tokio::test]
async fn waitresp_is_answered_through_asynresp() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| {
            assert_eq!(req.req_id, RequestId::Stat as u16);
            vec![
                Reply::Frame(support::waitresp(req.sid, 5)),
                Reply::Delay(Duration::from_millis(100)),
                Reply::Frame(support::asynresp(support::ok(
                    req.sid,
                    b"8379 1048576000 51 1318341350",
                ))),
            ]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&server.url(), post.clone()).unwrap();
    let info = fs.stat("/x").await.unwrap();
    assert_eq!(info.size, 1048576000);
    post.stop();
}

#[tokio::test]
async fn not_found_is_recovered_at_the_load_balancer() {
    // The data server fails every stat with NotFound.
    let data = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| {
            assert_eq!(req.req_id, RequestId::Stat as u16);
            vec![Reply::Frame(support::error(req.sid, errcode::NOT_FOUND, "not found"))]
        }),
    )
    .await;

    // The manager redirects the first stat, then serves the retried one.
    let data_port = data.addr.port();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_script = calls.clone();
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(move |req| {
            assert_eq!(req.req_id, RequestId::Stat as u16);
            match calls_in_script.fetch_add(1, Ordering::SeqCst) {
                0 => vec![Reply::Frame(support::redirect(req.sid, data_port, "127.0.0.1"))],
                _ => {
                    assert!(req.payload_text().contains("tried=127.0.0.1"));
                    vec![Reply::Frame(support::ok(req.sid, b"8379 1048576000 51 1318341350"))]
                }
            }
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&manager.url(), post.clone()).unwrap();
    let info = fs.stat("/x").await.unwrap();
    assert_eq!(info.size, 1048576000);

    // the host was recorded in tried= exactly once
    let requests = manager.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let retried = requests[1].payload_text();
    assert_eq!(retried.matches("tried=").count(), 1);
    assert_eq!(retried.matches("127.0.0.1").count(), 1);
    post.stop();
}

#[tokio::test]
async fn error_at_the_load_balancer_itself_is_surfaced() {
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(|req| {
            assert_eq!(req.req_id, RequestId::Locate as u16);
            vec![Reply::Frame(support::error(req.sid, errcode::NOT_FOUND, "nope"))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&manager.url(), post.clone()).unwrap();
    let err = fs.locate("/x", 0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ErrorResponse);
    assert_eq!(err.errno, errcode::NOT_FOUND);
    assert_eq!(manager.count(RequestId::Locate as u16), 1);
    post.stop();
}

#[tokio::test]
async fn redirect_limit_terminates_the_chase() {
    let port = Arc::new(AtomicUsize::new(0));
    let port_in_script = port.clone();
    let server = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(move |req| {
            let own_port = port_in_script.load(Ordering::SeqCst) as u16;
            vec![Reply::Frame(support::redirect(req.sid, own_port, "127.0.0.1"))]
        }),
    )
    .await;
    port.store(server.addr.port() as usize, Ordering::SeqCst);

    let post = support::test_post_master();
    let url = Url::parse(&format!("{}/f", server.url())).unwrap();
    let outcome = dispatch::send_request_async(
        &post,
        &url,
        request::locate("/f", 0),
        &SendParams {
            redirect_limit: 4,
            ..SendParams::default()
        },
    )
    .await
    .unwrap();

    assert!(!outcome.status.is_ok());
    assert_eq!(outcome.status.kind, ErrorKind::RedirectLimit);
    assert!(outcome.status.is_fatal());
    // initial attempt plus the four allowed redirects
    assert_eq!(server.count(RequestId::Locate as u16), 5);
    post.stop();
}

#[tokio::test]
async fn redirect_can_be_returned_as_the_answer() {
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(|req| {
            vec![Reply::Frame(support::redirect(
                req.sid,
                1094,
                "disk7.example.org?cms.sel=1",
            ))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let url = Url::parse(&format!("{}/f", manager.url())).unwrap();
    let outcome = dispatch::send_request_async(
        &post,
        &url,
        request::locate("/f", 0),
        &SendParams {
            redirect_as_answer: true,
            ..SendParams::default()
        },
    )
    .await
    .unwrap();

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.status.kind, ErrorKind::XrdRedirect);
    match outcome.response {
        Response::Redirect(info) => {
            assert_eq!(info.host, "disk7.example.org");
            assert_eq!(info.port, 1094);
            assert_eq!(info.cgi, "cms.sel=1");
        }
        other => panic!("expected a redirect, got {other:?}"),
    }
    post.stop();
}

#[tokio::test]
async fn session_bound_requests_fail_after_disconnect() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => vec![
                Reply::Frame(support::ok(req.sid, &support::open_body([9, 9, 9, 9], None))),
                Reply::Shutdown,
            ],
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/f", server.url()), 0, 0).await.unwrap();

    // give the client a moment to notice the connection is gone
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = file.read(0, 16).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSession);
    assert_eq!(server.count(RequestId::Read as u16), 0);
    post.stop();
}

#[tokio::test]
async fn expired_requests_quarantine_their_sid_until_the_late_reply() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| {
            vec![
                Reply::Delay(Duration::from_secs(3)),
                Reply::Frame(support::ok(req.sid, &[])),
            ]
        }),
    )
    .await;

    let env = xrd_client::env::Env::with_defaults();
    env.put_int("RequestTimeout", 1);
    env.put_int("TimeoutResolution", 1);
    let post = xrd_client::PostMaster::new(Arc::new(env));
    let fs = FileSystem::with_post(&server.url(), post.clone()).unwrap();

    let err = fs.ping().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::OperationExpired);

    let info = post
        .query_transport(&Url::parse(&server.url()).unwrap())
        .unwrap();
    assert_eq!(info.sid_manager().timed_out_count(), 1);

    // the straggling reply lifts the quarantine
    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert_eq!(info.sid_manager().timed_out_count(), 0);
    post.stop();
}
