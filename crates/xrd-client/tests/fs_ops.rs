//! Facade-level exercises: deep locate, directory listings with their
//! fan-outs, vector reads.

mod support;

use std::sync::Arc;

use support::{MockServer, Reply, Script};
use xrd_client::fs::dirlist_flags;
use xrd_client::{ErrorKind, File, FileSystem};
use xrd_proto::constants::{errcode, server_flags, RequestId};
use xrd_proto::request::Chunk;

fn script(f: impl Fn(&support::RawRequest) -> Vec<Reply> + Send + Sync + 'static) -> Script {
    Arc::new(f)
}

const MB: u64 = 1024 * 1024;

#[tokio::test]
async fn deep_locate_resolves_managers_to_servers() {
    // Leaf manager knowing one more server.
    let leaf = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(|req| {
            assert_eq!(req.req_id, RequestId::Locate as u16);
            vec![Reply::Frame(support::ok(req.sid, b"Swserver2.example.org:1094"))]
        }),
    )
    .await;

    // Head manager: one direct server, one manager to descend into, and
    // a duplicate of the leaf's server to be dropped.
    let leaf_address = leaf.address();
    let head = MockServer::spawn(
        server_flags::IS_MANAGER | server_flags::ATTR_META,
        script(move |req| {
            assert_eq!(req.req_id, RequestId::Locate as u16);
            let body = format!(
                "Swserver1.example.org:1094 Mr{leaf_address} Swserver2.example.org:1094"
            );
            vec![Reply::Frame(support::ok(req.sid, body.as_bytes()))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&head.url(), post.clone()).unwrap();
    let info = fs.deep_locate("/data/f", 0).await.unwrap();

    let mut addresses: Vec<&str> = info
        .locations
        .iter()
        .map(|l| l.address.as_str())
        .collect();
    addresses.sort_unstable();
    assert_eq!(
        addresses,
        vec!["server1.example.org:1094", "server2.example.org:1094"]
    );
    assert!(info.locations.iter().all(|l| l.is_server()));
    assert_eq!(leaf.count(RequestId::Locate as u16), 1);
    post.stop();
}

#[tokio::test]
async fn deep_locate_with_no_servers_reports_not_found() {
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(|req| vec![Reply::Frame(support::ok(req.sid, b""))]),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&manager.url(), post.clone()).unwrap();
    let err = fs.deep_locate("/gone", 0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ErrorResponse);
    assert_eq!(err.errno, errcode::NOT_FOUND);
    post.stop();
}

fn listing_server(entries: &'static str) -> Script {
    script(move |req| match xrd_proto::constants::RequestId::from_u16(req.req_id) {
        Some(RequestId::Dirlist) => {
            vec![Reply::Frame(support::ok(req.sid, entries.as_bytes()))]
        }
        Some(RequestId::Stat) => {
            let size = req.payload_text().len() as u64 * 100;
            let body = format!("42 {size} 51 1318341350");
            vec![Reply::Frame(support::ok(req.sid, body.as_bytes()))]
        }
        _ => vec![],
    })
}

#[tokio::test]
async fn dirlist_backfills_stats_when_asked() {
    let server = MockServer::spawn(server_flags::IS_SERVER, listing_server("f1\nf2\nf3\n")).await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&server.url(), post.clone()).unwrap();

    let plain = fs.dirlist("/data", 0).await.unwrap();
    assert_eq!(plain.list.len(), 3);
    assert!(plain.list.entries.iter().all(|e| e.stat_info.is_none()));
    assert!(!plain.partial);

    let with_stats = fs.dirlist("/data", dirlist_flags::STAT).await.unwrap();
    assert_eq!(with_stats.list.len(), 3);
    assert!(!with_stats.partial);
    for entry in &with_stats.list.entries {
        let info = entry.stat_info.as_ref().unwrap();
        assert_eq!(info.size, format!("/data/{}", entry.name).len() as u64 * 100);
    }
    assert_eq!(server.count(RequestId::Stat as u16), 3);
    post.stop();
}

#[tokio::test]
async fn dirlist_with_locate_merges_per_server_listings() {
    let s1 = MockServer::spawn(server_flags::IS_SERVER, listing_server("a\nb\n")).await;
    let s2 = MockServer::spawn(server_flags::IS_SERVER, listing_server("c\n")).await;

    let (a1, a2) = (s1.address(), s2.address());
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(move |req| {
            assert_eq!(req.req_id, RequestId::Locate as u16);
            assert!(req.payload_text().starts_with('*'));
            let body = format!("Sw{a1} Sw{a2}");
            vec![Reply::Frame(support::ok(req.sid, body.as_bytes()))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&manager.url(), post.clone()).unwrap();
    let listing = fs.dirlist("/data", dirlist_flags::LOCATE).await.unwrap();

    let mut names: Vec<&str> = listing.list.entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(!listing.partial);
    assert_eq!(listing.list.parent, "/data/");
    post.stop();
}

#[tokio::test]
async fn dirlist_fan_out_failure_is_partial() {
    let good = MockServer::spawn(server_flags::IS_SERVER, listing_server("a\n")).await;
    let bad = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| vec![Reply::Frame(support::error(req.sid, errcode::IO_ERROR, "disk on fire"))]),
    )
    .await;

    let (a1, a2) = (good.address(), bad.address());
    let manager = MockServer::spawn(
        server_flags::IS_MANAGER,
        script(move |req| {
            let body = format!("Sw{a1} Sw{a2}");
            vec![Reply::Frame(support::ok(req.sid, body.as_bytes()))]
        }),
    )
    .await;

    let post = support::test_post_master();
    let fs = FileSystem::with_post(&manager.url(), post.clone()).unwrap();
    let listing = fs.dirlist("/data", dirlist_flags::LOCATE).await.unwrap();
    assert_eq!(listing.list.len(), 1);
    assert!(listing.partial);
    post.stop();
}

fn pattern(offset: u64, length: u32) -> Vec<u8> {
    vec![(offset / (10 * MB)) as u8; length as usize]
}

#[tokio::test]
async fn vector_read_matches_chunks_element_wise() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => {
                vec![Reply::Frame(support::ok(req.sid, &support::open_body([1, 1, 1, 1], None)))]
            }
            Some(RequestId::Readv) => {
                let body = support::readv_body(&req.payload, pattern);
                vec![Reply::Frame(support::ok(req.sid, &body))]
            }
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/big", server.url()), 0, 0).await.unwrap();

    let chunks: Vec<Chunk> = (1..=40)
        .map(|i| Chunk {
            offset: i as u64 * 10 * MB,
            length: MB as u32,
        })
        .collect();
    let info = file.vector_read(chunks.clone()).await.unwrap();

    assert_eq!(info.size, 41943040);
    assert_eq!(info.chunks.len(), 40);
    for (decoded, requested) in info.chunks.iter().zip(&chunks) {
        assert_eq!(decoded.offset, requested.offset);
        assert_eq!(decoded.length, requested.length);
        assert_eq!(decoded.data, pattern(requested.offset, requested.length));
    }
    post.stop();
}

#[tokio::test]
async fn vector_read_mismatch_is_invalid_response() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => {
                vec![Reply::Frame(support::ok(req.sid, &support::open_body([1, 1, 1, 1], None)))]
            }
            Some(RequestId::Readv) => {
                // answer with a shifted offset
                let mut payload = req.payload.clone();
                let offset = i64::from_be_bytes(payload[8..16].try_into().unwrap());
                payload[8..16].copy_from_slice(&(offset + 1).to_be_bytes());
                let body = support::readv_body(&payload, |_, len| vec![0u8; len as usize]);
                vec![Reply::Frame(support::ok(req.sid, &body))]
            }
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());
    file.open(&format!("{}/big", server.url()), 0, 0).await.unwrap();

    let err = file
        .vector_read(vec![Chunk { offset: 4096, length: 512 }])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidResponse);
    post.stop();
}

#[tokio::test]
async fn file_state_machine_rejects_misuse() {
    let server = MockServer::spawn(
        server_flags::IS_SERVER,
        script(|req| match RequestId::from_u16(req.req_id) {
            Some(RequestId::Open) => {
                vec![Reply::Frame(support::ok(req.sid, &support::open_body([1, 2, 3, 4], None)))]
            }
            Some(RequestId::Close) => vec![Reply::Frame(support::ok(req.sid, &[]))],
            _ => vec![],
        }),
    )
    .await;

    let post = support::test_post_master();
    let file = File::new(post.clone());

    // I/O before open
    assert_eq!(
        file.read(0, 8).await.unwrap_err().kind,
        ErrorKind::InvalidOp
    );
    assert_eq!(file.close().await.unwrap_err().kind, ErrorKind::InvalidOp);

    file.open(&format!("{}/f", server.url()), 0, 0).await.unwrap();

    // double open
    assert_eq!(
        file.open(&format!("{}/f", server.url()), 0, 0)
            .await
            .unwrap_err()
            .kind,
        ErrorKind::InvalidOp
    );

    file.close().await.unwrap();
    assert!(!file.is_open());
    post.stop();
}
