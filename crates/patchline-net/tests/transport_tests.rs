//! Integration tests for the GET-to-file transport

use patchline_net::{CancelToken, Error, Transport, UserAgent};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_user_agent() -> UserAgent {
    UserAgent {
        local_game: "Shell".to_string(),
        updater_version: "2.0".to_string(),
        game_version: "1.0".to_string(),
        host_version: "3.0".to_string(),
    }
}

#[tokio::test]
async fn downloads_body_with_progress() {
    let server = MockServer::start().await;
    let body = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/files/game.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("game.dat");
    let mut transport = Transport::new(&test_user_agent()).expect("transport");

    let mut last_seen = 0u64;
    let written = transport
        .download_to_file(
            &format!("{}/files/game.dat", server.uri()),
            &dest,
            |bytes, total| {
                assert!(bytes >= last_seen, "progress must be monotonic");
                assert_eq!(total, Some(64 * 1024));
                last_seen = bytes;
            },
            &CancelToken::new(),
        )
        .await
        .expect("download");

    assert_eq!(written, 64 * 1024);
    assert_eq!(last_seen, 64 * 1024);
    assert_eq!(std::fs::read(&dest).expect("read"), body);
}

#[tokio::test]
async fn sends_user_agent_and_cache_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .and(header("User-Agent", "Shell Updater/2.0 Game/1.0 Client/3.0"))
        .and(header("Cache-Control", "no-cache, no-store"))
        .and(header("Pragma", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[DTA]\nVersion=1.0\n"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("version_u");
    let mut transport = Transport::new(&test_user_agent()).expect("transport");
    transport
        .download_to_file(
            &format!("{}/version", server.uri()),
            &dest,
            |_, _| {},
            &CancelToken::new(),
        )
        .await
        .expect("download");
}

#[tokio::test]
async fn server_error_removes_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("version_u");
    let mut transport = Transport::new(&test_user_agent()).expect("transport");
    let result = transport
        .download_to_file(
            &format!("{}/version", server.uri()),
            &dest,
            |_, _| {},
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(result, Err(Error::HttpStatus { status: 500, .. })));
    assert!(!dest.exists());
}

#[tokio::test]
async fn pre_cancelled_token_aborts_before_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("out");
    let token = CancelToken::new();
    token.cancel();

    let mut transport = Transport::new(&test_user_agent()).expect("transport");
    let result = transport
        .download_to_file(&format!("{}/x", server.uri()), &dest, |_, _| {}, &token)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!dest.exists());
}
