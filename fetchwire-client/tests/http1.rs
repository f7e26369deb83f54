//! HTTP/1.x wire behavior against scripted in-memory servers.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use common::{client, ok, pair};
use fetchwire_client::{
    CancellationToken, Error, EventListener, HttpClient, Method, Request, RequestBody, StatusCode,
    Version,
};

#[tokio::test]
async fn test_content_length_body_and_connection_reuse() {
    let (client, transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let first = conn.read_request().await.unwrap();
        conn.write(ok("first")).await;
        let second = conn.read_request().await.unwrap();
        conn.write(ok("second")).await;
        (first, second)
    });

    let mut response = client
        .execute(Request::post("http://example.org/submit", "hello").unwrap())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "first");
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().idle, 1);

    let mut response = client
        .execute(Request::get("http://example.org/again").unwrap())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "second");

    let (first, second) = server_task.await.unwrap();
    assert_eq!(first.method, "POST");
    assert_eq!(first.header("content-length"), Some("5"));
    assert!(!first.chunked);
    assert_eq!(first.body, b"hello");
    assert_eq!(second.target, "/again");
    assert!(!second.has_header("content-length"));
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_unknown_length_body_is_chunked() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let request = conn.read_request().await.unwrap();
        conn.write(ok("")).await;
        request
    });

    let body = RequestBody::streaming(futures::stream::iter(vec![
        Ok(Bytes::from("hello ")),
        Ok(Bytes::from("chunked ")),
        Ok(Bytes::from("world")),
    ]));
    let request = Request::builder(Method::PUT, "http://example.org/upload")
        .unwrap()
        .with_body(body);
    client.execute(request).await.unwrap();

    let recorded = server_task.await.unwrap();
    assert!(recorded.chunked);
    assert!(!recorded.has_header("content-length"));
    assert_eq!(recorded.body, b"hello chunked world");
}

#[tokio::test]
async fn test_empty_post_sends_zero_length() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let request = conn.read_request().await.unwrap();
        conn.write(ok("")).await;
        request
    });

    client
        .execute(Request::post("http://example.org/", RequestBody::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(server_task.await.unwrap().header("content-length"), Some("0"));
}

#[tokio::test]
async fn test_http10_response_closes_connection() {
    let (client, transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        let closed = conn.is_closed_by_client().await;

        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write(ok("fresh")).await;
        closed
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.version(), Version::HTTP_10);
    assert_eq!(response.text().await.unwrap(), "ok");
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().idle, 0);

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "fresh");
    assert!(server_task.await.unwrap());
    assert_eq!(transport.connect_count(), 2);
}

#[tokio::test]
async fn test_connection_close_header_is_honored() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .await;
        conn
    });

    let response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().open, 0);
}

#[tokio::test]
async fn test_http10_request_line() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let request = conn.read_request().await.unwrap();
        conn.write("HTTP/1.0 204 No Content\r\n\r\n").await;
        request
    });

    let request = Request::get("http://example.org/")
        .unwrap()
        .with_versions(vec![Version::HTTP_10]);
    client.execute(request).await.unwrap();
    assert_eq!(server_task.await.unwrap().version, 0);
}

#[tokio::test]
async fn test_http10_request_is_not_pooled_after_http11_response() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let request = conn.read_request().await.unwrap();
        conn.write(ok("old")).await;
        (request, conn.is_closed_by_client().await)
    });

    let request = Request::get("http://example.org/")
        .unwrap()
        .with_versions(vec![Version::HTTP_10]);
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "old");
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().idle, 0);

    let (request, closed) = server_task.await.unwrap();
    assert_eq!(request.version, 0);
    assert!(!request.has_header("connection"));
    assert!(closed);
}

#[tokio::test]
async fn test_http10_rejects_streaming_body_of_unknown_length() {
    let (client, transport, _server) = client();
    let body = RequestBody::streaming(futures::stream::iter(vec![Ok(Bytes::from("x"))]));
    let request = Request::builder(Method::POST, "http://example.org/")
        .unwrap()
        .with_versions(vec![Version::HTTP_10])
        .with_body(body);

    let err = client.execute(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_trace_never_sends_body_or_credentials() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        let request = conn.read_request().await.unwrap();
        conn.write(ok("")).await;
        request
    });

    let request = Request::builder(Method::TRACE, "http://example.org/")
        .unwrap()
        .with_body("secret body")
        .with_header("authorization", "Basic abc")
        .unwrap()
        .with_header("proxy-authorization", "Basic def")
        .unwrap()
        .with_header("cookie", "sid=1")
        .unwrap()
        .with_header("x-keep", "yes")
        .unwrap();
    client.execute(request).await.unwrap();

    let recorded = server_task.await.unwrap();
    assert_eq!(recorded.method, "TRACE");
    assert!(recorded.body.is_empty());
    for name in [
        "authorization",
        "proxy-authorization",
        "cookie",
        "content-length",
        "transfer-encoding",
    ] {
        assert!(!recorded.has_header(name), "{name} reached the wire");
    }
    assert_eq!(recorded.header("x-keep"), Some("yes"));
}

#[tokio::test]
async fn test_host_header_omits_default_port() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..2 {
            let mut conn = server.accept().await;
            seen.push(conn.read_request().await.unwrap());
            conn.write(ok("")).await;
        }
        seen
    });

    for uri in ["http://Example.org:80/a", "http://example.org:8080/b"] {
        client.execute(Request::get(uri).unwrap()).await.unwrap();
    }

    let seen = server_task.await.unwrap();
    assert_eq!(seen[0].header_names()[0], "host");
    assert_eq!(seen[0].header("host"), Some("example.org"));
    assert_eq!(seen[1].header("host"), Some("example.org:8080"));
    assert!(seen[0].header("user-agent").unwrap().starts_with("fetchwire/"));
    assert_eq!(seen[0].header("accept"), Some("*/*"));
}

#[tokio::test]
async fn test_head_split_across_reads() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        for piece in ["HTTP/1.1 2", "00 OK\r\nCont", "ent-Length: 5\r", "\n\r\nhel", "lo"] {
            conn.write(piece).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        conn
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello");
}

#[tokio::test]
async fn test_chunked_response_with_trailers() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n",
        )
        .await;
        conn.read_request().await
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "hello world");
    let trailers = response.trailers().unwrap();
    assert_eq!(trailers.get("x-checksum").unwrap(), "abc");
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().idle, 1);
}

#[tokio::test]
async fn test_body_until_eof() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\n\r\nstreamed until close").await;
        drop(conn);
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "streamed until close");
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().open, 0);
}

#[tokio::test]
async fn test_body_collects_with_trailers_as_http_body() {
    use http_body_util::BodyExt;

    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             3\r\nabc\r\n0\r\nGrpc-Status: 0\r\n\r\n",
        )
        .await;
        conn
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    let collected = response.take_body().collect().await.unwrap();
    assert_eq!(collected.trailers().unwrap().get("grpc-status").unwrap(), "0");
    assert_eq!(collected.to_bytes(), Bytes::from("abc"));
}

#[tokio::test]
async fn test_truncated_body_is_socket_error() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort").await;
        drop(conn);
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    assert!(response.text().await.is_err());
    assert!(response.completion().await.is_err());
}

#[tokio::test]
async fn test_head_response_has_no_body() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n").await;
        conn.read_request().await
    });

    let mut response = client
        .execute(Request::builder(Method::HEAD, "http://example.org/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.header("content-length"), Some("1234"));
    assert!(response.bytes().await.unwrap().is_empty());
    response.completion().await.unwrap();
    assert_eq!(client.pool().stats().idle, 1);
}

#[tokio::test]
async fn test_cancel_mid_body_closes_connection() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial").await;
        conn.is_closed_by_client().await
    });

    let cancel = CancellationToken::new();
    let mut response = client
        .execute_with_cancellation(Request::get("http://example.org/").unwrap(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        response.body_mut().chunk().await.unwrap(),
        Some(Bytes::from("partial"))
    );

    cancel.cancel();
    let err = response.body_mut().chunk().await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(response.completion().await.unwrap_err().is_cancelled());
    assert!(server_task.await.unwrap());
    assert_eq!(client.pool().stats().open, 0);
}

#[tokio::test]
async fn test_transfer_timeout_covers_body() {
    let (client, _transport, mut server) = client();
    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhalf").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        conn
    });

    let request = Request::get("http://example.org/")
        .unwrap()
        .with_transfer_timeout(Duration::from_millis(100));
    let mut response = client.execute(request).await.unwrap();
    let err = response.text().await.unwrap_err();
    assert!(err.is_timeout());
}

#[derive(Default)]
struct Received(AtomicU64);

impl EventListener for Received {
    fn response_body_progress(&self, _request: &Request, received: u64) {
        self.0.store(received, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_slow_reader_throttles_connection() {
    const TOTAL: usize = 1024 * 1024;
    let received = Arc::new(Received::default());
    let (transport, mut server) = pair();
    let client = HttpClient::builder()
        .transport(transport)
        .listen_arc(received.clone())
        .build()
        .unwrap();

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write(format!("HTTP/1.1 200 OK\r\nContent-Length: {TOTAL}\r\n\r\n"))
            .await;
        conn.write(vec![b'x'; TOTAL]).await;
        conn
    });

    let mut response = client
        .execute(Request::get("http://example.org/big").unwrap())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let buffered = received.0.load(Ordering::SeqCst);
    assert!(buffered < 128 * 1024, "read {buffered} bytes ahead of the consumer");

    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), TOTAL);
    assert_eq!(received.0.load(Ordering::SeqCst), TOTAL as u64);
}

#[tokio::test]
async fn test_dropping_body_closes_connection() {
    let (client, _transport, mut server) = client();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.read_request().await.unwrap();
        conn.write("HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nstart").await;
        conn.is_closed_by_client().await
    });

    let mut response = client
        .execute(Request::get("http://example.org/").unwrap())
        .await
        .unwrap();
    let completion = response.completion();
    drop(response.take_body());
    assert!(completion.await.unwrap_err().is_cancelled());
    assert!(server_task.await.unwrap());
}
