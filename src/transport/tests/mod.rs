use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::transport::*;
use futures::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    HttpTransport::new(&TransferConfig::default()).unwrap()
}

async fn collect(response: TransferResponse) -> Vec<u8> {
    let mut body = response.body;
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend(chunk.unwrap());
    }
    bytes
}

#[tokio::test]
async fn full_download_reports_length_and_mime() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip; charset=binary")
                .set_body_bytes(b"0123456789".to_vec()),
        )
        .mount(&server)
        .await;

    let response = transport()
        .open(&TransferRequest {
            url: format!("{}/file.zip", server.uri()),
            offset: 0,
        })
        .await
        .unwrap();

    assert!(!response.resumed);
    assert_eq!(response.total_len, Some(10));
    assert_eq!(response.mime_type.as_deref(), Some("application/zip"));
    assert_eq!(collect(response).await, b"0123456789");
}

#[tokio::test]
async fn partial_content_resumes_at_offset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("range", "bytes=4-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 4-9/10")
                .set_body_bytes(b"456789".to_vec()),
        )
        .mount(&server)
        .await;

    let response = transport()
        .open(&TransferRequest {
            url: format!("{}/file.bin", server.uri()),
            offset: 4,
        })
        .await
        .unwrap();

    assert!(response.resumed);
    assert_eq!(response.total_len, Some(10));
    assert_eq!(collect(response).await, b"456789");
}

#[tokio::test]
async fn server_ignoring_range_is_not_resumed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .mount(&server)
        .await;

    let response = transport()
        .open(&TransferRequest {
            url: format!("{}/file.bin", server.uri()),
            offset: 4,
        })
        .await
        .unwrap();

    assert!(!response.resumed);
    assert_eq!(response.total_len, Some(10));
}

#[tokio::test]
async fn error_statuses_surface_as_http_errors() {
    let server = MockServer::start().await;
    for (route, status) in [("/auth", 401), ("/proxy", 407), ("/missing", 404), ("/down", 503)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    for (route, expected) in [("/auth", 401), ("/proxy", 407), ("/missing", 404), ("/down", 503)] {
        let err = transport()
            .open(&TransferRequest {
                url: format!("{}{}", server.uri(), route),
                offset: 0,
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransferError::Http { status, .. } if status == expected),
            "{route} should fail with {expected}, got {err:?}"
        );
    }
}

#[tokio::test]
async fn invalid_and_unsupported_urls_are_rejected() {
    let t = transport();
    for url in ["not a url", "ftp://example.com/file"] {
        let err = t
            .open(&TransferRequest {
                url: url.to_string(),
                offset: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidUrl(_)), "{url}: {err:?}");
    }
}

#[tokio::test]
async fn unreachable_host_is_a_connect_error() {
    // Bind then drop a listener so the port is very likely closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = transport()
        .open(&TransferRequest {
            url: format!("http://127.0.0.1:{port}/file"),
            offset: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Connect(_)), "got {err:?}");
}
