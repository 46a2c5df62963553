//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random TCP port and on a temporary UNIX
//! socket, then drives every facade operation through the real transports.
//! Each server runs on its own thread with a current-thread tokio runtime.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use http_request::error::{INVALID_URL_MESSAGE, STATUS_ERROR_MESSAGE};
use http_request::{
    CancelFlag, CompletionSink, Configuration, HandlerKind, HeaderSet, Payload, RequestError, RequestParameters,
    SecureCommunication, Target, TransportErrorKind, UrlRequest, DEFAULT_USER_AGENT,
};
use serde_json::{json, Value};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

#[cfg(unix)]
fn start_unix_server() -> PathBuf {
    let path = temp_path("sock");
    let std_listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
    std_listener.set_nonblocking(true).unwrap();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::UnixListener::from_std(std_listener).unwrap();
            mock_server::run_unix(listener).await
        })
        .unwrap();
    });
    path
}

fn temp_path(extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("http-request-{}.{extension}", uuid::Uuid::new_v4()))
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// Run `call` with a sink that records the body on success and the message
/// and status on failure.
fn capture(
    call: impl FnOnce(CompletionSink<'_>) -> Result<(), RequestError>,
) -> (Option<String>, Option<(String, Option<u16>)>) {
    let success = RefCell::new(None);
    let failure = RefCell::new(None);
    let sink = CompletionSink::owned(|body| *success.borrow_mut() = Some(body))
        .on_error(|msg, code| *failure.borrow_mut() = Some((msg.to_string(), code)));
    call(sink).unwrap();
    (success.into_inner(), failure.into_inner())
}

// ---------------------------------------------------------------------------
// Network facade
// ---------------------------------------------------------------------------

#[test]
fn get_hello_world() {
    let addr = start_server();
    let (body, failure) = capture(|sink| {
        UrlRequest::http().get(
            RequestParameters::new(Target::http(url(addr, "/"))),
            sink,
            Configuration::default(),
        )
    });
    assert_eq!(body.as_deref(), Some(mock_server::HELLO_BODY));
    assert!(failure.is_none());
}

#[test]
fn get_follows_redirects() {
    let addr = start_server();
    let (body, _) = capture(|sink| {
        UrlRequest::http().get(
            RequestParameters::new(Target::http(url(addr, "/redirect"))),
            sink,
            Configuration::default(),
        )
    });
    assert_eq!(body.as_deref(), Some(mock_server::HELLO_BODY));
}

#[test]
fn body_verbs_echo_every_payload_variant() {
    let addr = start_server();
    let facade = UrlRequest::http();
    let raw = r#"{"foo":"bar"}"#;

    for payload in [
        Payload::Text(raw.to_string()),
        Payload::Document(json!({"foo": "bar"})),
        Payload::View(raw),
    ] {
        let params = RequestParameters::new(Target::http(url(addr, "/echo"))).data(payload);
        for verb in ["post", "put", "patch"] {
            let params = params.clone();
            let (body, failure) = capture(|sink| match verb {
                "post" => facade.post(params, sink, Configuration::default()),
                "put" => facade.put(params, sink, Configuration::default()),
                _ => facade.patch(params, sink, Configuration::default()),
            });
            assert_eq!(body.as_deref(), Some(raw), "{verb}");
            assert!(failure.is_none(), "{verb}: {failure:?}");
        }
    }
}

#[test]
fn delete_returns_the_id() {
    let addr = start_server();
    let (body, _) = capture(|sink| {
        UrlRequest::http().delete(
            RequestParameters::new(Target::http(url(addr, "/records/42"))),
            sink,
            Configuration::default(),
        )
    });
    assert_eq!(body.as_deref(), Some("42"));
}

#[test]
fn download_writes_file_and_reports_empty_body() {
    let addr = start_server();
    let path = temp_path("out");
    let seen = RefCell::new(None);

    UrlRequest::http()
        .download(
            RequestParameters::new(Target::http(url(addr, "/"))),
            CompletionSink::borrowed(|body| *seen.borrow_mut() = Some(body.to_string())).output_file(&path),
            Configuration::default(),
        )
        .unwrap();

    assert_eq!(seen.into_inner().as_deref(), Some(""));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), mock_server::HELLO_BODY);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn get_with_output_file_writes_file() {
    let addr = start_server();
    let path = temp_path("out");

    UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(url(addr, "/status/404"))),
            CompletionSink::default().on_error(|_, _| {}).output_file(&path),
            Configuration::default(),
        )
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"");

    UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(url(addr, "/"))),
            CompletionSink::default().output_file(&path),
            Configuration::default(),
        )
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), mock_server::HELLO_BODY);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn empty_url_reports_error_and_leaves_empty_file() {
    let path = temp_path("out");
    std::fs::write(&path, b"previous contents").unwrap();

    let success = RefCell::new(false);
    let failure = RefCell::new(None);
    UrlRequest::http()
        .download(
            RequestParameters::new(Target::http("")),
            CompletionSink::borrowed(|_| *success.borrow_mut() = true)
                .on_error(|msg, code| *failure.borrow_mut() = Some((msg.to_string(), code)))
                .output_file(&path),
            Configuration::default(),
        )
        .unwrap();

    assert!(!*success.borrow());
    assert_eq!(failure.into_inner(), Some((INVALID_URL_MESSAGE.to_string(), None)));
    assert!(path.exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn error_status_goes_to_error_continuation() {
    let addr = start_server();
    let (body, failure) = capture(|sink| {
        UrlRequest::http().get(
            RequestParameters::new(Target::http(url(addr, "/status/404"))),
            sink,
            Configuration::default(),
        )
    });
    assert!(body.is_none());
    assert_eq!(failure, Some((STATUS_ERROR_MESSAGE.to_string(), Some(404))));
}

#[test]
fn error_status_without_error_continuation_is_returned() {
    let addr = start_server();
    let fired = RefCell::new(false);

    let err = UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(url(addr, "/status/500"))),
            CompletionSink::borrowed(|_| *fired.borrow_mut() = true),
            Configuration::default(),
        )
        .unwrap_err();

    assert!(!*fired.borrow());
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.to_string(), STATUS_ERROR_MESSAGE);
}

#[test]
fn error_status_with_output_file_leaves_it_empty() {
    let addr = start_server();
    let path = temp_path("out");

    let (_, failure) = capture(|sink| {
        UrlRequest::http().download(
            RequestParameters::new(Target::http(url(addr, "/status/503"))),
            sink.output_file(&path),
            Configuration::default(),
        )
    });

    assert_eq!(failure.map(|(_, code)| code), Some(Some(503)));
    assert_eq!(std::fs::read(&path).unwrap(), b"");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn headers_and_user_agent_are_sent() {
    let addr = start_server();
    let headers = HeaderSet::default().with("X-Request-Id", "abc-123");
    let config = Configuration::default().with_user_agent("integration/1.0");

    let (body, _) = capture(|sink| {
        UrlRequest::http().get(
            RequestParameters::new(Target::http(url(addr, "/headers"))).headers(headers),
            sink,
            config,
        )
    });

    let seen: Value = serde_json::from_str(&body.unwrap()).unwrap();
    assert_eq!(seen["x-request-id"], "abc-123");
    assert!(seen["accept"].as_str().unwrap().contains("application/json"));
    assert_eq!(seen["accept-charset"], "utf-8");
    assert!(seen["user-agent"].as_str().unwrap().contains("integration/1.0"));
}

#[test]
fn default_user_agent_and_basic_auth_are_sent() {
    let addr = start_server();
    let target = Target::http(url(addr, "/headers")).with_security(SecureCommunication::default().basic_auth("user", "pass"));

    let (body, _) = capture(|sink| {
        UrlRequest::http().get(RequestParameters::new(target), sink, Configuration::default())
    });

    let seen: Value = serde_json::from_str(&body.unwrap()).unwrap();
    assert_eq!(seen["authorization"], "Basic dXNlcjpwYXNz");
    assert!(seen["user-agent"].as_str().unwrap().contains(DEFAULT_USER_AGENT));
}

#[test]
fn timeout_is_reported_without_status() {
    let addr = start_server();
    let config = Configuration::default().with_timeout(Duration::from_millis(200));
    let started = Instant::now();

    let (body, failure) = capture(|sink| {
        UrlRequest::http().get(RequestParameters::new(Target::http(url(addr, "/slow"))), sink, config)
    });

    assert!(body.is_none());
    let (_, code) = failure.unwrap();
    assert_eq!(code, None);
    assert!(started.elapsed() < mock_server::SLOW_RESPONSE_DELAY);
}

#[test]
fn cancel_interrupts_multi_handler_while_waiting() {
    let addr = start_server();
    let cancel = CancelFlag::new();
    let config = Configuration::default()
        .with_handler(HandlerKind::Multi)
        .with_cancel_flag(&cancel);

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        })
    };
    let started = Instant::now();
    let err = UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(url(addr, "/slow"))),
            CompletionSink::default(),
            config,
        )
        .unwrap_err();

    canceller.join().unwrap();
    assert!(matches!(err, RequestError::Transport(ref e) if e.is_cancelled()));
    assert_eq!(err.status_code(), None);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn cancel_interrupts_single_handler_while_waiting() {
    let addr = start_server();
    let cancel = CancelFlag::new();

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        })
    };
    let started = Instant::now();
    let err = UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(url(addr, "/slow"))),
            CompletionSink::default(),
            Configuration::default().with_cancel_flag(&cancel),
        )
        .unwrap_err();

    canceller.join().unwrap();
    assert!(matches!(err, RequestError::Transport(ref e) if e.is_cancelled()));
    assert_eq!(err.status_code(), None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn preset_cancel_flag_stops_single_handler() {
    let addr = start_server();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let (body, failure) = capture(|sink| {
        UrlRequest::http().get(
            RequestParameters::new(Target::http(url(addr, "/"))),
            sink,
            Configuration::default().with_cancel_flag(&cancel),
        )
    });

    assert!(body.is_none());
    assert_eq!(failure.map(|(_, code)| code), Some(None));
}

#[test]
fn unreachable_host_has_no_status() {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let err = UrlRequest::http()
        .get(
            RequestParameters::new(Target::http(format!("http://127.0.0.1:{port}/"))),
            CompletionSink::default(),
            Configuration::default().with_timeout(Duration::from_secs(2)),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), None);
}

#[test]
fn concurrent_calls_get_their_own_bodies() {
    let addr = start_server();
    let facade = Arc::new(UrlRequest::http());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let facade = Arc::clone(&facade);
            thread::spawn(move || {
                let mut got = None;
                facade
                    .post(
                        RequestParameters::new(Target::http(url(addr, "/echo"))).data(format!("body-{i}")),
                        CompletionSink::owned(|body| got = Some(body)),
                        Configuration::default(),
                    )
                    .unwrap();
                (i, got)
            })
        })
        .collect();

    for worker in workers {
        let (i, got) = worker.join().unwrap();
        assert_eq!(got, Some(format!("body-{i}")));
    }
}

// ---------------------------------------------------------------------------
// UNIX socket facade
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod unix_socket {
    use super::*;

    fn target(socket: &PathBuf, path: &str) -> Target {
        Target::unix_socket(socket, format!("http://localhost{path}"))
    }

    #[test]
    fn get_hello_world() {
        let socket = start_unix_server();
        let (body, failure) = capture(|sink| {
            UrlRequest::unix_socket().get(RequestParameters::new(target(&socket, "/")), sink, Configuration::default())
        });
        assert_eq!(body.as_deref(), Some(mock_server::HELLO_BODY));
        assert!(failure.is_none());
    }

    #[test]
    fn body_verbs_echo() {
        let socket = start_unix_server();
        let facade = UrlRequest::unix_socket();

        let (body, _) = capture(|sink| {
            facade.post(
                RequestParameters::new(target(&socket, "/echo")).data("raw text"),
                sink,
                Configuration::default(),
            )
        });
        assert_eq!(body.as_deref(), Some("raw text"));

        let (body, _) = capture(|sink| {
            facade.put(
                RequestParameters::new(target(&socket, "/echo")).data(json!({"id": 1})),
                sink,
                Configuration::default(),
            )
        });
        assert_eq!(body.as_deref(), Some(r#"{"id":1}"#));

        let (body, _) = capture(|sink| {
            facade.patch(
                RequestParameters::new(target(&socket, "/echo")).data(String::new()),
                sink,
                Configuration::default(),
            )
        });
        assert_eq!(body.as_deref(), Some(""));
    }

    #[test]
    fn put_document_keeps_headers() {
        let socket = start_unix_server();
        let headers = HeaderSet::default().with("X-Trace", "unix-put");

        // /headers only answers GET, so PUT is checked through the status it
        // earns and GET through the reflected headers.
        let (_, failure) = capture(|sink| {
            UrlRequest::unix_socket().put(
                RequestParameters::new(target(&socket, "/headers"))
                    .data(json!({"a": 1}))
                    .headers(headers.clone()),
                sink,
                Configuration::default(),
            )
        });
        assert_eq!(failure.map(|(_, code)| code), Some(Some(405)));

        let (body, _) = capture(|sink| {
            UrlRequest::unix_socket().get(
                RequestParameters::new(target(&socket, "/headers")).headers(headers),
                sink,
                Configuration::default().with_user_agent("unix-agent"),
            )
        });
        let seen: Value = serde_json::from_str(&body.unwrap()).unwrap();
        assert_eq!(seen["x-trace"], "unix-put");
        assert_eq!(seen["user-agent"], "unix-agent");
        assert_eq!(seen["host"], "localhost");
    }

    #[test]
    fn delete_returns_the_id() {
        let socket = start_unix_server();
        let (body, _) = capture(|sink| {
            UrlRequest::unix_socket().delete(
                RequestParameters::new(target(&socket, "/records/abc")),
                sink,
                Configuration::default(),
            )
        });
        assert_eq!(body.as_deref(), Some("abc"));
    }

    #[test]
    fn download_writes_file() {
        let socket = start_unix_server();
        let path = temp_path("out");

        UrlRequest::unix_socket()
            .download(
                RequestParameters::new(target(&socket, "/")),
                CompletionSink::default().output_file(&path),
                Configuration::default(),
            )
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), mock_server::HELLO_BODY);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn error_status_is_reported() {
        let socket = start_unix_server();
        let (body, failure) = capture(|sink| {
            UrlRequest::unix_socket().get(
                RequestParameters::new(target(&socket, "/status/418")),
                sink,
                Configuration::default(),
            )
        });
        assert!(body.is_none());
        assert_eq!(failure, Some((STATUS_ERROR_MESSAGE.to_string(), Some(418))));
    }

    #[test]
    fn cancel_interrupts_single_handler() {
        let socket = start_unix_server();
        let cancel = CancelFlag::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let err = UrlRequest::unix_socket()
            .get(
                RequestParameters::new(target(&socket, "/slow")),
                CompletionSink::default(),
                Configuration::default().with_cancel_flag(&cancel),
            )
            .unwrap_err();

        canceller.join().unwrap();
        assert!(matches!(err, RequestError::Transport(ref e) if e.is_cancelled()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_interrupts_a_blocked_upload() {
        let socket = temp_path("sock");
        let listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();
        let _peer = thread::spawn(move || {
            // Accept and never read, so the request write blocks.
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(5));
            drop(stream);
        });
        let body = "x".repeat(32 * 1024 * 1024);
        let cancel = CancelFlag::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let err = UrlRequest::unix_socket()
            .post(
                RequestParameters::new(target(&socket, "/echo")).data(Payload::View(&body)),
                CompletionSink::default(),
                Configuration::default().with_cancel_flag(&cancel),
            )
            .unwrap_err();

        canceller.join().unwrap();
        assert!(matches!(err, RequestError::Transport(ref e) if e.is_cancelled()));
        assert!(started.elapsed() < Duration::from_secs(2));
        let _ = std::fs::remove_file(&socket);
    }

    #[test]
    fn missing_listener_is_a_connect_failure() {
        let socket = temp_path("sock");
        let err = UrlRequest::unix_socket()
            .get(RequestParameters::new(target(&socket, "/")), CompletionSink::default(), Configuration::default())
            .unwrap_err();
        match err {
            RequestError::Transport(e) => {
                assert_eq!(e.kind(), TransportErrorKind::Connect);
                assert_eq!(e.status_code(), None);
            }
            other => panic!("expected a transport failure, got {other:?}"),
        }
    }
}
