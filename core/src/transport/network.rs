//! Network transport backed by a blocking `ureq` agent.
//!
//! # Design
//! Every exchange builds its own agent so per-call timeouts and TLS modes
//! never leak between calls. Status interpretation is left to us
//! (`http_status_as_error(false)`), which lets failure bodies be dropped
//! instead of written to the destination.
//!
//! The exchange runs on a worker thread that streams events back over a
//! bounded channel, for either handler kind. The calling thread waits in
//! `POLL_INTERVAL` slices and abandons the worker once the cancel flag is
//! set, even while connecting or waiting for the response head. The worker
//! stops at its next failed send. A call without a timeout still bounds its
//! connect, send and response-head phases by `UNTIMED_PHASE_LIMIT`, so an
//! abandoned worker facing a silent peer always ends and drops its
//! connection.

use std::io::{Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use ureq::http::Response;
use ureq::{Agent, Body};

use super::{check_status, Exchange, Transport, CHUNK_SIZE, POLL_INTERVAL};
use crate::config::{CancelFlag, HandlerKind};
use crate::error::TransportError;
use crate::http::{HeaderSet, HttpMethod, SecureCommunication};

/// Longest a call without a timeout may spend connecting, sending, or
/// waiting for the response head.
pub(crate) const UNTIMED_PHASE_LIMIT: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct NetworkTransport {
    handler: HandlerKind,
    cancel: CancelFlag,
    phase_limit: Duration,
}

impl NetworkTransport {
    pub fn new(handler: HandlerKind, cancel: CancelFlag) -> Self {
        Self {
            handler,
            cancel,
            phase_limit: UNTIMED_PHASE_LIMIT,
        }
    }

    #[cfg(test)]
    fn with_phase_limit(mut self, limit: Duration) -> Self {
        self.phase_limit = limit;
        self
    }

    fn perform_on_worker(&self, exchange: &Exchange<'_>, sink: &mut dyn Write) -> Result<u16, TransportError> {
        let owned = OwnedExchange::from(exchange);
        let phase_limit = self.phase_limit;
        let (tx, rx) = mpsc::sync_channel(4);
        thread::Builder::new()
            .name("http-request-worker".to_string())
            .spawn(move || run_worker(&owned, phase_limit, &tx))
            .map_err(TransportError::io)?;

        let mut status = 0;
        loop {
            if self.cancel.is_cancelled() {
                debug!(handler = ?self.handler, "abandoning worker after cancellation");
                return Err(TransportError::cancelled());
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Event::Status(code)) => status = code,
                Ok(Event::Chunk(chunk)) => sink.write_all(&chunk).map_err(TransportError::io)?,
                Ok(Event::Done) => {
                    trace!(status, "response body copied");
                    return Ok(status);
                }
                Ok(Event::Failed(err)) => return Err(err),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::other("worker exited without a result"))
                }
            }
        }
    }
}

impl Transport for NetworkTransport {
    fn perform(&mut self, exchange: &Exchange<'_>, sink: &mut dyn Write) -> Result<u16, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        self.perform_on_worker(exchange, sink)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum Event {
    Status(u16),
    Chunk(Vec<u8>),
    Done,
    Failed(TransportError),
}

/// An `Exchange` the worker thread can own.
struct OwnedExchange {
    method: HttpMethod,
    url: String,
    secure: SecureCommunication,
    headers: HeaderSet,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
    user_agent: String,
}

impl From<&Exchange<'_>> for OwnedExchange {
    fn from(exchange: &Exchange<'_>) -> Self {
        Self {
            method: exchange.method,
            url: exchange.url.to_string(),
            secure: exchange.secure.clone(),
            headers: exchange.headers.clone(),
            body: exchange.body.map(<[u8]>::to_vec),
            timeout: exchange.timeout,
            user_agent: exchange.user_agent.to_string(),
        }
    }
}

impl OwnedExchange {
    fn as_exchange(&self) -> Exchange<'_> {
        Exchange {
            method: self.method,
            url: &self.url,
            unix_socket: None,
            secure: &self.secure,
            headers: &self.headers,
            body: self.body.as_deref(),
            timeout: self.timeout,
            user_agent: &self.user_agent,
        }
    }
}

fn run_worker(owned: &OwnedExchange, phase_limit: Duration, tx: &SyncSender<Event>) {
    // A failed send means the caller gave up waiting; just stop.
    let response = match send(&owned.as_exchange(), phase_limit) {
        Ok(response) => response,
        Err(err) => {
            let _ = tx.send(Event::Failed(err));
            return;
        }
    };
    let status = match check_status(response.status().as_u16()) {
        Ok(status) => status,
        Err(err) => {
            let _ = tx.send(Event::Failed(err));
            return;
        }
    };
    if tx.send(Event::Status(status)).is_err() {
        return;
    }

    let mut reader = response.into_body().into_reader();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let event = match reader.read(&mut buf) {
            Ok(0) => Event::Done,
            Ok(n) => Event::Chunk(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => Event::Failed(TransportError::io(e)),
        };
        let last = matches!(event, Event::Done | Event::Failed(_));
        if tx.send(event).is_err() || last {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// ureq plumbing
// ---------------------------------------------------------------------------

fn agent_for(exchange: &Exchange<'_>, phase_limit: Duration) -> Agent {
    let mut config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(exchange.timeout);
    if exchange.timeout.is_none() {
        // The body phase stays unbounded.
        config = config
            .timeout_connect(Some(phase_limit))
            .timeout_send_request(Some(phase_limit))
            .timeout_send_body(Some(phase_limit))
            .timeout_recv_response(Some(phase_limit));
    }
    if !exchange.secure.verify_peer() {
        config = config.tls_config(ureq::tls::TlsConfig::builder().disable_verification(true).build());
    }
    config.build().new_agent()
}

fn with_headers<B>(mut request: ureq::RequestBuilder<B>, exchange: &Exchange<'_>) -> ureq::RequestBuilder<B> {
    for (name, value) in exchange.headers.iter() {
        request = request.header(name, value);
    }
    if let Some(authorization) = exchange.secure.authorization() {
        request = request.header("Authorization", authorization);
    }
    request.header("User-Agent", exchange.user_agent)
}

fn send(exchange: &Exchange<'_>, phase_limit: Duration) -> Result<Response<Body>, TransportError> {
    let agent = agent_for(exchange, phase_limit);
    let url = exchange.url;
    let body = exchange.body.unwrap_or_default();
    debug!(method = %exchange.method, url, "sending over network");

    let result = match exchange.method {
        HttpMethod::Get => with_headers(agent.get(url), exchange).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), exchange).call(),
        HttpMethod::Post => with_headers(agent.post(url), exchange).send(body),
        HttpMethod::Put => with_headers(agent.put(url), exchange).send(body),
        HttpMethod::Patch => with_headers(agent.patch(url), exchange).send(body),
    };
    result.map_err(map_error)
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::timeout(),
        ureq::Error::BadUri(_) => TransportError::invalid_url(),
        ureq::Error::HostNotFound => TransportError::connect(err.to_string()),
        ureq::Error::Io(e) => TransportError::io(e),
        other => TransportError::other(other.to_string()),
    }
}
