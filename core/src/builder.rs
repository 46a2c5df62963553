//! Fluent, one-shot request builder shared by every verb.
//!
//! # Design
//! A single `RequestBuilder` type carries the verb as an `HttpMethod` tag.
//! The fluent steps only record state; `execute` consumes the builder and
//! is the one place where I/O happens, so a builder cannot be dispatched
//! twice.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::config::DEFAULT_USER_AGENT;
use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HeaderSet, HttpMethod, SecureCommunication};
use crate::transport::{Exchange, ResponseDestination, TransportHandle};

pub struct RequestBuilder<'a> {
    method: HttpMethod,
    handle: TransportHandle<'a>,
    url: String,
    secure: SecureCommunication,
    unix_socket: Option<PathBuf>,
    headers: HeaderSet,
    body: Cow<'a, [u8]>,
    timeout: Option<Duration>,
    user_agent: Cow<'a, str>,
}

impl<'a> RequestBuilder<'a> {
    pub fn builder(method: HttpMethod, handle: TransportHandle<'a>) -> Self {
        Self {
            method,
            handle,
            url: String::new(),
            secure: SecureCommunication::default(),
            unix_socket: None,
            headers: HeaderSet::new(),
            body: Cow::Borrowed(&[]),
            timeout: None,
            user_agent: Cow::Borrowed(DEFAULT_USER_AGENT),
        }
    }

    pub fn get(handle: TransportHandle<'a>) -> Self {
        Self::builder(HttpMethod::Get, handle)
    }

    pub fn post(handle: TransportHandle<'a>) -> Self {
        Self::builder(HttpMethod::Post, handle)
    }

    pub fn put(handle: TransportHandle<'a>) -> Self {
        Self::builder(HttpMethod::Put, handle)
    }

    pub fn patch(handle: TransportHandle<'a>) -> Self {
        Self::builder(HttpMethod::Patch, handle)
    }

    pub fn delete(handle: TransportHandle<'a>) -> Self {
        Self::builder(HttpMethod::Delete, handle)
    }

    /// A GET whose response is streamed to `path`.
    pub fn download(handle: TransportHandle<'a>, path: impl Into<PathBuf>) -> Self {
        Self::get(handle).output_file(path)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(mut self, url: impl Into<String>, secure: &SecureCommunication) -> Self {
        self.url = url.into();
        self.secure = secure.clone();
        self
    }

    pub fn unix_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    pub fn append_headers(mut self, headers: &HeaderSet) -> Self {
        self.headers.extend(headers.iter());
        self
    }

    /// Body to send. Ignored by verbs that do not carry one.
    pub fn post_data(mut self, body: impl Into<Cow<'a, [u8]>>) -> Self {
        self.body = body.into();
        self
    }

    /// Stream the response to `path` instead of the handle's destination.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.handle.destination = ResponseDestination::File(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<Cow<'a, str>>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Perform the request.
    ///
    /// A file destination is created (or truncated) before anything else
    /// and is left empty if the request fails.
    pub fn execute(self) -> Result<(), TransportError> {
        let TransportHandle {
            mut transport,
            destination,
        } = self.handle;

        let file = match &destination {
            ResponseDestination::File(path) => Some(File::create(path).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Io,
                    format!("cannot open output file {}: {e}", path.display()),
                )
            })?),
            ResponseDestination::Buffer(_) => None,
        };

        validate_url(&self.url)?;
        let exchange = Exchange {
            method: self.method,
            url: &self.url,
            unix_socket: self.unix_socket.as_deref(),
            secure: &self.secure,
            headers: &self.headers,
            body: self.method.carries_body().then_some(self.body.as_ref()),
            timeout: self.timeout,
            user_agent: &self.user_agent,
        };

        let outcome = match (destination, file) {
            (ResponseDestination::File(path), Some(file)) => {
                let mut writer = BufWriter::new(file);
                let outcome = transport
                    .perform(&exchange, &mut writer)
                    .and_then(|status| writer.flush().map(|()| status).map_err(TransportError::io));
                if outcome.is_err() {
                    let (file, _) = writer.into_parts();
                    if let Err(e) = file.set_len(0) {
                        debug!(path = %path.display(), "could not truncate output file: {e}");
                    }
                }
                outcome
            }
            (ResponseDestination::Buffer(buf), _) => {
                let outcome = transport.perform(&exchange, &mut *buf);
                if outcome.is_err() {
                    buf.clear();
                }
                outcome
            }
            (ResponseDestination::File(_), None) => {
                Err(TransportError::other("output file was not opened"))
            }
        };

        let status = outcome?;
        debug!(method = %self.method, url = %self.url, status, "request completed");
        Ok(())
    }
}

/// A URL must be present, parse, and name a host.
fn validate_url(url: &str) -> Result<(), TransportError> {
    if url.trim().is_empty() {
        return Err(TransportError::invalid_url());
    }
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => Ok(()),
        _ => Err(TransportError::invalid_url()),
    }
}
