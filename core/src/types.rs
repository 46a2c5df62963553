//! What a caller hands to a facade: the request parameters and the
//! completion sink that receives the outcome.
//!
//! # Design
//! `RequestParameters` says what to send. `CompletionSink` says what to do
//! afterwards: which success continuation to run (borrowing or owning the
//! body), an optional error continuation, and an optional output file that
//! replaces the in-memory response buffer.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{RequestError, TransportError};
use crate::http::{HeaderSet, Target};
use crate::payload::Payload;

/// Parameters of one request.
#[derive(Debug, Clone)]
pub struct RequestParameters<'a> {
    pub target: Target,
    pub data: Payload<'a>,
    pub headers: HeaderSet,
}

impl<'a> RequestParameters<'a> {
    /// Parameters with an empty body and the default JSON headers.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            data: Payload::default(),
            headers: HeaderSet::default(),
        }
    }

    pub fn data(mut self, data: impl Into<Payload<'a>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }
}

/// Success continuation, chosen by the caller.
pub enum OnSuccess<'a> {
    /// Receives the body by reference.
    Borrowed(Box<dyn FnOnce(&str) + 'a>),
    /// Receives the body by value.
    Owned(Box<dyn FnOnce(String) + 'a>),
}

/// Error continuation: the failure message and the peer's status code, if any.
pub type OnError<'a> = Box<dyn FnOnce(&str, Option<u16>) + 'a>;

/// Continuations and destination for one call.
///
/// Exactly one continuation fires per call. When the call fails and no
/// error continuation was supplied, neither fires and the facade returns
/// the failure instead.
pub struct CompletionSink<'a> {
    on_success: OnSuccess<'a>,
    on_error: Option<OnError<'a>>,
    output_file: Option<PathBuf>,
}

impl Default for CompletionSink<'_> {
    fn default() -> Self {
        Self::borrowed(|_| {})
    }
}

impl<'a> CompletionSink<'a> {
    pub fn borrowed(on_success: impl FnOnce(&str) + 'a) -> Self {
        Self {
            on_success: OnSuccess::Borrowed(Box::new(on_success)),
            on_error: None,
            output_file: None,
        }
    }

    pub fn owned(on_success: impl FnOnce(String) + 'a) -> Self {
        Self {
            on_success: OnSuccess::Owned(Box::new(on_success)),
            on_error: None,
            output_file: None,
        }
    }

    pub fn on_error(mut self, on_error: impl FnOnce(&str, Option<u16>) + 'a) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Write the response body to `path` instead of buffering it. The
    /// success continuation then receives an empty body.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }

    /// Route the outcome of an executed request to the right continuation.
    pub(crate) fn complete(
        self,
        outcome: Result<(), TransportError>,
        body: Vec<u8>,
    ) -> Result<(), RequestError> {
        match outcome {
            Ok(()) => {
                let body = into_text(body);
                match self.on_success {
                    OnSuccess::Borrowed(f) => f(&body),
                    OnSuccess::Owned(f) => f(body),
                }
                Ok(())
            }
            Err(err) => match self.on_error {
                Some(f) => {
                    debug!(status = ?err.status_code(), kind = ?err.kind(), "request failed: {err}");
                    f(err.message(), err.status_code());
                    Ok(())
                }
                None => {
                    warn!(status = ?err.status_code(), kind = ?err.kind(), "request failed: {err}");
                    Err(err.into())
                }
            },
        }
    }
}

fn into_text(body: Vec<u8>) -> String {
    String::from_utf8(body).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
