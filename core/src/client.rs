//! Facades that turn one caller call into one dispatched request.
//!
//! # Design
//! `UrlRequest` is a single type parameterized by an `Endpoint` strategy:
//! `Network` sends to the target URL, `UnixSocket` additionally binds the
//! target's socket path. Everything else is shared: payload resolution,
//! destination selection, transport creation through a `TransportFactory`,
//! and routing the outcome through the caller's `CompletionSink`.
//!
//! Usage errors are returned before any transport exists and never reach
//! a continuation. Transport failures go to the error continuation when
//! the caller supplied one.

use tracing::debug_span;

use crate::builder::RequestBuilder;
use crate::config::Configuration;
use crate::error::{RequestError, UsageError};
use crate::http::{HttpMethod, Target};
use crate::transport::{ResponseDestination, TransportFactory, WireFactory};
use crate::types::{CompletionSink, RequestParameters};

/// How a facade reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// HTTP(S) over the network.
    Network,
    /// HTTP over the UNIX socket named by the target.
    UnixSocket,
}

impl Endpoint {
    fn bind<'a>(self, builder: RequestBuilder<'a>, target: &Target) -> Result<RequestBuilder<'a>, UsageError> {
        match self {
            Endpoint::Network => Ok(builder),
            Endpoint::UnixSocket => {
                let path = target.socket_path().ok_or(UsageError::MissingSocketPath)?;
                Ok(builder.unix_socket_path(path))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Download,
}

impl Operation {
    fn method(self) -> HttpMethod {
        match self {
            Operation::Get | Operation::Download => HttpMethod::Get,
            Operation::Post => HttpMethod::Post,
            Operation::Put => HttpMethod::Put,
            Operation::Patch => HttpMethod::Patch,
            Operation::Delete => HttpMethod::Delete,
        }
    }
}

/// Request facade.
///
/// Holds no per-call state, so one instance can serve concurrent calls
/// from many threads.
#[derive(Debug, Clone)]
pub struct UrlRequest<F = WireFactory> {
    endpoint: Endpoint,
    factory: F,
}

impl UrlRequest {
    /// Facade for network targets.
    pub fn http() -> Self {
        Self::with_factory(Endpoint::Network, WireFactory)
    }

    /// Facade for UNIX-socket targets.
    pub fn unix_socket() -> Self {
        Self::with_factory(Endpoint::UnixSocket, WireFactory)
    }
}

impl<F: TransportFactory> UrlRequest<F> {
    pub fn with_factory(endpoint: Endpoint, factory: F) -> Self {
        Self { endpoint, factory }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn get(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Get, params, sink, config)
    }

    pub fn post(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Post, params, sink, config)
    }

    pub fn put(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Put, params, sink, config)
    }

    pub fn patch(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Patch, params, sink, config)
    }

    pub fn delete(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Delete, params, sink, config)
    }

    /// Stream a GET response into the sink's output file, which is
    /// required. The success continuation receives an empty body.
    pub fn download(
        &self,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        self.dispatch(Operation::Download, params, sink, config)
    }

    fn dispatch(
        &self,
        operation: Operation,
        params: RequestParameters<'_>,
        sink: CompletionSink<'_>,
        config: Configuration,
    ) -> Result<(), RequestError> {
        let method = operation.method();
        let span = debug_span!("request", %method, url = params.target.url(), endpoint = ?self.endpoint);
        let _guard = span.enter();

        let body = params.data.body_for(method)?;
        if operation == Operation::Download && sink.output_path().is_none() {
            return Err(UsageError::MissingOutputFile.into());
        }

        let mut response = Vec::new();
        let destination = match sink.output_path() {
            Some(path) => ResponseDestination::File(path.to_path_buf()),
            None => ResponseDestination::Buffer(&mut response),
        };
        let handle = self.factory.create(destination, config.handler(), config.cancel_flag());

        let builder = RequestBuilder::builder(method, handle).url(params.target.url(), params.target.secure());
        let mut builder = self
            .endpoint
            .bind(builder, &params.target)?
            .append_headers(&params.headers)
            .timeout(config.timeout())
            .user_agent(config.user_agent());
        if let Some(body) = body {
            builder = builder.post_data(body);
        }

        let outcome = builder.execute();
        sink.complete(outcome, response)
    }
}
