//! Request construction and dispatch over HTTP and UNIX sockets.
//!
//! # Overview
//! Callers issue GET, POST, PUT, PATCH, DELETE and DOWNLOAD through one
//! call shape on a `UrlRequest` facade: request parameters (target,
//! payload, headers), a completion sink (continuations plus an optional
//! output file) and a configuration (timeout, user agent, handler kind,
//! cancel flag). Each call shapes one request, dispatches it once and
//! routes the outcome to exactly one continuation.
//!
//! # Design
//! - `RequestBuilder` is one fluent, one-shot builder for every verb.
//! - `Payload` is an explicit sum type; a variant a verb cannot send is a
//!   usage error, not an empty body.
//! - `TransportFactory` maps a destination and configuration to a
//!   transport handle, which is the seam tests script.
//! - `CancelFlag` is the only state shared across threads.

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod payload;
pub mod transport;
pub mod types;

pub use builder::RequestBuilder;
pub use client::{Endpoint, UrlRequest};
pub use config::{CancelFlag, Configuration, HandlerKind, DEFAULT_USER_AGENT};
pub use error::{RequestError, TransportError, TransportErrorKind, UsageError};
pub use http::{HeaderSet, HttpMethod, SecureCommunication, Target};
pub use payload::Payload;
pub use transport::{
    Exchange, ResponseDestination, Transport, TransportFactory, TransportHandle, WireFactory,
};
pub use types::{CompletionSink, OnError, OnSuccess, RequestParameters};
