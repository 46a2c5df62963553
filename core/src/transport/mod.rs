//! The exchange primitive and the factory that hands transports to builders.
//!
//! # Design
//! A `Transport` performs exactly one exchange described by an `Exchange`
//! and streams the response body into a caller-supplied writer. Failure
//! statuses (400 and above) are reported as errors and their bodies are
//! never written. The factory is a pure mapping from destination, handler
//! kind and cancel flag to a `TransportHandle`; it performs no I/O.

mod network;
#[cfg(unix)]
mod unix;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use network::NetworkTransport;
#[cfg(unix)]
pub use unix::UnixSocketTransport;

use crate::config::{CancelFlag, HandlerKind};
use crate::error::TransportError;
use crate::http::{HeaderSet, HttpMethod, SecureCommunication};

/// How often blocked transports wake up to look at the cancel flag.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

const CHUNK_SIZE: usize = 16 * 1024;

/// Everything a transport needs to perform one request.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'r> {
    pub method: HttpMethod,
    pub url: &'r str,
    /// Set when the request goes through a UNIX socket.
    pub unix_socket: Option<&'r Path>,
    pub secure: &'r SecureCommunication,
    pub headers: &'r HeaderSet,
    pub body: Option<&'r [u8]>,
    pub timeout: Option<Duration>,
    pub user_agent: &'r str,
}

/// One-shot request executor.
pub trait Transport {
    /// Perform `exchange`, writing the response body to `sink`, and return
    /// the response status.
    fn perform(&mut self, exchange: &Exchange<'_>, sink: &mut dyn Write) -> Result<u16, TransportError>;
}

/// Where the response body goes.
#[derive(Debug)]
pub enum ResponseDestination<'a> {
    Buffer(&'a mut Vec<u8>),
    File(PathBuf),
}

/// A transport paired with the destination it writes to.
pub struct TransportHandle<'a> {
    pub(crate) transport: Box<dyn Transport + 'a>,
    pub(crate) destination: ResponseDestination<'a>,
}

impl<'a> TransportHandle<'a> {
    pub fn new(transport: impl Transport + 'a, destination: ResponseDestination<'a>) -> Self {
        Self {
            transport: Box::new(transport),
            destination,
        }
    }

    pub fn destination(&self) -> &ResponseDestination<'a> {
        &self.destination
    }
}

/// Builds the transport a request builder drives.
pub trait TransportFactory: Send + Sync {
    fn create<'a>(
        &'a self,
        destination: ResponseDestination<'a>,
        handler: HandlerKind,
        cancel: &CancelFlag,
    ) -> TransportHandle<'a>;
}

/// Factory for the real transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireFactory;

impl TransportFactory for WireFactory {
    fn create<'a>(
        &'a self,
        destination: ResponseDestination<'a>,
        handler: HandlerKind,
        cancel: &CancelFlag,
    ) -> TransportHandle<'a> {
        TransportHandle::new(WireTransport::new(handler, cancel.clone()), destination)
    }
}

/// Sends through the UNIX socket when the exchange names one and over the
/// network otherwise.
#[derive(Debug)]
pub struct WireTransport {
    network: NetworkTransport,
    #[cfg(unix)]
    unix: UnixSocketTransport,
}

impl WireTransport {
    pub fn new(handler: HandlerKind, cancel: CancelFlag) -> Self {
        Self {
            #[cfg(unix)]
            unix: UnixSocketTransport::new(cancel.clone()),
            network: NetworkTransport::new(handler, cancel),
        }
    }
}

impl Transport for WireTransport {
    fn perform(&mut self, exchange: &Exchange<'_>, sink: &mut dyn Write) -> Result<u16, TransportError> {
        match exchange.unix_socket {
            None => self.network.perform(exchange, sink),
            #[cfg(unix)]
            Some(_) => self.unix.perform(exchange, sink),
            #[cfg(not(unix))]
            Some(_) => Err(TransportError::other("unix sockets are not supported on this platform")),
        }
    }
}

/// Map a response status to the failure it represents, if any.
pub(crate) fn check_status(status: u16) -> Result<u16, TransportError> {
    if status >= 400 {
        Err(TransportError::http_status(status))
    } else {
        Ok(status)
    }
}

/// Classify a failed read or write, giving the cancel flag precedence.
pub(crate) fn stream_failure(err: io::Error, cancel: &CancelFlag) -> TransportError {
    if cancel.is_cancelled() {
        TransportError::cancelled()
    } else {
        TransportError::io(err)
    }
}

/// Copy `reader` into `sink` chunk by chunk, checking the cancel flag
/// between chunks. Returns the number of bytes copied.
pub(crate) fn copy_body(
    reader: &mut dyn Read,
    sink: &mut dyn Write,
    cancel: &CancelFlag,
) -> Result<u64, TransportError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(stream_failure(e, cancel)),
        };
        sink.write_all(&buf[..n]).map_err(TransportError::io)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;

    #[test]
    fn statuses_below_400_pass() {
        assert_eq!(check_status(200).unwrap(), 200);
        assert_eq!(check_status(302).unwrap(), 302);
    }

    #[test]
    fn statuses_from_400_fail_with_code() {
        let err = check_status(404).unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.kind(), TransportErrorKind::Status);
    }

    #[test]
    fn copy_body_moves_everything() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 5];
        let mut sink = Vec::new();
        let copied = copy_body(&mut data.as_slice(), &mut sink, &CancelFlag::new()).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(sink, data);
    }

    #[test]
    fn copy_body_stops_when_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let err = copy_body(&mut &b"data"[..], &mut sink, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert!(sink.is_empty());
    }

    #[test]
    fn stream_failure_prefers_cancellation() {
        let cancel = CancelFlag::new();
        let err = stream_failure(io::Error::other("boom"), &cancel);
        assert_eq!(err.kind(), TransportErrorKind::Io);
        cancel.cancel();
        let err = stream_failure(io::Error::other("boom"), &cancel);
        assert!(err.is_cancelled());
    }
}
