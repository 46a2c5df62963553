//! HTTP/1.1 over a UNIX-domain stream socket.
//!
//! # Design
//! One connection per exchange, closed by the request (`Connection: close`).
//! The socket is read and written in `POLL_INTERVAL` slices so the cancel
//! flag and the deadline are honored while waiting on a silent peer or one
//! that stopped reading, for either handler kind. The response body is framed by `Content-Length`, by chunked
//! transfer coding, or by the peer closing the connection.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, trace};
use url::{Position, Url};

use super::{check_status, copy_body, stream_failure, Exchange, Transport, POLL_INTERVAL};
use crate::config::CancelFlag;
use crate::error::TransportError;

const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct UnixSocketTransport {
    cancel: CancelFlag,
}

impl UnixSocketTransport {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    fn connect(&self, path: &Path, deadline: Option<Instant>) -> Result<PolledStream, TransportError> {
        let stream = UnixStream::connect(path).map_err(TransportError::io)?;
        stream.set_read_timeout(Some(POLL_INTERVAL)).map_err(TransportError::io)?;
        stream.set_write_timeout(Some(POLL_INTERVAL)).map_err(TransportError::io)?;
        Ok(PolledStream {
            stream,
            cancel: self.cancel.clone(),
            deadline,
        })
    }
}

impl Transport for UnixSocketTransport {
    fn perform(&mut self, exchange: &Exchange<'_>, sink: &mut dyn Write) -> Result<u16, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        let Some(path) = exchange.unix_socket else {
            return Err(TransportError::other("no unix socket path"));
        };
        let deadline = exchange.timeout.map(|t| Instant::now() + t);
        let request = encode_request(exchange)?;
        debug!(method = %exchange.method, url = exchange.url, socket = %path.display(), "sending over unix socket");

        let mut stream = self.connect(path, deadline)?;
        stream.write_all(&request).map_err(|e| stream_failure(e, &self.cancel))?;

        let mut reader = BufReader::new(stream);
        let head = loop {
            let head = read_head(&mut reader, &self.cancel)?;
            // Interim responses carry no body; the final head follows.
            if !(100..200).contains(&head.status) {
                break head;
            }
        };
        let status = check_status(head.status)?;

        let copied = match head.framing() {
            Framing::Empty => 0,
            Framing::Chunked => copy_chunked(&mut reader, sink, &self.cancel)?,
            Framing::Length(len) => {
                let copied = copy_body(&mut (&mut reader).take(len), sink, &self.cancel)?;
                if copied < len {
                    return Err(TransportError::protocol(format!(
                        "response body ended after {copied} of {len} bytes"
                    )));
                }
                copied
            }
            Framing::UntilClose => copy_body(&mut reader, sink, &self.cancel)?,
        };
        trace!(status, copied, "response body copied");
        Ok(status)
    }
}

/// Blocking stream that wakes every `POLL_INTERVAL` to check the cancel
/// flag and the deadline.
struct PolledStream {
    stream: UnixStream,
    cancel: CancelFlag,
    deadline: Option<Instant>,
}

impl PolledStream {
    fn check(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("cancelled"));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(io::ErrorKind::TimedOut.into());
        }
        Ok(())
    }
}

fn is_slice_expiry(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Read for PolledStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.check()?;
            match self.stream.read(buf) {
                Err(e) if is_slice_expiry(&e) => continue,
                other => return other,
            }
        }
    }
}

impl Write for PolledStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            self.check()?;
            match self.stream.write(buf) {
                Err(e) if is_slice_expiry(&e) => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

fn encode_request(exchange: &Exchange<'_>) -> Result<Vec<u8>, TransportError> {
    let url = Url::parse(exchange.url).map_err(|_| TransportError::invalid_url())?;
    let host = url.host_str().ok_or_else(TransportError::invalid_url)?;
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let body = exchange.body.unwrap_or_default();

    let mut req = Vec::with_capacity(256 + body.len());
    req.extend_from_slice(exchange.method.as_str().as_bytes());
    req.push(b' ');
    req.extend_from_slice(if target.is_empty() { "/" } else { target }.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\n");

    let mut push_header = |name: &str, value: &str| {
        req.extend_from_slice(name.as_bytes());
        req.extend_from_slice(b": ");
        req.extend_from_slice(value.as_bytes());
        req.extend_from_slice(b"\r\n");
    };
    match url.port() {
        Some(port) => push_header("Host", &format!("{host}:{port}")),
        None => push_header("Host", host),
    }
    for (name, value) in exchange.headers.iter() {
        push_header(name, value);
    }
    if let Some(authorization) = exchange.secure.authorization() {
        push_header("Authorization", &authorization);
    }
    push_header("User-Agent", exchange.user_agent);
    if exchange.body.is_some() {
        push_header("Content-Length", &body.len().to_string());
    }
    push_header("Connection", "close");

    req.extend_from_slice(b"\r\n");
    req.extend_from_slice(body);
    Ok(req)
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct ResponseHead {
    status: u16,
    content_length: Option<u64>,
    chunked: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Framing {
    Empty,
    Chunked,
    Length(u64),
    UntilClose,
}

impl ResponseHead {
    fn framing(&self) -> Framing {
        if matches!(self.status, 204 | 304) {
            Framing::Empty
        } else if self.chunked {
            Framing::Chunked
        } else if let Some(len) = self.content_length {
            Framing::Length(len)
        } else {
            Framing::UntilClose
        }
    }
}

/// Read one `\r\n`-terminated line, without the terminator.
fn read_line(reader: &mut impl BufRead, cancel: &CancelFlag, limit: usize) -> Result<String, TransportError> {
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', &mut line)
        .map_err(|e| stream_failure(e, cancel))?;
    if n == 0 {
        return Err(TransportError::protocol("connection closed before response was complete"));
    }
    if line.last() != Some(&b'\n') {
        return Err(TransportError::protocol("response line too long"));
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| TransportError::protocol("response head is not valid UTF-8"))
}

fn read_head(reader: &mut impl BufRead, cancel: &CancelFlag) -> Result<ResponseHead, TransportError> {
    let mut budget = MAX_HEAD_BYTES;
    let status_line = read_line(reader, cancel, budget)?;
    budget = budget.saturating_sub(status_line.len() + 2);
    let status = parse_status_line(&status_line)?;

    let mut head = ResponseHead {
        status,
        content_length: None,
        chunked: false,
    };
    loop {
        if budget == 0 {
            return Err(TransportError::protocol("response head too large"));
        }
        let line = read_line(reader, cancel, budget)?;
        if line.is_empty() {
            return Ok(head);
        }
        budget = budget.saturating_sub(line.len() + 2);
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            let len = value
                .parse()
                .map_err(|_| TransportError::protocol(format!("invalid content-length: {value}")))?;
            head.content_length = Some(len);
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.rsplit(',').next().is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"))
        {
            head.chunked = true;
        }
    }
}

fn parse_status_line(line: &str) -> Result<u16, TransportError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TransportError::protocol(format!("malformed status line: {line}")));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| TransportError::protocol(format!("malformed status line: {line}")))
}

/// Parse a chunk-size line, ignoring chunk extensions.
fn parse_chunk_size(line: &str) -> Result<u64, TransportError> {
    let hex = line.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(hex, 16).map_err(|_| TransportError::protocol(format!("invalid chunk size: {line}")))
}

fn copy_chunked(
    reader: &mut impl BufRead,
    sink: &mut dyn Write,
    cancel: &CancelFlag,
) -> Result<u64, TransportError> {
    let mut total = 0;
    loop {
        let size = parse_chunk_size(&read_line(reader, cancel, MAX_HEAD_BYTES)?)?;
        if size == 0 {
            // Trailers, up to the blank line.
            while !read_line(reader, cancel, MAX_HEAD_BYTES)?.is_empty() {}
            return Ok(total);
        }
        let copied = copy_body(&mut (&mut *reader).take(size), sink, cancel)?;
        if copied < size {
            return Err(TransportError::protocol("chunk ended early"));
        }
        total += copied;
        if !read_line(reader, cancel, 2)?.is_empty() {
            return Err(TransportError::protocol("missing chunk terminator"));
        }
    }
}
