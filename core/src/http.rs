//! Request vocabulary shared by builders, facades and transports.
//!
//! # Design
//! These are plain owned values: a verb tag, an ordered header list, the
//! transport-security mode and the target address. Nothing here performs
//! I/O; transports read them through an `Exchange`.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method send a payload.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of request headers.
///
/// Insertion order is kept and entries are sent verbatim. Duplicate names
/// are allowed; merging them is left to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    /// An empty header set. `HeaderSet::default()` carries the JSON defaults.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Build a header set from `"Name: value"` lines. Lines without a colon
    /// are skipped.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| {
                let (name, value) = line.as_ref().split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HeaderSet {
    fn default() -> Self {
        HeaderSet::new()
            .with("Content-Type", "application/json")
            .with("Accept", "application/json")
            .with("Accept-Charset", "utf-8")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut set = HeaderSet::new();
        set.extend(iter);
        set
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for HeaderSet {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

/// Transport-security mode of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureCommunication {
    verify_peer: bool,
    basic_auth: Option<(String, String)>,
}

impl Default for SecureCommunication {
    fn default() -> Self {
        Self {
            verify_peer: true,
            basic_auth: None,
        }
    }
}

impl SecureCommunication {
    /// Skip TLS certificate verification.
    pub fn insecure() -> Self {
        Self {
            verify_peer: false,
            ..Self::default()
        }
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Value of the `Authorization` header, when credentials are set.
    pub fn authorization(&self) -> Option<String> {
        self.basic_auth
            .as_ref()
            .map(|(user, password)| format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
    }
}

/// Where a request goes: a URL, plus a socket path for UNIX-socket targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: String,
    socket_path: Option<PathBuf>,
    secure: SecureCommunication,
}

impl Target {
    /// A network target.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket_path: None,
            secure: SecureCommunication::default(),
        }
    }

    /// A target reached through the UNIX socket at `socket_path`. The URL
    /// supplies the request path and `Host` header.
    pub fn unix_socket(socket_path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket_path: Some(socket_path.into()),
            secure: SecureCommunication::default(),
        }
    }

    pub fn with_security(mut self, secure: SecureCommunication) -> Self {
        self.secure = secure;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    pub fn secure(&self) -> &SecureCommunication {
        &self.secure
    }
}
