//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! C callers describe a request with borrowed C strings. Nothing crossing
//! the boundary is allocated by us except the opaque cancel flag, so the
//! only free function is `http_cancel_flag_free`. Conversions into core
//! types live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::borrow::Cow;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_long};
use std::time::Duration;

use http_request::{
    CancelFlag, Configuration, HandlerKind, Payload, RequestError, RequestParameters, SecureCommunication, Target,
};

/// Outcome of an `http_request_*` call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    /// A continuation fired: `on_success`, or `on_error` for a failure.
    Ok = 0,
    /// A required pointer argument was null.
    NullArg = 1,
    /// The call was malformed; nothing was sent and no continuation fired.
    Usage = 2,
    /// The request failed and no `on_error` was supplied.
    Transport = 3,
    Panic = 4,
}

impl From<Result<(), RequestError>> for FfiStatus {
    fn from(result: Result<(), RequestError>) -> Self {
        match result {
            Ok(()) => FfiStatus::Ok,
            Err(RequestError::Usage(_)) => FfiStatus::Usage,
            Err(RequestError::Transport(_)) => FfiStatus::Transport,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHandlerKind {
    Single = 0,
    Multi = 1,
}

impl From<FfiHandlerKind> for HandlerKind {
    fn from(kind: FfiHandlerKind) -> Self {
        match kind {
            FfiHandlerKind::Single => HandlerKind::Single,
            FfiHandlerKind::Multi => HandlerKind::Multi,
        }
    }
}

/// Opaque cancel flag. Create with `http_cancel_flag_new`, share the
/// pointer with the thread running the request, free with
/// `http_cancel_flag_free` once no call uses it.
pub struct FfiCancelFlag {
    pub(crate) inner: CancelFlag,
}

/// Receives the response body: `len` bytes at `body`, followed by a NUL.
/// The buffer is only valid during the callback.
pub type FfiOnSuccess = Option<extern "C" fn(body: *const c_char, len: usize, user_data: *mut c_void)>;

/// Receives the failure message and the peer's status code, or -1 when the
/// failure was local. The message is only valid during the callback.
pub type FfiOnError = Option<extern "C" fn(message: *const c_char, status: c_long, user_data: *mut c_void)>;

/// What to send and where. All strings are borrowed for the duration of
/// the call.
#[repr(C)]
pub struct FfiRequest {
    pub url: *const c_char,
    /// Null for network targets.
    pub socket_path: *const c_char,
    /// Null for no body.
    pub body: *const c_char,
    /// Null to receive the body in `on_success`.
    pub output_file: *const c_char,
    pub verify_peer: bool,
}

/// Per-call options. A null `FfiOptions` pointer means all defaults.
#[repr(C)]
pub struct FfiOptions {
    /// Zero means no timeout.
    pub timeout_ms: u64,
    /// Null for the default user agent.
    pub user_agent: *const c_char,
    pub handler: FfiHandlerKind,
    /// Null for a private flag nobody can set.
    pub cancel: *const FfiCancelFlag,
}

/// Borrow a C string. Null gives `None`; invalid UTF-8 is replaced.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
    }
}

impl FfiRequest {
    pub(crate) fn socket_path(&self) -> Option<Cow<'_, str>> {
        unsafe { c_str(self.socket_path) }
    }

    pub(crate) fn output_file(&self) -> Option<Cow<'_, str>> {
        unsafe { c_str(self.output_file) }
    }

    /// Core parameters borrowing this request's strings.
    pub(crate) fn parameters(&self) -> RequestParameters<'_> {
        let url = unsafe { c_str(self.url) }.unwrap_or_default().into_owned();
        let target = match self.socket_path() {
            Some(path) => Target::unix_socket(path.into_owned(), url),
            None => Target::http(url),
        };
        let secure = if self.verify_peer {
            SecureCommunication::default()
        } else {
            SecureCommunication::insecure()
        };
        let data = match unsafe { c_str(self.body) } {
            None => Payload::default(),
            Some(Cow::Borrowed(view)) => Payload::View(view),
            Some(Cow::Owned(text)) => Payload::Text(text),
        };
        RequestParameters::new(target.with_security(secure)).data(data)
    }
}

impl FfiOptions {
    /// Configuration for `options`, or the defaults when it is null.
    ///
    /// # Safety
    /// `options` must be null or point to a valid `FfiOptions` whose
    /// `cancel` is null or a live flag from `http_cancel_flag_new`.
    pub(crate) unsafe fn configuration(options: *const FfiOptions) -> Configuration {
        let Some(options) = (unsafe { options.as_ref() }) else {
            return Configuration::default();
        };
        let mut config = Configuration::default().with_handler(options.handler.into());
        if options.timeout_ms > 0 {
            config = config.with_timeout(Duration::from_millis(options.timeout_ms));
        }
        if let Some(user_agent) = unsafe { c_str(options.user_agent) } {
            config = config.with_user_agent(user_agent.into_owned());
        }
        if let Some(cancel) = unsafe { options.cancel.as_ref() } {
            config = config.with_cancel_flag(&cancel.inner);
        }
        config
    }
}
