//! C-ABI wrapper around `http-request`.
//!
//! # Overview
//! Exposes the request facades through `extern "C"` functions. C callers
//! pass function-pointer continuations plus a `user_data` pointer instead
//! of closures; exactly one continuation fires per call that returns
//! `FfiStatus::Ok`.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - One `http_request_*` function per verb, all sharing `perform`.
//! - A non-null `socket_path` selects the UNIX-socket facade.
//! - The only heap object handed to C is the cancel flag.

pub mod types;

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_long};
use std::panic::{catch_unwind, AssertUnwindSafe};

use http_request::{CompletionSink, Configuration, RequestError, RequestParameters, UrlRequest};

use types::*;

type Call = fn(&UrlRequest, RequestParameters<'_>, CompletionSink<'_>, Configuration) -> Result<(), RequestError>;

// ---------------------------------------------------------------------------
// Cancel flag lifecycle
// ---------------------------------------------------------------------------

/// Create an unset cancel flag.
///
/// The caller must free the returned pointer with `http_cancel_flag_free`.
#[unsafe(no_mangle)]
pub extern "C" fn http_cancel_flag_new() -> *mut FfiCancelFlag {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiCancelFlag {
            inner: Default::default(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Ask every request observing `flag` to stop. Safe to call with null and
/// from any thread.
#[unsafe(no_mangle)]
pub extern "C" fn http_cancel_flag_cancel(flag: *const FfiCancelFlag) {
    if let Some(flag) = unsafe { flag.as_ref() } {
        let _ = catch_unwind(AssertUnwindSafe(|| flag.inner.cancel()));
    }
}

/// Clear `flag` so it can guard another call. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn http_cancel_flag_reset(flag: *const FfiCancelFlag) {
    if let Some(flag) = unsafe { flag.as_ref() } {
        let _ = catch_unwind(AssertUnwindSafe(|| flag.inner.reset()));
    }
}

/// Free a flag created by `http_cancel_flag_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn http_cancel_flag_free(flag: *mut FfiCancelFlag) {
    if !flag.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(flag) });
        });
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Perform a GET.
///
/// Returns `NullArg` if `request`, its `url` or `on_success` is null.
#[unsafe(no_mangle)]
pub extern "C" fn http_request_get(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::get, request, options, on_success, on_error, user_data)
}

/// Perform a POST with `request->body` (empty when null).
#[unsafe(no_mangle)]
pub extern "C" fn http_request_post(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::post, request, options, on_success, on_error, user_data)
}

#[unsafe(no_mangle)]
pub extern "C" fn http_request_put(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::put, request, options, on_success, on_error, user_data)
}

#[unsafe(no_mangle)]
pub extern "C" fn http_request_patch(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::patch, request, options, on_success, on_error, user_data)
}

/// Perform a DELETE. A non-empty `request->body` is a usage error.
#[unsafe(no_mangle)]
pub extern "C" fn http_request_delete(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::delete, request, options, on_success, on_error, user_data)
}

/// Stream a GET response into `request->output_file`, which is required.
/// `on_success` receives an empty body.
#[unsafe(no_mangle)]
pub extern "C" fn http_request_download(
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    perform(UrlRequest::download, request, options, on_success, on_error, user_data)
}

fn perform(
    call: Call,
    request: *const FfiRequest,
    options: *const FfiOptions,
    on_success: FfiOnSuccess,
    on_error: FfiOnError,
    user_data: *mut c_void,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let (Some(request), Some(on_success)) = (unsafe { request.as_ref() }, on_success) else {
            return FfiStatus::NullArg;
        };
        if request.url.is_null() {
            return FfiStatus::NullArg;
        }

        let mut sink = CompletionSink::borrowed(move |body: &str| {
            let mut bytes = Vec::with_capacity(body.len() + 1);
            bytes.extend_from_slice(body.as_bytes());
            bytes.push(0);
            on_success(bytes.as_ptr().cast(), body.len(), user_data);
        });
        if let Some(on_error) = on_error {
            sink = sink.on_error(move |message, status| {
                let message = c_message(message);
                on_error(message.as_ptr(), status.map_or(-1, c_long::from), user_data);
            });
        }
        if let Some(path) = request.output_file() {
            sink = sink.output_file(path.into_owned());
        }

        let facade = if request.socket_path().is_some() {
            UrlRequest::unix_socket()
        } else {
            UrlRequest::http()
        };
        let config = unsafe { FfiOptions::configuration(options) };
        call(&facade, request.parameters(), sink, config).into()
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// `message` as a C string, with interior NULs replaced by spaces.
fn c_message(message: &str) -> CString {
    CString::new(message.replace('\0', " ")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
