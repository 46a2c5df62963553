//! Request body variants and their resolution to wire bytes.
//!
//! # Design
//! Callers hand a body over as owned text, as a JSON document, or as a view
//! into memory they keep owning. Resolution yields a `Cow<[u8]>`: text and
//! views are borrowed as-is, a document is serialized once into an owned
//! buffer. Which variants a verb accepts is checked before any exchange,
//! so a mismatch surfaces as a `UsageError` instead of an empty body.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::UsageError;
use crate::http::HttpMethod;

/// The body of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    /// Text owned by the payload.
    Text(String),
    /// A JSON document, serialized compactly before sending.
    Document(Value),
    /// Text borrowed from the caller for the duration of the call.
    View(&'a str),
}

impl Default for Payload<'_> {
    fn default() -> Self {
        Payload::Text(String::new())
    }
}

impl From<String> for Payload<'_> {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(view: &'a str) -> Self {
        Payload::View(view)
    }
}

impl From<Value> for Payload<'_> {
    fn from(document: Value) -> Self {
        Payload::Document(document)
    }
}

impl<'a> Payload<'a> {
    /// Short name of the active variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Document(_) => "document",
            Payload::View(_) => "view",
        }
    }

    /// Whether the payload amounts to "no body". A document never does.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::View(view) => view.is_empty(),
            Payload::Document(_) => false,
        }
    }

    /// Bytes to put on the wire. Only a document allocates.
    pub fn resolve(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text.as_bytes()),
            Payload::View(view) => Cow::Borrowed(view.as_bytes()),
            Payload::Document(document) => Cow::Owned(document.to_string().into_bytes()),
        }
    }

    /// Resolve the payload for `method`.
    ///
    /// Body-carrying verbs always get `Some` bytes. Bodyless verbs accept
    /// only an empty text or view and get `None`; anything else is an
    /// invalid payload type for that verb.
    pub fn body_for(&self, method: HttpMethod) -> Result<Option<Cow<'_, [u8]>>, UsageError> {
        if method.carries_body() {
            return Ok(Some(self.resolve()));
        }
        if self.is_empty() {
            Ok(None)
        } else {
            Err(UsageError::InvalidPayload { method })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_variant_resolves_to_the_same_bytes() {
        let text = r#"{"hello":"world"}"#;
        let variants = [
            Payload::Text(text.to_string()),
            Payload::Document(json!({"hello": "world"})),
            Payload::View(text),
        ];
        for payload in &variants {
            assert_eq!(payload.resolve().as_ref(), text.as_bytes(), "{}", payload.kind());
        }
    }

    #[test]
    fn document_is_serialized_compactly() {
        let payload = Payload::from(json!({"a": 1}));
        assert_eq!(payload.resolve().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn text_and_view_are_not_copied() {
        let owned = Payload::Text("abc".to_string());
        assert!(matches!(owned.resolve(), Cow::Borrowed(_)));
        let view = Payload::View("abc");
        assert!(matches!(view.resolve(), Cow::Borrowed(_)));
    }

    #[test]
    fn body_verbs_always_get_bytes() {
        let payload = Payload::default();
        let body = payload.body_for(HttpMethod::Post).unwrap();
        assert_eq!(body.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn bodyless_verbs_accept_empty_text() {
        assert_eq!(Payload::default().body_for(HttpMethod::Get).unwrap(), None);
        assert_eq!(Payload::View("").body_for(HttpMethod::Delete).unwrap(), None);
    }

    #[test]
    fn bodyless_verbs_reject_documents() {
        let err = Payload::from(json!({})).body_for(HttpMethod::Get).unwrap_err();
        assert_eq!(
            err,
            UsageError::InvalidPayload {
                method: HttpMethod::Get
            }
        );
    }

    #[test]
    fn bodyless_verbs_reject_non_empty_text() {
        let err = Payload::from("data").body_for(HttpMethod::Delete).unwrap_err();
        assert!(matches!(err, UsageError::InvalidPayload { method: HttpMethod::Delete }));
    }
}
