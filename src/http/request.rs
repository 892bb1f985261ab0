//! Outgoing request context.
//!
//! # Responsibilities
//! - Hold the URL, method, headers and decoded body of one outbound call
//! - Decode form and JSON bodies into named fields, encode them back
//! - Serialize headers and body as JSON text for the audit log
//!
//! # Design Decisions
//! - Header names are case-insensitive (HeaderMap)
//! - Field order is preserved through decode/encode
//! - Form re-encoding works over the original pairs, so repeated keys the
//!   rewrite did not touch reach the wire exactly as the host sent them
//! - Bodies that are neither form nor JSON objects are carried through as raw bytes

use std::collections::{HashMap, HashSet};

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// How a field-based body travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Form,
    Json,
}

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Fields {
        encoding: BodyEncoding,
        fields: Map<String, Value>,
    },
    Raw(Bytes),
}

impl RequestBody {
    /// A form body from string pairs.
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        RequestBody::Fields {
            encoding: BodyEncoding::Form,
            fields,
        }
    }

    /// Decode wire bytes according to the request content type.
    pub fn decode(content_type: Option<&str>, bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return RequestBody::Empty;
        }

        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if content_type.starts_with("application/json") {
            return match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(fields)) => RequestBody::Fields {
                    encoding: BodyEncoding::Json,
                    fields,
                },
                _ => RequestBody::Raw(bytes),
            };
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let fields = form_urlencoded::parse(&bytes)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            return RequestBody::Fields {
                encoding: BodyEncoding::Form,
                fields,
            };
        }

        RequestBody::Raw(bytes)
    }

    /// Encode the body for the wire.
    pub fn encode(&self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Raw(bytes) => bytes.clone(),
            RequestBody::Fields {
                encoding: BodyEncoding::Json,
                fields,
            } => Bytes::from(Value::Object(fields.clone()).to_string()),
            RequestBody::Fields {
                encoding: BodyEncoding::Form,
                fields,
            } => {
                let mut form = form_urlencoded::Serializer::new(String::new());
                for (name, value) in fields {
                    form.append_pair(name, &form_value(value));
                }
                Bytes::from(form.finish())
            }
        }
    }

    /// Encode the body for the wire, reusing `original` where possible.
    ///
    /// For form bodies every original pair whose key still holds its decoded
    /// value is written back as it was, duplicates included. A changed key is
    /// written once at its first position, a removed key is dropped and new
    /// keys are appended. Other bodies encode as [`RequestBody::encode`].
    pub fn encode_over(&self, original: &[u8]) -> Bytes {
        let RequestBody::Fields {
            encoding: BodyEncoding::Form,
            fields,
        } = self
        else {
            return self.encode();
        };

        let pairs: Vec<(String, String)> = form_urlencoded::parse(original).into_owned().collect();
        // decoding keeps the last value of a repeated key
        let decoded: HashMap<&str, &str> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let mut form = form_urlencoded::Serializer::new(String::new());
        let mut changed_written = HashSet::new();
        for (name, value) in &pairs {
            match fields.get(name) {
                None => {}
                Some(Value::String(current)) if decoded.get(name.as_str()) == Some(&current.as_str()) => {
                    form.append_pair(name, value);
                }
                Some(current) => {
                    if changed_written.insert(name.as_str()) {
                        form.append_pair(name, &form_value(current));
                    }
                }
            }
        }
        for (name, value) in fields {
            if !decoded.contains_key(name.as_str()) {
                form.append_pair(name, &form_value(value));
            }
        }
        Bytes::from(form.finish())
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            RequestBody::Fields { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            RequestBody::Fields { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields().and_then(|fields| fields.get(name))
    }

    /// JSON rendering used by the audit log.
    pub fn to_log_json(&self) -> String {
        let value = match self {
            RequestBody::Empty => Value::Object(Map::new()),
            RequestBody::Fields { fields, .. } => Value::Object(fields.clone()),
            RequestBody::Raw(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        };
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Context of one outbound call, transformed in place before transmission.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Add a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<axum::http::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Build the context from a buffered http request.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        Self {
            method: parts.method.clone(),
            url: parts.uri.to_string(),
            headers: parts.headers.clone(),
            body: RequestBody::decode(content_type, body),
        }
    }

    /// Reassemble an http request, keeping version and extensions from `parts`.
    pub fn into_http_request(self, parts: Parts) -> Request<Body> {
        let bytes = self.body.encode();
        self.into_http_request_with_body(parts, bytes)
    }

    /// Reassemble an http request carrying `bytes` as its wire body.
    pub fn into_http_request_with_body(self, mut parts: Parts, bytes: Bytes) -> Request<Body> {
        if self.url != parts.uri.to_string() {
            match self.url.parse::<Uri>() {
                Ok(uri) => parts.uri = uri,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Rewritten URL is not a valid URI, keeping original");
                }
            }
        }

        parts.method = self.method;
        parts.headers = self.headers;
        if !bytes.is_empty() || parts.headers.contains_key(CONTENT_LENGTH) {
            parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }

        Request::from_parts(parts, Body::from(bytes))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Replace the user-agent header. Returns false if `value` is not a
    /// valid header value.
    pub fn set_user_agent(&mut self, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(USER_AGENT, value);
                true
            }
            Err(_) => false,
        }
    }

    /// Headers as a pretty JSON object; repeated headers are joined with ", ".
    pub fn headers_json(&self) -> String {
        let mut map = Map::new();
        for name in self.headers.keys() {
            let joined = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            map.insert(name.as_str().to_string(), Value::String(joined));
        }
        serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_decode_keeps_order() {
        let body = RequestBody::decode(
            Some("application/x-www-form-urlencoded; charset=UTF-8"),
            Bytes::from_static(b"plugins=%7B%7D&translations=%5B%5D&locale=%5B%22de_DE%22%5D"),
        );

        let fields = body.fields().unwrap();
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["plugins", "translations", "locale"]);
        assert_eq!(fields["plugins"], Value::String("{}".into()));
        assert_eq!(fields["locale"], Value::String("[\"de_DE\"]".into()));
    }

    #[test]
    fn test_json_decode_and_encode() {
        let body = RequestBody::decode(
            Some("application/json"),
            Bytes::from_static(br#"{"themes":"{}","all":true}"#),
        );
        assert!(matches!(
            body,
            RequestBody::Fields {
                encoding: BodyEncoding::Json,
                ..
            }
        ));
        assert_eq!(body.encode(), Bytes::from_static(br#"{"themes":"{}","all":true}"#));
    }

    #[test]
    fn test_unknown_content_is_raw() {
        let body = RequestBody::decode(Some("text/plain"), Bytes::from_static(b"hello"));
        assert_eq!(body, RequestBody::Raw(Bytes::from_static(b"hello")));
        assert_eq!(body.encode(), Bytes::from_static(b"hello"));

        let body = RequestBody::decode(Some("application/json"), Bytes::from_static(b"[1,2]"));
        assert!(matches!(body, RequestBody::Raw(_)));

        assert_eq!(RequestBody::decode(None, Bytes::new()), RequestBody::Empty);
    }

    #[test]
    fn test_form_encode() {
        let body = RequestBody::form([("active", "[\"a/a.php\"]"), ("all", "true")]);
        assert_eq!(
            body.encode(),
            Bytes::from_static(b"active=%5B%22a%2Fa.php%22%5D&all=true")
        );
    }

    #[test]
    fn test_encode_over_keeps_repeated_keys() {
        let original = b"plugins=%7B%22a%22%3A%7B%7D%7D&locale%5B%5D=de_DE&locale%5B%5D=fr_FR&all=true";
        let mut body = RequestBody::decode(Some("application/x-www-form-urlencoded"), Bytes::from_static(original));

        // untouched body: same pairs back, duplicates included
        assert_eq!(body.encode_over(original), Bytes::from_static(original));

        let fields = body.fields_mut().unwrap();
        fields.insert("plugins".into(), Value::String("{}".into()));
        fields.remove("all");
        fields.insert("extra".into(), Value::String("1".into()));

        assert_eq!(
            body.encode_over(original),
            Bytes::from_static(b"plugins=%7B%7D&locale%5B%5D=de_DE&locale%5B%5D=fr_FR&extra=1")
        );
    }

    #[test]
    fn test_encode_over_collapses_a_changed_repeated_key() {
        let original = b"a=1&b=x&a=2";
        let mut body = RequestBody::decode(Some("application/x-www-form-urlencoded"), Bytes::from_static(original));
        body.fields_mut().unwrap().insert("a".into(), Value::String("3".into()));

        assert_eq!(body.encode_over(original), Bytes::from_static(b"a=3&b=x"));
    }

    #[test]
    fn test_user_agent_header_is_case_insensitive() {
        let mut request = OutgoingRequest::new(Method::POST, "https://api.example.org/")
            .with_header("User-Agent", "WordPress/6.5; https://blog.example.com");
        assert_eq!(request.user_agent(), Some("WordPress/6.5; https://blog.example.com"));

        assert!(request.set_user_agent("WordPress/6.5; wordpress.org"));
        assert_eq!(request.user_agent(), Some("WordPress/6.5; wordpress.org"));
        assert!(!request.set_user_agent("bad\nvalue"));
    }

    #[test]
    fn test_log_json() {
        let request = OutgoingRequest::new(Method::POST, "https://api.example.org/")
            .with_header("accept", "application/json")
            .with_body(RequestBody::form([("plugins", "{}")]));

        let headers: Value = serde_json::from_str(&request.headers_json()).unwrap();
        assert_eq!(headers["accept"], "application/json");

        let body: Value = serde_json::from_str(&request.body.to_log_json()).unwrap();
        assert_eq!(body["plugins"], "{}");

        assert_eq!(RequestBody::Empty.to_log_json(), "{}");
    }

    #[test]
    fn test_into_http_request_fixes_length_and_uri() {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri("https://api.example.org/plugins/update-check/?x=1")
            .header(CONTENT_LENGTH, "999")
            .body(())
            .unwrap()
            .into_parts();

        let mut outgoing = OutgoingRequest::from_parts(&parts, Bytes::new());
        outgoing.url = "https://api.example.org/plugins/update-check/".into();
        outgoing.body = RequestBody::form([("plugins", "{}")]);

        let request = outgoing.into_http_request(parts);
        assert_eq!(request.uri(), "https://api.example.org/plugins/update-check/");
        assert_eq!(request.headers()[CONTENT_LENGTH], "14");
    }
}
