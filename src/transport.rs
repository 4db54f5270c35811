//! Transport abstraction and the default HTTP implementation.
//!
//! The engine only ever talks to [`Transport`]: `perform` for metadata
//! requests and `download` for bulk payloads. [`HttpTransport`] maps HTTP
//! status classes onto the engine's error taxonomy; tests substitute a
//! scripted fake.

use crate::error::{Error, Result};
use crate::session::SessionContext;
use crate::types::{decode, ApiErrorBody};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A file part plus accompanying text fields for a multipart request.
#[derive(Debug, Clone)]
pub struct MultipartPayload {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub text_fields: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    None,
    Form(Vec<(String, String)>),
    Multipart(MultipartPayload),
}

/// Everything the transport needs to issue one request. The engine supplies
/// descriptors; it never sees connection details.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub requires_auth: bool,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        RequestDescriptor {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::None,
            requires_auth: false,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn with_multipart(mut self, payload: MultipartPayload) -> Self {
        self.body = RequestBody::Multipart(payload);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

pub trait Transport {
    /// Issue a metadata request, returning the raw response body.
    fn perform(&mut self, session: &SessionContext, request: &RequestDescriptor) -> Result<Vec<u8>>;

    /// Stream a bulk payload to `dest`, reporting `(bytes_done, bytes_total)`
    /// as it goes. Returns the byte count written.
    fn download(
        &mut self,
        session: &SessionContext,
        url: &str,
        dest: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64>;
}

/// Blocking HTTP transport over `reqwest`.
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Other(format!("invalid base URL '{}': {}", base_url, e)))?;
        Ok(HttpTransport {
            base_url,
            client: reqwest::blocking::Client::new(),
        })
    }

    fn classify_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            Error::Network(format!(
                "cannot connect to {}: {}",
                self.base_url, e
            ))
        } else if e.is_timeout() {
            Error::Network("request timed out".to_string())
        } else {
            Error::Network(e.to_string())
        }
    }

    fn classify_status(status: u16, body: &[u8]) -> Error {
        if status == 401 {
            return Error::AuthExpired;
        }
        if status == 429 {
            // Retry-After is carried in the error body by services that strip
            // headers at the CDN; fall back to a fixed window.
            let retry_after = decode::<ApiErrorBody>(body)
                .ok()
                .and_then(|b| {
                    if b.error.message.is_empty() {
                        None
                    } else {
                        b.error.message.split_whitespace().rev().find_map(|w| w.parse().ok())
                    }
                })
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            return Error::RateLimited { retry_after };
        }
        match decode::<ApiErrorBody>(body) {
            Ok(parsed) => Error::Api {
                status,
                code: parsed.error.code,
                message: parsed.error.message,
            },
            Err(_) => Error::Network(format!("HTTP {}", status)),
        }
    }
}

impl Transport for HttpTransport {
    fn perform(&mut self, session: &SessionContext, request: &RequestDescriptor) -> Result<Vec<u8>> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| Error::Other(format!("invalid request path '{}': {}", request.path, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", session.api_key());
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        if request.requires_auth {
            let token = session.token().ok_or(Error::NotAuthenticated)?;
            builder = builder.bearer_auth(&token.value);
        }

        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart(payload) => {
                let mut form = reqwest::blocking::multipart::Form::new().part(
                    payload.field.clone(),
                    reqwest::blocking::multipart::Part::bytes(payload.bytes.clone())
                        .file_name(payload.file_name.clone()),
                );
                for (k, v) in &payload.text_fields {
                    form = form.text(k.clone(), v.clone());
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().map_err(|e| self.classify_send_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if (200..300).contains(&status) {
            Ok(body.to_vec())
        } else {
            Err(Self::classify_status(status, &body))
        }
    }

    fn download(
        &mut self,
        _session: &SessionContext,
        url: &str,
        dest: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(Error::Network(format!("download failed: HTTP {}", status)));
        }

        let total = response.content_length().unwrap_or(0);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(dest)?);
        let mut reader = response;
        let mut buf = [0u8; 64 * 1024];
        let mut done: u64 = 0;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| Error::Network(format!("download interrupted: {}", e)))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            done += n as u64;
            progress(done, total.max(done));
        }
        writer.flush()?;
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builders() {
        let req = RequestDescriptor::post("games/1/mods/2/subscribe")
            .with_form(vec![("include_dependencies".into(), "true".into())])
            .authenticated();
        assert_eq!(req.method, Method::Post);
        assert!(req.requires_auth);
        assert!(matches!(req.body, RequestBody::Form(_)));
    }

    #[test]
    fn test_classify_status_auth_expired() {
        assert!(matches!(
            HttpTransport::classify_status(401, b"{}"),
            Error::AuthExpired
        ));
    }

    #[test]
    fn test_classify_status_rate_limited_default_window() {
        match HttpTransport::classify_status(429, b"{}") {
            Error::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_rate_limited_window_from_body() {
        let body = br#"{"error":{"code":11008,"message":"too many requests, retry in 30"}}"#;
        match HttpTransport::classify_status(429, body) {
            Error::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_api_error() {
        let body = br#"{"error":{"code":15004,"message":"already subscribed"}}"#;
        match HttpTransport::classify_status(400, body) {
            Error::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, 15004);
                assert_eq!(message, "already subscribed");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_unparseable_body() {
        assert!(matches!(
            HttpTransport::classify_status(502, b"<html>bad gateway</html>"),
            Error::Network(_)
        ));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpTransport::new("not a url").is_err());
    }
}
