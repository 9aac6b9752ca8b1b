//! HTTP seam shared by every network collaborator.
//!
//! Stages talk to the document store, the publish API, the chat API and the
//! identity service only through [`HttpClient`], so tests can swap in a
//! scripted fake. Non-2xx responses are returned as data; callers decide which
//! statuses are acceptable.
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Bytes { content_type: String, data: Vec<u8> },
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Adds `Authorization: Bearer <token>` when a token is available.
    pub fn bearer(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => self.header("Authorization", &format!("Bearer {token}")),
            None => self,
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bytes(mut self, content_type: &str, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.to_string(),
            data,
        };
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        );
        self
    }

    /// Value of the first header with `name` (case-insensitive).
    #[cfg(test)]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).context("parse response body as JSON")
    }
}

/// A single-attempt HTTP transport.
pub trait HttpClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by a shared `ureq` agent.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            query,
            body,
        } = request;
        let start = Instant::now();

        let result = match method {
            Method::Get => {
                let mut builder = self.agent.get(&url);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                for (key, value) in &query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            Method::Put | Method::Post => {
                let mut builder = if method == Method::Put {
                    self.agent.put(&url)
                } else {
                    self.agent.post(&url)
                };
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                for (key, value) in &query {
                    builder = builder.query(key, value);
                }
                match &body {
                    RequestBody::Empty => builder.send_empty(),
                    RequestBody::Bytes { content_type, data } => builder
                        .header("Content-Type", content_type.as_str())
                        .send(&data[..]),
                    RequestBody::Form(fields) => builder.send_form(
                        fields
                            .iter()
                            .map(|(key, value)| (key.as_str(), value.as_str())),
                    ),
                }
            }
        };

        let mut response = result.with_context(|| format!("{} {url}", method.as_str()))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("read response body from {url}"))?;

        tracing::debug!(
            method = method.as_str(),
            url = %url,
            status,
            elapsed_ms = start.elapsed().as_millis(),
            response_bytes = text.len(),
            "http request complete"
        );

        Ok(HttpResponse { status, body: text })
    }
}

/// A `multipart/form-data` body holding one file field.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Encode a single file part the way a browser `FormData` upload does.
pub fn multipart_file(
    field: &str,
    filename: &str,
    part_content_type: &str,
    content: &[u8],
) -> MultipartFile {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let boundary = format!("----da-status-{nanos:x}");

    let mut data = Vec::with_capacity(content.len() + 256);
    data.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    data.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    data.extend_from_slice(format!("Content-Type: {part_content_type}\r\n\r\n").as_bytes());
    data.extend_from_slice(content);
    data.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    MultipartFile {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        data,
    }
}
