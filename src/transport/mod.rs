//! The narrow HTTP contract the submitter depends on.
//!
//! Anything that can POST bytes and hand back a status plus a body stream
//! implements [`HttpTransport`]: the reqwest client in production, a test
//! double in tests.

mod http_client;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

use crate::error::Result;

pub use http_client::ReqwestTransport;

pub type BodyStream = BoxStream<'static, Result<Vec<u8>>>;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: BodyStream,
}

impl HttpResponse {
    /// Response with a fully buffered body.
    pub fn from_bytes(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: stream::iter(vec![Ok(body.into())]).boxed(),
        }
    }

    /// Drains the body and decodes it as UTF-8, replacing invalid sequences.
    pub async fn read_text(mut self) -> Result<String> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Body with each line trimmed and the lines joined without separators.
    /// `\n`, `\r` and `\r\n` all end a line.
    pub async fn read_trimmed_lines(self) -> Result<String> {
        let text = self.read_text().await?;
        Ok(text
            .split(|c: char| c == '\n' || c == '\r')
            .map(str::trim)
            .collect())
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one request. A non-success status is not an error here.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}
