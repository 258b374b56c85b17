use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::http::pool::create_http_client;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// [`HttpTransport`] backed by a pooled reqwest [`Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(create_http_client(config)?))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(AppError::Http)?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AppError::Http))
            .boxed();

        Ok(HttpResponse { status, body })
    }
}
