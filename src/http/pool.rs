use reqwest::Client;
use std::time::Duration;
use crate::config::Config;
use crate::error::Result;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Builds the shared reqwest client used by [`ReqwestTransport`](crate::transport::ReqwestTransport).
pub fn create_http_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .tcp_nodelay(true)
        .https_only(config.https_only)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()?;

    Ok(client)
}
