use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crpt_api::config::Config;
use crpt_api::crpt::{Document, DocumentSubmitter};
use crpt_api::error::{AppError, Result};
use crpt_api::http::RateLimiter;
use crpt_api::transport::ReqwestTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Load Config
    let config = Config::load()?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting document submission client...");
    info!(
        "Rate limit: {} requests per {:?}. Endpoint: {}",
        config.request_limit,
        config.window(),
        config.api_url
    );

    let token = config
        .token
        .clone()
        .ok_or_else(|| AppError::Init("CRPT_TOKEN must be set".into()))?;

    let document = match &config.document_path {
        Some(path) => {
            let raw = tokio::fs::read(path).await?;
            serde_json::from_slice::<Document>(&raw)?
        }
        None => {
            warn!("No document_path configured, submitting an empty document");
            Document::default()
        }
    };

    let limiter = RateLimiter::from_time_unit(config.time_unit, config.request_limit)?;
    let transport = Arc::new(ReqwestTransport::from_config(&config)?);
    let mut submitter = DocumentSubmitter::new(limiter.clone(), transport, config.api_url.clone());
    if let Some(timeout) = config.acquire_timeout() {
        submitter = submitter.with_acquire_timeout(timeout);
    }

    let outcome = submitter.submit(&document, &token).await;
    info!("Submission finished: {:?}", outcome);

    submitter.stats().log_stats();
    limiter.shutdown().await;
    info!("Shutting down...");

    Ok(())
}
