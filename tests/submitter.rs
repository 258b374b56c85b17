use std::sync::Arc;
use std::time::{Duration, Instant};

use crpt_api::config::{Config, TimeUnit};
use crpt_api::crpt::{Document, DocumentSubmitter, Product, SubmissionOutcome};
use crpt_api::http::RateLimiter;
use crpt_api::transport::ReqwestTransport;
use reqwest::StatusCode;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREATE_PATH: &str = "/api/v3/lk/documents/create";

fn test_config(api_url: String) -> Config {
    Config {
        log_level: "debug".into(),
        log_json: false,
        api_url,
        token: Some("test-token".into()),
        request_limit: 2,
        time_unit: TimeUnit::Seconds,
        acquire_timeout_ms: None,
        request_timeout_ms: 5_000,
        connect_timeout_ms: 1_000,
        https_only: false,
        document_path: None,
    }
}

fn submitter(config: &Config, limiter: RateLimiter) -> DocumentSubmitter {
    let transport = Arc::new(ReqwestTransport::from_config(config).unwrap());
    DocumentSubmitter::new(limiter, transport, config.api_url.clone())
}

fn document() -> Document {
    Document {
        doc_id: Some("doc-42".into()),
        doc_type: Some("LP_INTRODUCE_GOODS".into()),
        participant_inn: Some("7700000000".into()),
        products: Some(vec![Product {
            uit_code: Some("010461111111111121".into()),
            tnved_code: Some("6401100000".into()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

#[tokio::test]
async fn posts_json_document_with_bearer_token() {
    let server = MockServer::start().await;
    let doc = document();

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&doc))
        .respond_with(ResponseTemplate::new(200).set_body_string("  {\"value\":\"ok\"}  \n"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(format!("{}{}", server.uri(), CREATE_PATH));
    let limiter = RateLimiter::new(2, Duration::from_secs(1)).unwrap();
    let submitter = submitter(&config, limiter.clone());

    let outcome = submitter.submit(&doc, "test-token").await;

    assert_eq!(outcome, SubmissionOutcome::Accepted { body: "{\"value\":\"ok\"}".into() });
    assert_eq!(limiter.available(), 2);
}

#[tokio::test]
async fn error_status_is_rejected_and_permit_released() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(format!("{}{}", server.uri(), CREATE_PATH));
    let limiter = RateLimiter::new(1, Duration::from_secs(60)).unwrap();
    let submitter = submitter(&config, limiter.clone());

    let outcome = submitter.submit(&document(), "test-token").await;

    assert_eq!(outcome, SubmissionOutcome::Rejected { status: StatusCode::INTERNAL_SERVER_ERROR });
    assert_eq!(limiter.available(), 1);
}

#[tokio::test]
async fn connection_failure_is_swallowed_and_permit_released() {
    // Nothing listens on the discard port.
    let config = test_config(format!("http://127.0.0.1:9{}", CREATE_PATH));
    let limiter = RateLimiter::new(2, Duration::from_secs(60)).unwrap();
    let submitter = submitter(&config, limiter.clone());

    let doc = document();
    let (a, b) = tokio::join!(
        submitter.submit(&doc, "test-token"),
        submitter.submit(&doc, "test-token"),
    );

    assert!(matches!(a, SubmissionOutcome::Failed { .. }));
    assert!(matches!(b, SubmissionOutcome::Failed { .. }));
    assert_eq!(limiter.available(), 2);
    assert_eq!(submitter.stats().total(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_submission_waits_for_a_release() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(format!("{}{}", server.uri(), CREATE_PATH));
    // Long window: only a release can unblock the third caller.
    let limiter = RateLimiter::new(2, Duration::from_secs(60)).unwrap();
    let submitter = Arc::new(submitter(&config, limiter.clone()));

    let start = Instant::now();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let submitter = submitter.clone();
            tokio::spawn(async move {
                let doc = document();
                let outcome = submitter.submit(&doc, "test-token").await;
                outcome
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_accepted());
    }

    assert!(start.elapsed() >= Duration::from_millis(550), "elapsed={:?}", start.elapsed());
    assert_eq!(limiter.available(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_window_unblocks_at_next_reset() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(format!("{}{}", server.uri(), CREATE_PATH));
    let limiter = RateLimiter::new(2, Duration::from_secs(1)).unwrap();
    let created = Instant::now();
    let submitter = submitter(&config, limiter.clone());

    // Both permits stay held; only the window reset frees capacity.
    let _first = limiter.try_acquire().unwrap();
    let _second = limiter.try_acquire().unwrap();

    let outcome = submitter.submit(&document(), "test-token").await;

    assert!(outcome.is_accepted());
    assert!(created.elapsed() >= Duration::from_millis(950), "elapsed={:?}", created.elapsed());
}
