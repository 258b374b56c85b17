use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::time::Duration;
use crpt_api::crpt::{build_request, Document, Product};
use crpt_api::http::RateLimiter;

fn bench_uncontended_permit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let limiter = RateLimiter::new(1024, Duration::from_secs(3600)).unwrap();

    c.bench_function("try_acquire_release", |b| b.iter(|| {
        let permit = limiter.try_acquire();
        black_box(permit)
    }));
}

fn bench_build_request(c: &mut Criterion) {
    let product = Product {
        certificate_document: Some("CONFORMITY_CERTIFICATE".into()),
        owner_inn: Some("7700000000".into()),
        producer_inn: Some("7700000000".into()),
        production_date: Some("2024-01-01".into()),
        tnved_code: Some("6401100000".into()),
        uit_code: Some("010461111111111121".into()),
        ..Default::default()
    };
    let document = Document {
        doc_id: Some("doc-1".into()),
        doc_type: Some("LP_INTRODUCE_GOODS".into()),
        participant_inn: Some("7700000000".into()),
        products: Some(vec![product; 50]),
        ..Default::default()
    };

    c.bench_function("build_request_50_products", |b| b.iter(|| {
        build_request(
            black_box("https://ismp.crpt.ru/api/v3/lk/documents/create"),
            black_box(&document),
            black_box("token"),
        )
    }));
}

criterion_group!(benches, bench_uncontended_permit, bench_build_request);
criterion_main!(benches);
