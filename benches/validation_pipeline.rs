// Validation Pipeline Benchmarks
//
// Key metrics measured:
// - Single validation latency for low and critical severities
// - Validation with an injection payload (early rejection path)
// - Audit chain append and full-chain verification at several sizes
//
// Usage:
//   cargo bench --bench validation_pipeline

use actionguard::audit::{AuditChain, AuditRecord, ExecutionStatus};
use actionguard::config::SecurityConfig;
use actionguard::context::{ActionSecurityContext, Severity};
use actionguard::crypto::SigningKey;
use actionguard::validation::{SecurityValidationResult, ValidationOrchestrator};
use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn key() -> SigningKey {
    SigningKey::from_bytes(b"bench-signing-key".to_vec()).unwrap()
}

fn orchestrator() -> ValidationOrchestrator {
    let config = SecurityConfig {
        authorized_agents: vec!["agent-bench".to_string()],
        // keep the rate limiter out of the measurement
        max_action_rate_per_minute: u32::MAX,
        ..Default::default()
    };
    ValidationOrchestrator::new(&config, key(), Arc::new(AuditChain::new(key())))
}

fn context(severity: Severity) -> ActionSecurityContext {
    ActionSecurityContext::new("agent-bench", "service_restart", severity, "production", Utc::now())
        .with_field("service_name", "api")
        .with_field("reason", "scheduled maintenance window")
}

fn record() -> AuditRecord {
    let ctx = context(Severity::Medium);
    let validation = SecurityValidationResult::system_error(ctx.action_id(), "bench");
    AuditRecord::new(ctx, validation, ExecutionStatus::Completed, 12, json!({"ok": true}), Utc::now())
}

fn bench_validate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let orchestrator = orchestrator();

    let mut group = c.benchmark_group("validate");
    for severity in [Severity::Low, Severity::Critical] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", severity)),
            &severity,
            |b, &severity| {
                b.iter(|| {
                    rt.block_on(async {
                        let mut ctx = context(severity);
                        black_box(orchestrator.validate(&mut ctx).await)
                    })
                });
            },
        );
    }
    group.bench_function("injection_payload", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut ctx = context(Severity::Low).with_field("cmd", "eval(atob(payload))");
                black_box(orchestrator.validate(&mut ctx).await)
            })
        });
    });
    group.finish();
}

fn bench_audit_chain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("audit_append", |b| {
        let chain = AuditChain::new(key());
        b.iter(|| rt.block_on(async { black_box(chain.append(record()).await.unwrap()) }));
    });

    let mut group = c.benchmark_group("audit_verify");
    for size in [10usize, 100, 1000] {
        let chain = AuditChain::new(key());
        rt.block_on(async {
            for _ in 0..size {
                chain.append(record()).await.unwrap();
            }
        });
        let records = rt.block_on(chain.records());

        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(AuditChain::verify_records(records, &key())));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate, bench_audit_chain);
criterion_main!(benches);
