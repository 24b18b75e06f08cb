//! Chain tests — end-to-end with mocks.
//!
//! Each test follows MOCK → FUNCTION → OUTPUT: script the fake providers
//! and collaborators, call the actual component, assert on what came out.
//! No test reaches into a component's internals.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use lumos_common::{LumosError, Verdict, VerificationStatus};

use crate::chain::{ChainOutcome, EvidenceProviderChain};
use crate::extractor::ClaimExtractor;
use crate::grouper::{AlertGrouper, UserRateLimiter, RATE_CAP, RATE_WINDOW_SECS};
use crate::pipeline::PipelineOrchestrator;
use crate::providers::EvidenceProvider;
use crate::store::InMemoryStore;
use crate::testing::*;
use crate::traits::ClaimStore;
use crate::verifier::ClaimVerifier;

fn chain(providers: Vec<Arc<dyn EvidenceProvider>>) -> EvidenceProviderChain {
    EvidenceProviderChain::new(providers, Duration::from_secs(5), 3, 0.3)
}

fn orchestrator(
    provider: Arc<MockProvider>,
    store: Arc<dyn ClaimStore>,
    sink: Arc<MockSink>,
    deadline: Option<Duration>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        ClaimExtractor::new(),
        ClaimVerifier::new(chain(vec![provider])),
        store,
        sink,
        Arc::new(UserRateLimiter::new()),
        4,
        deadline,
    )
}

// ---------------------------------------------------------------------------
// Chain: fallback, retry classification, exhaustion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timing_out_primary_falls_back_to_secondary() {
    let primary = Arc::new(MockProvider::always("slow-index", MockCall::Hang));
    let secondary = Arc::new(MockProvider::always(
        "web",
        MockCall::Sources(vec![source(
            "Qualifying hit",
            "https://example.org/hit",
            "relevant snippet",
            0.8,
        )]),
    ));

    let chain = chain(vec![primary.clone(), secondary.clone()]);
    let outcome = chain.run("some factual query").await;

    match outcome {
        ChainOutcome::Evidence { provider, sources } => {
            assert_eq!(provider, "web");
            assert_eq!(sources.len(), 1);
        }
        ChainOutcome::NoEvidence => panic!("expected evidence from the secondary provider"),
    }
    // Primary burned its full attempt budget before the chain advanced.
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_advances_without_retry() {
    let primary = Arc::new(MockProvider::always(
        "broken",
        MockCall::Fatal("bad request".to_string()),
    ));
    let secondary = Arc::new(MockProvider::always(
        "web",
        MockCall::Sources(vec![source("Hit", "https://example.org", "snippet", 0.9)]),
    ));

    let outcome = chain(vec![primary.clone(), secondary]).run("query").await;

    assert!(matches!(outcome, ChainOutcome::Evidence { .. }));
    assert_eq!(primary.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retryable_failure_is_retried_then_advanced() {
    let primary = Arc::new(MockProvider::always(
        "flaky",
        MockCall::Retryable("rate limited".to_string()),
    ));
    let secondary = Arc::new(MockProvider::new("empty-web"));

    let outcome = chain(vec![primary.clone(), secondary.clone()]).run("query").await;

    assert!(matches!(outcome, ChainOutcome::NoEvidence));
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn low_relevance_sources_do_not_qualify() {
    let provider = Arc::new(MockProvider::always(
        "weak",
        MockCall::Sources(vec![source("Weak hit", "https://example.org", "meh", 0.1)]),
    ));

    let outcome = chain(vec![provider]).run("query").await;
    assert!(matches!(outcome, ChainOutcome::NoEvidence));
}

// ---------------------------------------------------------------------------
// Verifier: fallback queries, idempotence, verdicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verifier_tries_fallback_queries_until_evidence() {
    let finding = "40% of adults sleep less than 6 hours";
    let provider = Arc::new(
        MockProvider::new("index")
            .then(MockCall::Sources(vec![]))
            .then(MockCall::Sources(vec![corroborating_source(finding)])),
    );
    let verifier = ClaimVerifier::new(chain(vec![provider.clone()]));

    let mut claim = resolved_claim_at("vid1", 0, 100.0);
    claim.status = VerificationStatus::Pending;
    claim.result = None;
    claim.finding = finding.to_string();
    claim.search_query = "kahneman harvard sleep".to_string();
    claim.fallback_queries = vec!["adults sleep hours".to_string()];

    verifier.verify(&mut claim).await;

    assert_eq!(claim.status, VerificationStatus::Verified);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn verifying_terminal_claim_never_touches_providers() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![source("X", "https://example.org", "y", 0.9)]),
    ));
    let verifier = ClaimVerifier::new(chain(vec![provider.clone()]));

    let mut claim = resolved_claim_at("vid1", 0, 100.0);
    let original_reasoning = claim.result.as_ref().unwrap().reasoning.clone();

    verifier.verify(&mut claim).await;

    assert_eq!(provider.calls(), 0);
    assert_eq!(claim.status, VerificationStatus::Verified);
    assert_eq!(claim.result.unwrap().reasoning, original_reasoning);
}

#[tokio::test]
async fn exhausted_queries_resolve_inconclusive_not_error() {
    let provider = Arc::new(MockProvider::new("empty"));
    let verifier = ClaimVerifier::new(chain(vec![provider]));

    let mut claim = resolved_claim_at("vid1", 0, 100.0);
    claim.status = VerificationStatus::Pending;
    claim.result = None;
    claim.fallback_queries = vec!["broader".to_string()];

    verifier.verify(&mut claim).await;

    assert_eq!(claim.status, VerificationStatus::Inconclusive);
    assert!(claim.result.unwrap().reasoning.contains("No credible source"));
}

// ---------------------------------------------------------------------------
// Rate cap: burst throttled, conserved, ordered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn burst_of_twenty_claims_is_throttled_not_dropped() {
    let limiter = Arc::new(UserRateLimiter::new());
    let user = Uuid::new_v4();
    let mut grouper = AlertGrouper::new(user, "vid1", limiter);

    let mut alerts = Vec::new();
    for i in 0..20u32 {
        // 20 claims arriving within 10 seconds of video time.
        let claim = resolved_claim_at("vid1", i, i as f64 * 0.5);
        if let Some(alert) = grouper.ingest(claim).await {
            alerts.push(alert);
        }
    }
    if let Some(alert) = grouper.finish().await {
        alerts.push(alert);
    }

    // Total count conserved: every claim lands in exactly one alert.
    let total_claims: usize = alerts.iter().map(|a| a.claims.len()).sum();
    assert_eq!(total_claims, 20);
    assert_eq!(alerts.len(), 7); // groups of 3, final group of 2

    // Emission times ordered and never more than RATE_CAP per rolling window.
    let times: Vec<_> = alerts.iter().map(|a| a.created_at).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    for t in &times {
        let in_window = times
            .iter()
            .filter(|u| **u > *t - chrono::Duration::seconds(RATE_WINDOW_SECS) && **u <= *t)
            .count();
        assert!(in_window <= RATE_CAP);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator: end-to-end scenario, cache behavior, run-in-flight dedup
// ---------------------------------------------------------------------------

const CO_TOPIC_A: &str = "a study from Harvard found that 40% of adults sleep less than 6 hours";
const CO_TOPIC_B: &str = "researchers found the same Harvard data shows 25% of teens sleep under 7 hours";
const UNRELATED: &str = "a survey found 3 million people commute over two hours daily";

#[tokio::test(start_paused = true)]
async fn overcap_alert_delivery_waits_for_capacity() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let sink = Arc::new(MockSink::new());
    let pipeline = orchestrator(provider, Arc::new(InMemoryStore::new()), sink.clone(), None);

    // Six claims spaced past the grouping window produce six alerts; the
    // sixth exceeds the per-user cap and must wait out the rate window.
    let segments: Vec<_> = (0..6).map(|i| segment(CO_TOPIC_A, i as f64 * 130.0)).collect();

    let started = tokio::time::Instant::now();
    let alerts = pipeline
        .run("vid1", Some(3600.0), &segments, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(alerts.len(), 6);
    assert_eq!(sink.emitted().len(), 6);
    // Delivery of the over-cap alert was held, not just stamped forward.
    assert!(started.elapsed() >= Duration::from_secs(59));
}

#[tokio::test]
async fn co_occurring_claims_group_into_one_alert() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![source(
            "Sleep statistics",
            "https://example.org/sleep",
            "adults teens sleep hours study survey million people commute",
            0.9,
        )]),
    ));
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(InMemoryStore::new());
    let pipeline = orchestrator(provider, store, sink.clone(), None);

    let segments = vec![
        segment(CO_TOPIC_A, 500.0),
        segment(CO_TOPIC_B, 590.0),
        segment(UNRELATED, 900.0),
    ];
    let alerts = pipeline
        .run("vid1", Some(3600.0), &segments, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].claims.len(), 2);
    assert_eq!(alerts[0].claims[0].timestamp_seconds, 500.0);
    assert_eq!(alerts[0].claims[1].timestamp_seconds, 590.0);
    assert_eq!(alerts[1].claims.len(), 1);
    assert_eq!(alerts[1].claims[0].timestamp_seconds, 900.0);

    // Claim ids are unique and monotonically ordered by transcript position.
    let ids: Vec<String> = alerts
        .iter()
        .flat_map(|a| a.claims.iter().map(|c| c.claim_id.to_string()))
        .collect();
    assert_eq!(ids, vec!["vid1:claim:0", "vid1:claim:1", "vid1:claim:2"]);

    // Alerts reached the sink in first-claim timestamp order.
    let emitted = sink.emitted();
    assert_eq!(emitted.len(), 2);
    assert!(emitted[0].first_claim_seconds() < emitted[1].first_claim_seconds());
}

#[tokio::test]
async fn second_run_replays_cache_without_reverifying() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(InMemoryStore::new());
    let pipeline = orchestrator(provider.clone(), store, sink, None);

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let user = Uuid::new_v4();

    let first = pipeline.run("vid1", Some(3600.0), &segments, user).await.unwrap();
    let calls_after_first = provider.calls();
    assert!(calls_after_first > 0);

    let second = pipeline.run("vid1", Some(3600.0), &segments, user).await.unwrap();
    assert_eq!(provider.calls(), calls_after_first);
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].id, second[0].id);
}

#[tokio::test]
async fn duration_change_forces_recompute() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let store = Arc::new(InMemoryStore::new());
    let pipeline = orchestrator(provider.clone(), store, Arc::new(MockSink::new()), None);

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let user = Uuid::new_v4();

    pipeline.run("vid1", Some(3600.0), &segments, user).await.unwrap();
    let calls_after_first = provider.calls();

    pipeline.run("vid1", Some(3700.0), &segments, user).await.unwrap();
    assert!(provider.calls() > calls_after_first, "duration change must re-run the pipeline");
}

#[tokio::test]
async fn missing_duration_never_hits_cache() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let store = Arc::new(InMemoryStore::new());
    let pipeline = orchestrator(provider.clone(), store, Arc::new(MockSink::new()), None);

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let user = Uuid::new_v4();

    pipeline.run("vid1", None, &segments, user).await.unwrap();
    let calls_after_first = provider.calls();
    pipeline.run("vid1", None, &segments, user).await.unwrap();
    assert!(provider.calls() > calls_after_first);
}

#[tokio::test]
async fn cache_store_failure_still_returns_alerts() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let store = Arc::new(FailingCacheStore::new());
    store.fail_cache_puts(true);
    let pipeline = orchestrator(provider.clone(), store.clone(), Arc::new(MockSink::new()), None);

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let user = Uuid::new_v4();

    let alerts = pipeline.run("vid1", Some(3600.0), &segments, user).await.unwrap();
    assert_eq!(alerts.len(), 1);

    // Nothing cached, so the next run recomputes.
    let calls_after_first = provider.calls();
    pipeline.run("vid1", Some(3600.0), &segments, user).await.unwrap();
    assert!(provider.calls() > calls_after_first);
}

#[tokio::test]
async fn malformed_transcript_is_rejected_before_extraction() {
    let provider = Arc::new(MockProvider::new("index"));
    let pipeline = orchestrator(
        provider.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(MockSink::new()),
        None,
    );

    let err = pipeline
        .run("vid1", Some(3600.0), &[], Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LumosError::Validation(_)));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_marks_pending_claims_inconclusive() {
    // Providers hang longer than the outer deadline allows.
    let provider = Arc::new(MockProvider::always("stuck", MockCall::Hang));
    let verifier = ClaimVerifier::new(EvidenceProviderChain::new(
        vec![provider],
        Duration::from_secs(600),
        1,
        0.3,
    ));
    let pipeline = PipelineOrchestrator::new(
        ClaimExtractor::new(),
        verifier,
        Arc::new(InMemoryStore::new()),
        Arc::new(MockSink::new()),
        Arc::new(UserRateLimiter::new()),
        4,
        Some(Duration::from_secs(2)),
    );

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let alerts = pipeline
        .run("vid1", Some(3600.0), &segments, Uuid::new_v4())
        .await
        .unwrap();

    // The run terminates complete: the claim resolved inconclusive and is
    // still alertable.
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].claims[0].verdict, Verdict::Inconclusive);
    assert!(alerts[0].claims[0].reasoning.contains("timed out"));
}

#[tokio::test]
async fn concurrent_runs_for_same_video_share_one_computation() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let pipeline = Arc::new(orchestrator(
        provider.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(MockSink::new()),
        None,
    ));

    let segments = vec![segment(CO_TOPIC_A, 100.0)];
    let user = Uuid::new_v4();

    let a = tokio::spawn({
        let pipeline = pipeline.clone();
        let segments = segments.clone();
        async move { pipeline.run("vid1", Some(3600.0), &segments, user).await }
    });
    let b = tokio::spawn({
        let pipeline = pipeline.clone();
        let segments = segments.clone();
        async move { pipeline.run("vid1", Some(3600.0), &segments, user).await }
    });

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].id, b[0].id);
    // One extracted claim, verified by its primary query exactly once.
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn cached_claims_round_trip_identically() {
    let provider = Arc::new(MockProvider::always(
        "index",
        MockCall::Sources(vec![corroborating_source("adults sleep hours study")]),
    ));
    let store = Arc::new(InMemoryStore::new());
    let pipeline = orchestrator(provider, store.clone(), Arc::new(MockSink::new()), None);

    let segments = vec![segment(CO_TOPIC_A, 100.0), segment(UNRELATED, 400.0)];
    let alerts = pipeline
        .run("vid1", Some(3600.0), &segments, Uuid::new_v4())
        .await
        .unwrap();

    let entry = store.get_cache_entry("vid1").await.unwrap().unwrap();
    assert!(entry.is_valid(Utc::now(), Some(3600.0)));
    assert_eq!(entry.alerts.len(), alerts.len());
    assert_eq!(entry.claims.len(), 2);
    assert!(entry.claims.iter().all(|c| c.status.is_terminal()));
}
