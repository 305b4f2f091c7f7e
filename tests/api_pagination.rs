//! End-to-end pagination behavior against a mocked endpoint: termination on
//! short pages, one-retry backoff on rate limits, immediate halt on
//! halt-listed statuses, and the mapper→filter→sink pipeline.

mod common;

use common::MockSurface;
use serde_json::{json, Value};
use sticker_scout::acquisition::api::{ApiStrategy, PageStats, StopReason};
use sticker_scout::acquisition::discovery::DiscoveredEndpoint;
use sticker_scout::config::{ApiConfig, PolitenessConfig, ScoutConfig, SortBy};
use sticker_scout::filter::{estimate_profit, ItemFilter};
use sticker_scout::mapper::RecordMapper;
use sticker_scout::model::ScannedHit;
use sticker_scout::orchestrator::{Scanner, StrategyKind};
use sticker_scout::pacing::PacingGovernor;
use sticker_scout::renderer::Surface;
use sticker_scout::sink::{DedupMode, DedupSink};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_politeness() -> PolitenessConfig {
    PolitenessConfig {
        min_delay_ms: 0,
        max_delay_ms: 0,
        jitter_ms: 0,
        requests_per_minute: 0,
        backoff_ms: 10,
        ..Default::default()
    }
}

fn api_cfg(page_size: u32, max_pages: u32) -> ApiConfig {
    ApiConfig {
        page_size,
        max_pages,
        server_price_filter: false,
        ..Default::default()
    }
}

fn endpoint(server: &MockServer) -> DiscoveredEndpoint {
    DiscoveredEndpoint {
        url: format!("{}/api/inventory", server.uri()),
        sample: None,
    }
}

fn page_of(names: &[&str]) -> Value {
    json!({
        "items": names
            .iter()
            .map(|n| json!({"name": n, "price": 500, "stickers": ["Crown (Holo)"]}))
            .collect::<Vec<_>>()
    })
}

async fn run_strategy(
    cfg: &ApiConfig,
    politeness: &PolitenessConfig,
    server: &MockServer,
) -> (Vec<(Value, Option<String>)>, PageStats) {
    let strategy = ApiStrategy::new(cfg, politeness);
    let mut governor = PacingGovernor::new(politeness);
    let mut records = Vec::new();
    let stats = strategy
        .run(
            &endpoint(server),
            None,
            &mut governor,
            (None, None),
            |value, key| records.push((value.clone(), key.map(String::from))),
        )
        .await
        .expect("strategy run failed");
    (records, stats)
}

#[tokio::test]
async fn short_page_terminates_pagination_before_max_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_of(&["a", "b", "c"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_of(&["d", "e"])))
        .mount(&server)
        .await;

    let (records, stats) = run_strategy(&api_cfg(3, 10), &fast_politeness(), &server).await;

    assert_eq!(stats.stop, StopReason::ShortPage);
    assert_eq!(stats.pages, 2);
    assert_eq!(records.len(), 5);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_page_terminates_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let (records, stats) = run_strategy(&api_cfg(3, 10), &fast_politeness(), &server).await;

    assert_eq!(stats.stop, StopReason::EmptyPage);
    assert!(records.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limit_gets_exactly_one_backoff_retry() {
    let server = MockServer::start().await;
    // First request is throttled; the retry succeeds with a short page.
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_of(&["a"])))
        .mount(&server)
        .await;

    let (records, stats) = run_strategy(&api_cfg(3, 10), &fast_politeness(), &server).await;

    assert_eq!(stats.stop, StopReason::ShortPage);
    assert_eq!(records.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn repeated_rate_limit_counts_one_error_per_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let politeness = PolitenessConfig {
        max_consecutive_errors: 1,
        ..fast_politeness()
    };
    let (records, stats) = run_strategy(&api_cfg(3, 10), &politeness, &server).await;

    // Page 1: 429 + failed retry is ONE consecutive error (within budget).
    // Page 2: 429 + failed retry is the second, which exhausts the budget.
    assert_eq!(stats.stop, StopReason::ErrorBudget { count: 2 });
    assert!(records.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn halt_listed_status_stops_immediately_with_zero_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let politeness = PolitenessConfig {
        // No session fallback surface is attached, so the 403 surfaces as-is.
        ..fast_politeness()
    };
    let cfg = ApiConfig {
        session_fallback: false,
        ..api_cfg(3, 10)
    };
    let (records, stats) = run_strategy(&cfg, &politeness, &server).await;

    assert_eq!(stats.stop, StopReason::Halted { status: 403 });
    assert!(records.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn dry_run_builds_urls_without_requests() {
    let server = MockServer::start().await;

    let politeness = PolitenessConfig {
        dry_run: true,
        ..fast_politeness()
    };
    let (records, stats) = run_strategy(&api_cfg(3, 4), &politeness, &server).await;

    assert_eq!(stats.stop, StopReason::DryRun);
    assert_eq!(stats.pages, 0);
    assert!(records.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn nested_container_entries_get_page_qualified_keys() {
    let server = MockServer::start().await;
    let body = json!({
        "items": [
            {
                "name": "bundle",
                "items": [
                    {"name": "StatTrak AK", "price": 750, "stickers": ["Holo A"]},
                    {"name": "StatTrak AK", "price": 750, "stickers": ["Holo A"]}
                ]
            }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let (records, stats) = run_strategy(&api_cfg(3, 10), &fast_politeness(), &server).await;

    assert_eq!(stats.stop, StopReason::ShortPage);
    let keys: Vec<Option<String>> = records.iter().map(|(_, k)| k.clone()).collect();
    // Identical sub-entries stay distinct through their container/sub-index keys.
    assert_eq!(keys, vec![Some("0:0:0".into()), Some("0:0:1".into())]);
}

#[tokio::test]
async fn pipeline_maps_filters_and_dedups_a_page() {
    let server = MockServer::start().await;
    let body = json!({
        "items": [
            {"market_hash_name": "AK-47 | Redline", "price": 500, "stickers": [{"name": "Crown (Holo)"}]},
            {"market_hash_name": "AK-47 | Redline", "price": 500, "stickers": [{"name": "Crown (Holo)"}]},
            {"name": "M4A4 | Howl", "price": 900000, "stickers": ["Holo B"]},
            {"price": 500, "stickers": ["Holo C"]},
            {"name": "Glock | Fade", "price": 500, "stickers": []}
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let config = ScoutConfig::default();
    let mapper = RecordMapper::new(config.api.price_factor);
    let filter = ItemFilter::new(&config.filters);
    let mut sink = DedupSink::new(DedupMode::Strict);

    let politeness = fast_politeness();
    let cfg = api_cfg(10, 10);
    let strategy = ApiStrategy::new(&cfg, &politeness);
    let mut governor = PacingGovernor::new(&politeness);
    strategy
        .run(
            &endpoint(&server),
            None,
            &mut governor,
            (config.filters.min_price, config.filters.max_price),
            |raw, key| {
                let Some(item) = mapper.map(raw) else { return };
                if !filter.matches(&item) {
                    return;
                }
                let hit = ScannedHit {
                    name: item.name.clone(),
                    price: item.price,
                    profit: estimate_profit(item.price, &config.profit),
                    stickers: item.stickers,
                };
                match key {
                    Some(key) => sink.offer_keyed(key, hit),
                    None => sink.offer(hit),
                };
            },
        )
        .await
        .expect("strategy run failed");

    let hits = sink.finish(SortBy::Roi);
    // Duplicate deduped, overpriced filtered, nameless dropped, stickerless
    // rejected by min_sticker_count.
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "AK-47 | Redline");
    assert_eq!(hits[0].price, Some(5.0));
    assert!(hits[0].profit.is_some());
}

#[tokio::test]
async fn scanner_runs_api_strategy_via_discovered_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_of(&["AK-47 | Redline", "M4A1-S | Printstream"])))
        .mount(&server)
        .await;

    let mut config = ScoutConfig::default();
    config.output.stream_hits = false;
    config.politeness = fast_politeness();
    config.api.page_size = 3;
    config.api.max_pages = 5;
    config.api.server_price_filter = false;

    // The surface observed an inventory request; the scanner should page
    // through that endpoint instead of scrolling the DOM.
    let surface = MockSurface::new("https://skinsmonkey.com/trade", 0, vec![]).with_observed(
        &format!("{}/api/inventory?appId=730", server.uri()),
        json!({"items": []}),
    );
    let host = common::MockHost::new(vec![Box::new(surface) as Box<dyn Surface>]);

    let outcome = Scanner::new(config)
        .run_with_host(&host)
        .await
        .expect("scan failed");

    assert_eq!(outcome.strategy, StrategyKind::Api);
    assert_eq!(outcome.stop, Some(StopReason::ShortPage));
    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(outcome.records_seen, 2);
}
