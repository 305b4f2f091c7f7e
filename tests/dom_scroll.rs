//! DOM strategy behavior over a mock surface: early-stop scrolling, surface
//! selection scoring, and the full scan pipeline in DOM fallback mode.

mod common;

use common::{MockHost, MockSurface};
use serde_json::{json, Value};
use sticker_scout::acquisition::dom::{select_surface, DomStrategy};
use sticker_scout::config::{ScoutConfig, ScrollConfig, Selectors, TargetConfig};
use sticker_scout::orchestrator::{Scanner, StrategyKind};
use sticker_scout::renderer::Surface;
use std::sync::atomic::Ordering;

fn fast_scroll(max_batches: u32, early_stop: u32) -> ScrollConfig {
    ScrollConfig {
        max_batches,
        early_stop_if_no_new: early_stop,
        wait_between_ms: 0,
        marker_wait_ms: 10,
        ..Default::default()
    }
}

fn batch(records: &[Value]) -> Value {
    json!(records)
}

fn six_records() -> Value {
    batch(
        &(0..6)
            .map(|i| {
                MockSurface::record(
                    &format!("Item {i}"),
                    "$10.00",
                    &["Crown (Holo)"],
                    &format!("sig-{i}"),
                )
            })
            .collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn identical_batches_stop_the_loop_early_not_at_max_batches() {
    // The virtualized list never surfaces anything new: 25 identical batches
    // are available, but the loop must stop after `early_stop_if_no_new`
    // consecutive no-growth advances.
    let surface = MockSurface::new("https://skinsmonkey.com/trade", 6, vec![six_records()]);
    let selectors = Selectors::default();
    let scroll = fast_scroll(25, 4);
    let strategy = DomStrategy::new(&selectors, &scroll);

    let mut batches_seen = 0;
    let total = strategy
        .run(&surface, |_| batches_seen += 1)
        .await
        .expect("dom run failed");

    // One growth advance (0 → 6), then four no-growth advances.
    assert_eq!(surface.scroll_calls.load(Ordering::SeqCst), 5);
    assert_eq!(total, 6); // first screen + 5 scroll batches
    assert_eq!(batches_seen, 6);
    assert!(surface.scroll_calls.load(Ordering::SeqCst) < 25);
}

#[tokio::test]
async fn early_stop_counter_resets_while_content_grows() {
    let two = batch(&[
        MockSurface::record("Item 0", "$10.00", &["Holo"], "sig-0"),
        MockSurface::record("Item 1", "$10.00", &["Holo"], "sig-1"),
    ]);
    let four = batch(
        &(0..4)
            .map(|i| MockSurface::record(&format!("Item {i}"), "$10.00", &["Holo"], &format!("sig-{i}")))
            .collect::<Vec<_>>(),
    );
    let surface = MockSurface::new(
        "https://skinsmonkey.com/trade",
        2,
        vec![two, four, six_records()],
    );
    let selectors = Selectors::default();
    let scroll = fast_scroll(25, 3);
    let strategy = DomStrategy::new(&selectors, &scroll);

    strategy.run(&surface, |_| {}).await.expect("dom run failed");

    // First screen eats the 2-record batch; advances see 4, 6, then three
    // no-growth batches before stopping.
    assert_eq!(surface.scroll_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn select_surface_prefers_hint_and_markers() {
    let target = TargetConfig::default();
    let selectors = Selectors::default();

    let surfaces: Vec<Box<dyn Surface>> = vec![
        Box::new(MockSurface::new("https://example.com/blog", 0, vec![])),
        Box::new(MockSurface::new(
            "https://skinsmonkey.com/trade",
            20,
            vec![six_records()],
        )),
        Box::new(MockSurface::new("https://skinsmonkey.com/faq", 0, vec![])),
    ];

    let winner = select_surface(surfaces, &target, &selectors)
        .await
        .expect("selection failed");
    assert_eq!(winner.url().await.unwrap(), "https://skinsmonkey.com/trade");
}

#[tokio::test]
async fn select_surface_fails_when_nothing_scores() {
    let target = TargetConfig::default();
    let selectors = Selectors::default();

    let surfaces: Vec<Box<dyn Surface>> = vec![
        Box::new(MockSurface::new("https://example.com", 0, vec![])),
        Box::new(MockSurface::new("about:blank", 0, vec![])),
    ];

    let err = select_surface(surfaces, &target, &selectors)
        .await
        .expect_err("selection should fail");
    assert!(err.to_string().contains("no usable market surface"));
}

#[tokio::test]
async fn scanner_falls_back_to_dom_and_dedups_across_batches() {
    let first = batch(&[
        MockSurface::record(
            "AK-47 | Redline",
            "$12.50",
            &["Crown (Holo)"],
            "sig-ak",
        ),
        MockSurface::record(
            "M4A4 | Poseidon",
            "$120.00", // above max_price, filtered out
            &["Stockholm 2021 (Holo)"],
            "sig-poseidon",
        ),
    ]);
    let second = batch(&[
        // Same card re-rendered by the virtualized list: deduped by signature.
        MockSurface::record(
            "AK-47 | Redline",
            "$12.50",
            &["Crown (Holo)"],
            "sig-ak",
        ),
        MockSurface::record(
            "Glock-18 | Fade",
            "$45.00",
            &["Stockholm 2021"],
            "sig-glock",
        ),
    ]);

    let mut config = ScoutConfig::default();
    config.output.stream_hits = false;
    config.scroll = fast_scroll(10, 2);
    // API stays enabled: discovery observes nothing and the scanner must
    // fall back to DOM extraction.
    let surface = MockSurface::new("https://skinsmonkey.com/trade", 2, vec![first, second]);
    let host = MockHost::new(vec![Box::new(surface) as Box<dyn Surface>]);

    let outcome = Scanner::new(config)
        .run_with_host(&host)
        .await
        .expect("scan failed");

    assert_eq!(outcome.strategy, StrategyKind::Dom);
    assert_eq!(outcome.stop, None);

    let names: Vec<&str> = outcome.hits.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"AK-47 | Redline"));
    assert!(names.contains(&"Glock-18 | Fade"));
    // DOM price text went through the canonical mapper.
    let ak = outcome
        .hits
        .iter()
        .find(|h| h.name == "AK-47 | Redline")
        .unwrap();
    assert_eq!(ak.price, Some(12.5));
    assert!(ak.profit.as_ref().and_then(|p| p.roi).is_some());
}

#[tokio::test]
async fn scanner_aborts_when_no_surface_exists() {
    let mut config = ScoutConfig::default();
    config.output.stream_hits = false;
    let host = MockHost::new(vec![]);

    let err = Scanner::new(config)
        .run_with_host(&host)
        .await
        .expect_err("scan should fail");
    assert!(err.to_string().contains("no usable market surface"));
}
