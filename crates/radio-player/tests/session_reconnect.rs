//! Reconnect behavior end-to-end: backoff timing, proxy escalation,
//! watchdog, and the external retry triggers — all on simulated time.

mod common;

use std::time::Duration;

use common::{settle, start_player, station};
use radio_player::engine::{AdaptiveEvent, ElementEvent};
use radio_types::state::PlaybackStatus;
use radio_types::station::StationDescriptor;

const DIRECT: &str = "https://a.example/live.mp3";
const PROXIED: &str = "/api/proxy?url=https%3A%2F%2Fa.example%2Flive.mp3";

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn happy_path_stays_direct() {
    let h = start_player();
    let mut s = StationDescriptor {
        stationuuid: "a".into(),
        name: "station a".into(),
        url: "http://old.example/live".into(),
        ..StationDescriptor::default()
    };
    s.url_resolved = DIRECT.to_string();

    h.handle.select_station(s).await;
    settle().await;
    assert_eq!(h.element.last_source().as_deref(), Some(DIRECT));

    h.element.emit(ElementEvent::Playing);
    settle().await;
    let state = h.handle.state().await;
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert!(!state.reconnecting);
    assert_eq!(h.element.count_calls("set_source:"), 1);
}

#[tokio::test(start_paused = true)]
async fn mixed_content_is_proxied_before_any_failure() {
    let h = start_player();
    h.handle
        .select_station(station("a", "http://insecure.example/live.mp3"))
        .await;
    settle().await;
    assert_eq!(
        h.element.last_source().as_deref(),
        Some("/api/proxy?url=http%3A%2F%2Finsecure.example%2Flive.mp3")
    );
}

#[tokio::test(start_paused = true)]
async fn backoff_follows_the_doubling_sequence_with_ceiling() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    let delays = [1000u64, 2000, 4000, 8000, 15000, 15000];
    for (i, delay) in delays.iter().enumerate() {
        let loads_before = h.element.count_calls("set_source:");
        h.element.emit(ElementEvent::Error("connection reset".into()));
        settle().await;
        assert!(h.handle.state().await.reconnecting, "attempt {i}");

        // One tick short of the deadline: nothing may happen yet.
        advance(delay - 1).await;
        assert_eq!(h.element.count_calls("set_source:"), loads_before, "attempt {i}");

        advance(1).await;
        assert_eq!(
            h.element.count_calls("set_source:"),
            loads_before + 1,
            "attempt {i}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn first_failure_escalates_to_proxy_for_loads_and_polls() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    h.element.emit(ElementEvent::Stalled);
    advance(1000).await;
    assert_eq!(h.element.last_source().as_deref(), Some(PROXIED));

    // A success in proxy mode does not revert the escalation.
    h.element.emit(ElementEvent::Playing);
    settle().await;
    h.element.emit(ElementEvent::Waiting);
    advance(2000).await;
    assert_eq!(h.element.last_source().as_deref(), Some(PROXIED));

    // Now-playing polls travel the proxied path too.
    let before = h.metadata.polled_urls().len();
    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    let polled = h.metadata.polled_urls();
    assert!(polled.len() > before);
    for url in &polled[before..] {
        assert_eq!(url, PROXIED);
    }
}

#[tokio::test(start_paused = true)]
async fn advisory_appears_after_repeated_proxy_failures_and_retries_continue() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;

    // Failure 1 engages the proxy; failures 2-4 are proxy-mode failures.
    let delays = [1000u64, 2000, 4000];
    h.element.emit(ElementEvent::Error("down".into()));
    advance(delays[0]).await;
    for delay in &delays[1..] {
        assert!(h.handle.state().await.advisory.is_none());
        h.element.emit(ElementEvent::Error("down".into()));
        advance(*delay).await;
    }

    h.element.emit(ElementEvent::Error("down".into()));
    settle().await;
    let state = h.handle.state().await;
    assert_eq!(
        state.advisory.as_deref(),
        Some("signal lost, retrying")
    );
    assert_eq!(state.status, PlaybackStatus::Error);
    assert!(state.reconnecting);

    // Advisory is a notice, not a terminal state: the retry still fires.
    let loads_before = h.element.count_calls("set_source:");
    advance(8000).await;
    assert_eq!(h.element.count_calls("set_source:"), loads_before + 1);

    // And recovery clears it.
    h.element.emit(ElementEvent::Playing);
    settle().await;
    let state = h.handle.state().await;
    assert!(state.advisory.is_none());
    assert_eq!(state.status, PlaybackStatus::Playing);
}

#[tokio::test(start_paused = true)]
async fn watchdog_reconnects_a_silently_stuck_stream() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    // Position freezes at 5.0 while the element still claims to play.
    h.element.set_position(5.0);
    advance(10_000).await; // sample 1: first position counts as progress
    advance(10_000).await; // sample 2: no advance, 10 s still
    assert_eq!(h.element.count_calls("set_source:"), 1);
    advance(10_000).await; // sample 3: 20 s stuck — reconnect scheduled
    advance(1000).await;
    assert_eq!(h.element.count_calls("set_source:"), 2);
    assert_eq!(h.element.last_source().as_deref(), Some(PROXIED));
}

#[tokio::test(start_paused = true)]
async fn watchdog_stays_quiet_while_position_advances() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    for i in 1..=6u64 {
        h.element.set_position(10.0 * i as f64);
        advance(10_000).await;
    }
    assert_eq!(h.element.count_calls("set_source:"), 1);
    assert!(!h.handle.state().await.reconnecting);
}

#[tokio::test(start_paused = true)]
async fn network_online_fires_the_pending_retry_immediately() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;

    h.element.emit(ElementEvent::Error("offline".into()));
    settle().await;
    assert_eq!(h.element.count_calls("set_source:"), 1);

    h.handle.notify_network_online().await;
    settle().await;
    assert_eq!(h.element.count_calls("set_source:"), 2);

    // The superseded backoff timer must not produce a third load.
    advance(20_000).await;
    assert_eq!(h.element.count_calls("set_source:"), 2);
}

#[tokio::test(start_paused = true)]
async fn adaptive_fatal_error_feeds_the_same_retry_path() {
    let h = start_player();
    h.handle
        .select_station(station("a", "https://a.example/live.m3u8"))
        .await;
    settle().await;
    assert_eq!(h.adaptive.live_instances(), 1);

    h.adaptive.emit(AdaptiveEvent::ManifestParsed).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    h.adaptive
        .emit(AdaptiveEvent::FatalError("manifest load error".into()))
        .await;
    advance(1000).await;

    // Reload went out, proxied, and still through a single fresh adaptive
    // instance (the proxied URL keeps the .m3u8 convention visible).
    assert_eq!(h.adaptive.live_instances(), 1);
    let calls = h.adaptive.calls();
    assert_eq!(calls.iter().filter(|c| *c == "create").count(), 2);
    let last_load = calls
        .iter()
        .rev()
        .find(|c| c.starts_with("load_source:"))
        .cloned()
        .unwrap();
    assert!(last_load.starts_with("load_source:/api/proxy?url="));
}

#[tokio::test(start_paused = true)]
async fn foregrounding_reinvokes_play_without_reloading() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    let plays_before = h.element.count_calls("play:");
    h.handle.notify_foregrounded().await;
    settle().await;

    assert_eq!(h.element.count_calls("play:"), plays_before + 1);
    assert_eq!(h.element.count_calls("set_source:"), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_url_retries_with_growing_backoff_instead_of_crashing() {
    let h = start_player();
    h.handle.select_station(station("broken", "")).await;
    settle().await;

    let state = h.handle.state().await;
    assert_eq!(state.status, PlaybackStatus::Loading);
    assert!(state.reconnecting);

    // Cycles through 1 s and 2 s retries without ever touching the engine.
    advance(1000).await;
    advance(2000).await;
    advance(4000).await;
    assert_eq!(h.element.count_calls("set_source:"), 0);
    assert!(h.handle.state().await.reconnecting);
}
