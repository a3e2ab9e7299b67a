//! Sleep timer, volume, and autoplay-gesture handling.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{settle, start_player, station};
use radio_player::engine::ElementEvent;
use radio_types::state::PlaybackStatus;

const DIRECT: &str = "https://a.example/live.mp3";

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn sleep_timer_pauses_without_tearing_down() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    h.handle.start_sleep_timer(1).await;
    settle().await;
    assert_eq!(h.handle.state().await.sleep_seconds_remaining, Some(60));

    advance(30_000).await;
    assert_eq!(h.handle.state().await.sleep_seconds_remaining, Some(30));

    advance(30_000).await;
    let state = h.handle.state().await;
    assert_eq!(state.status, PlaybackStatus::Paused);
    assert_eq!(state.sleep_seconds_remaining, None);
    assert_eq!(h.element.count_calls("pause"), 1);

    // Session intact: the station is still selected, the source untouched,
    // and a toggle resumes playback without a reload.
    assert!(state.station.is_some());
    assert_eq!(h.element.count_calls("set_source:"), 1);

    h.handle.toggle_playback().await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;
    assert_eq!(h.handle.state().await.status, PlaybackStatus::Playing);
    assert_eq!(h.element.count_calls("set_source:"), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_sleep_timer_never_fires() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    h.handle.start_sleep_timer(5).await;
    settle().await;
    h.handle.cancel_sleep_timer().await;
    settle().await;
    assert_eq!(h.handle.state().await.sleep_seconds_remaining, None);

    advance(600_000).await;
    assert_eq!(h.element.count_calls("pause"), 0);
    assert_eq!(h.handle.state().await.status, PlaybackStatus::Playing);
}

#[tokio::test(start_paused = true)]
async fn restarting_the_sleep_timer_replaces_the_old_deadline() {
    let h = start_player();
    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    h.handle.start_sleep_timer(1).await;
    settle().await;
    advance(30_000).await;
    h.handle.start_sleep_timer(2).await;
    settle().await;

    // The first deadline passes without pausing.
    advance(40_000).await;
    assert_eq!(h.element.count_calls("pause"), 0);

    advance(80_000).await;
    assert_eq!(h.handle.state().await.status, PlaybackStatus::Paused);
}

#[tokio::test(start_paused = true)]
async fn volume_applies_independently_of_the_session() {
    let h = start_player();

    // No station selected yet — volume still lands.
    h.handle.set_volume(0.8).await;
    settle().await;
    assert_eq!(h.handle.state().await.volume, 0.8);
    assert_eq!(h.element.count_calls("set_volume:0.80"), 1);

    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;
    h.handle.set_volume(1.5).await;
    settle().await;
    // Clamped on the way through.
    assert_eq!(h.handle.state().await.volume, 1.0);
    assert_eq!(h.element.count_calls("set_volume:1.00"), 1);
}

#[tokio::test(start_paused = true)]
async fn autoplay_rejection_surfaces_a_gesture_not_an_error() {
    let h = start_player();
    h.element.allow_play.store(false, Ordering::SeqCst);

    h.handle.select_station(station("a", DIRECT)).await;
    settle().await;

    let state = h.handle.state().await;
    assert!(state.needs_user_gesture);
    // Not a failure: no retry gets scheduled for a policy rejection.
    assert!(!state.reconnecting);
    advance(30_000).await;
    assert_eq!(h.element.count_calls("set_source:"), 1);

    // The explicit tap goes through play(), not through a reload.
    h.element.allow_play.store(true, Ordering::SeqCst);
    h.handle.toggle_playback().await;
    settle().await;
    h.element.emit(ElementEvent::Playing);
    settle().await;

    let state = h.handle.state().await;
    assert!(!state.needs_user_gesture);
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert_eq!(h.element.count_calls("set_source:"), 1);
}
