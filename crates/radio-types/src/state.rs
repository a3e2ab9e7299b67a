use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::station::StationDescriptor;

/// User-facing playback status of the current session.
///
/// `Reconnecting` is deliberately not a status: the retry loop keeps the
/// session in `Loading`/`Playing` intent while `PlayerState::reconnecting`
/// flags the indicator, so a blip never reads as "stopped".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

/// Observable snapshot exposed to the UI.  `rev` is a monotonically
/// increasing counter bumped on every change so clients can detect missed
/// updates and resync.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerState {
    #[serde(default)]
    pub rev: u64,
    pub station: Option<StationDescriptor>,
    pub status: PlaybackStatus,
    /// True while the reconnect controller is between attempts.
    #[serde(default)]
    pub reconnecting: bool,
    pub now_playing: Option<String>,
    /// Autoplay was rejected; playback needs an explicit user gesture.
    #[serde(default)]
    pub needs_user_gesture: bool,
    /// Advisory notice after repeated proxy-mode failures.  Retries continue.
    pub advisory: Option<String>,
    pub volume: f32,
    pub sleep_seconds_remaining: Option<u64>,
}

/// Single writer-side owner of the observable state.  Every mutator bumps
/// `rev`; readers clone a snapshot.
pub struct StateManager {
    state: Arc<RwLock<PlayerState>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl StateManager {
    pub fn new(volume: f32) -> Self {
        let state = PlayerState {
            rev: 1,
            volume: volume.clamp(0.0, 1.0),
            ..PlayerState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn arc(&self) -> Arc<RwLock<PlayerState>> {
        Arc::clone(&self.state)
    }

    pub async fn get_state(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    /// New station selected: reset everything scoped to the old session.
    pub async fn set_station(&self, station: Option<StationDescriptor>) {
        let mut state = self.state.write().await;
        state.station = station;
        state.status = PlaybackStatus::Loading;
        state.reconnecting = false;
        state.now_playing = None;
        state.needs_user_gesture = false;
        state.advisory = None;
        state.rev += 1;
    }

    pub async fn set_status(&self, status: PlaybackStatus) {
        let mut state = self.state.write().await;
        state.status = status;
        if status == PlaybackStatus::Playing {
            state.reconnecting = false;
            state.advisory = None;
        }
        state.rev += 1;
    }

    pub async fn set_reconnecting(&self, reconnecting: bool) {
        let mut state = self.state.write().await;
        state.reconnecting = reconnecting;
        state.rev += 1;
    }

    pub async fn set_now_playing(&self, title: Option<String>) {
        let mut state = self.state.write().await;
        state.now_playing = title;
        state.rev += 1;
    }

    pub async fn set_needs_user_gesture(&self, needs: bool) {
        let mut state = self.state.write().await;
        state.needs_user_gesture = needs;
        state.rev += 1;
    }

    pub async fn set_advisory(&self, advisory: Option<String>) {
        let mut state = self.state.write().await;
        state.advisory = advisory;
        state.rev += 1;
    }

    pub async fn set_volume(&self, volume: f32) {
        let mut state = self.state.write().await;
        state.volume = volume.clamp(0.0, 1.0);
        state.rev += 1;
    }

    pub async fn set_sleep_remaining(&self, secs: Option<u64>) {
        let mut state = self.state.write().await;
        state.sleep_seconds_remaining = secs;
        state.rev += 1;
    }

    pub async fn clear_session(&self) {
        let mut state = self.state.write().await;
        state.station = None;
        state.status = PlaybackStatus::Idle;
        state.reconnecting = false;
        state.now_playing = None;
        state.needs_user_gesture = false;
        state.advisory = None;
        state.rev += 1;
    }
}
