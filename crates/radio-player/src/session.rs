//! Session coordinator — single-owner event loop for all playback state.
//!
//! All inputs (UI commands, engine events, timer fires, poll results,
//! environment changes) funnel into one `PlayerEvent` channel consumed by
//! one task.  `PlayerCore` owns the engine adapter, the reconnect machine,
//! and every timer handle exclusively; no other task touches them.
//!
//! Correctness against out-of-order async completions rests on the load
//! token: a monotonically increasing id minted for every load attempt.
//! Every spawned task carries the token it was started under, and every
//! event is compared against the current token before it may mutate
//! anything — a mismatch means the attempt was superseded and the event is
//! discarded silently.

use std::sync::Arc;

use radio_types::config::{PlayerConfig, ResolverConfig};
use radio_types::state::{PlaybackStatus, PlayerState, StateManager};
use radio_types::station::StationDescriptor;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{AdaptiveFactory, EngineAdapter, EngineEvent, LoadMode, MediaElement};
use crate::nowplaying::{spawn_poller, MetadataSource};
use crate::reconnect::{FsmAction, FsmInput, PlayState, ReconnectMachine, ReconnectPolicy};
use crate::resolve;
use crate::watchdog::Watchdog;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const UPDATE_CHANNEL_CAPACITY: usize = 64;
const ADVISORY_TEXT: &str = "signal lost, retrying";

// ── public surface ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum PlayerCommand {
    SelectStation(StationDescriptor),
    TogglePlayback,
    Stop,
    SetVolume(f32),
    StartSleepTimer { minutes: u64 },
    CancelSleepTimer,
}

/// All inputs into the `PlayerCore` loop.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    Command(PlayerCommand),
    /// Normalized engine event, tagged with the attempt it belongs to.
    Engine { token: u64, event: EngineEvent },
    /// The backoff timer for this attempt elapsed.
    RetryFired { token: u64 },
    /// Watchdog sampling tick.
    WatchdogTick { token: u64 },
    /// A now-playing poll completed.
    NowPlaying { token: u64, title: Option<String> },
    /// Connectivity came back.
    NetworkOnline,
    /// The tab came back to the foreground.
    Foregrounded,
    SleepTick,
    SleepExpired,
    Shutdown,
}

/// Pushed to subscribers whenever the observable state moves.
#[derive(Debug, Clone)]
pub enum PlayerUpdate {
    StateUpdated,
    NowPlaying(Option<String>),
}

/// Cheaply cloneable handle to a running `PlayerCore`.
#[derive(Clone)]
pub struct PlayerHandle {
    events: mpsc::Sender<PlayerEvent>,
    state: Arc<StateManager>,
    updates: broadcast::Sender<PlayerUpdate>,
}

impl PlayerHandle {
    pub async fn select_station(&self, station: StationDescriptor) {
        self.send(PlayerCommand::SelectStation(station)).await;
    }

    pub async fn toggle_playback(&self) {
        self.send(PlayerCommand::TogglePlayback).await;
    }

    pub async fn stop(&self) {
        self.send(PlayerCommand::Stop).await;
    }

    pub async fn set_volume(&self, volume: f32) {
        self.send(PlayerCommand::SetVolume(volume)).await;
    }

    pub async fn start_sleep_timer(&self, minutes: u64) {
        self.send(PlayerCommand::StartSleepTimer { minutes }).await;
    }

    pub async fn cancel_sleep_timer(&self) {
        self.send(PlayerCommand::CancelSleepTimer).await;
    }

    pub async fn notify_network_online(&self) {
        let _ = self.events.send(PlayerEvent::NetworkOnline).await;
    }

    pub async fn notify_foregrounded(&self) {
        let _ = self.events.send(PlayerEvent::Foregrounded).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.events.send(PlayerEvent::Shutdown).await;
    }

    pub async fn state(&self) -> PlayerState {
        self.state.get_state().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerUpdate> {
        self.updates.subscribe()
    }

    async fn send(&self, cmd: PlayerCommand) {
        let _ = self.events.send(PlayerEvent::Command(cmd)).await;
    }
}

// ── session bookkeeping ───────────────────────────────────────────────────────

/// One playback lifecycle for one station selection.  The sticky escalation
/// state lives in the reconnect machine; the task handles here are scoped to
/// the *current attempt* and replaced on every reload.
struct LoadSession {
    token: u64,
    station: StationDescriptor,
    raw_url: String,
    machine: ReconnectMachine,
    watchdog: Watchdog,
    paused: bool,
    needs_gesture: bool,
    engine_forwarder: Option<AbortHandle>,
    retry_task: Option<AbortHandle>,
    watchdog_task: Option<AbortHandle>,
    poller_task: Option<AbortHandle>,
    poll_cancel: CancellationToken,
}

impl LoadSession {
    /// Cancel everything scoped to the current attempt, in order: retry
    /// timer, watchdog, poller (cancel token first so in-flight fetches
    /// abort), engine event forwarder.
    fn cancel_attempt_tasks(&mut self) {
        if let Some(h) = self.retry_task.take() {
            h.abort();
        }
        if let Some(h) = self.watchdog_task.take() {
            h.abort();
        }
        self.poll_cancel.cancel();
        if let Some(h) = self.poller_task.take() {
            h.abort();
        }
        self.poll_cancel = CancellationToken::new();
        if let Some(h) = self.engine_forwarder.take() {
            h.abort();
        }
    }
}

struct SleepTimer {
    deadline: Instant,
    expiry_task: AbortHandle,
    ticker_task: AbortHandle,
}

impl SleepTimer {
    fn cancel(self) {
        self.expiry_task.abort();
        self.ticker_task.abort();
    }
}

// ── core ──────────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    config: PlayerConfig,
    resolver: ResolverConfig,
    state: Arc<StateManager>,
    adapter: EngineAdapter,
    metadata: Arc<dyn MetadataSource>,
    updates: broadcast::Sender<PlayerUpdate>,
    events_tx: mpsc::Sender<PlayerEvent>,
    events_rx: mpsc::Receiver<PlayerEvent>,
    /// Monotonic load-token source.  Owned exclusively by this loop.
    next_token: u64,
    session: Option<LoadSession>,
    sleep: Option<SleepTimer>,
}

impl PlayerCore {
    pub fn new(
        config: PlayerConfig,
        resolver: ResolverConfig,
        element: Arc<dyn MediaElement>,
        adaptive: Arc<dyn AdaptiveFactory>,
        metadata: Arc<dyn MetadataSource>,
    ) -> (Self, PlayerHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let state = Arc::new(StateManager::default());

        let handle = PlayerHandle {
            events: events_tx.clone(),
            state: Arc::clone(&state),
            updates: updates.clone(),
        };

        let core = Self {
            config,
            resolver,
            state,
            adapter: EngineAdapter::new(element, adaptive),
            metadata,
            updates,
            events_tx,
            events_rx,
            next_token: 0,
            session: None,
            sleep: None,
        };
        (core, handle)
    }

    /// Run the event loop until `Shutdown` or all handles are dropped.
    pub async fn run(mut self) {
        info!("player: event loop starting");
        while let Some(event) = self.events_rx.recv().await {
            match event {
                PlayerEvent::Shutdown => {
                    info!("player: shutdown requested");
                    break;
                }
                PlayerEvent::Command(cmd) => self.handle_command(cmd).await,
                PlayerEvent::Engine { token, event } => self.handle_engine(token, event).await,
                PlayerEvent::RetryFired { token } => self.handle_retry_fired(token).await,
                PlayerEvent::WatchdogTick { token } => self.handle_watchdog_tick(token).await,
                PlayerEvent::NowPlaying { token, title } => {
                    self.handle_now_playing(token, title).await
                }
                PlayerEvent::NetworkOnline => self.handle_network_online().await,
                PlayerEvent::Foregrounded => self.handle_foregrounded().await,
                PlayerEvent::SleepTick => self.handle_sleep_tick().await,
                PlayerEvent::SleepExpired => self.handle_sleep_expired().await,
            }
        }
        self.teardown_session();
        if let Some(sleep) = self.sleep.take() {
            sleep.cancel();
        }
        info!("player: event loop stopped");
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::SelectStation(station) => self.select_station(station).await,
            PlayerCommand::TogglePlayback => self.toggle_playback().await,
            PlayerCommand::Stop => self.stop().await,
            PlayerCommand::SetVolume(v) => {
                self.adapter.set_volume(v);
                self.state.set_volume(v).await;
                self.notify_state();
            }
            PlayerCommand::StartSleepTimer { minutes } => self.start_sleep_timer(minutes).await,
            PlayerCommand::CancelSleepTimer => self.cancel_sleep_timer().await,
        }
    }

    async fn select_station(&mut self, station: StationDescriptor) {
        info!("player: select station '{}'", station.name);

        // The old session must be fully silenced before the new one may
        // touch the shared element.
        self.teardown_session();

        let token = self.mint_token();
        let raw_url = station.playable_url().unwrap_or_default().to_string();

        let mut machine =
            ReconnectMachine::new(ReconnectPolicy::from_config(&self.config));
        machine.start_session();

        self.state.set_station(Some(station.clone())).await;
        self.notify_state();

        self.session = Some(LoadSession {
            token,
            station,
            raw_url,
            machine,
            watchdog: Watchdog::from_config(&self.config, Instant::now()),
            paused: false,
            needs_gesture: false,
            engine_forwarder: None,
            retry_task: None,
            watchdog_task: None,
            poller_task: None,
            poll_cancel: CancellationToken::new(),
        });

        self.start_load(false).await;
    }

    async fn toggle_playback(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.paused || session.needs_gesture {
            self.attempt_play().await;
        } else {
            self.adapter.pause();
            if let Some(session) = self.session.as_mut() {
                session.paused = true;
            }
            self.state.set_status(PlaybackStatus::Paused).await;
            self.notify_state();
        }
    }

    async fn stop(&mut self) {
        info!("player: stop");
        self.teardown_session();
        self.adapter.stop();
        self.state.clear_session().await;
        self.notify_state();
    }

    // ── load lifecycle ────────────────────────────────────────────────────────

    /// Dispatch a load attempt for the current session.  `force_proxy` folds
    /// in the machine's sticky escalation; a missing URL skips the engine
    /// entirely and feeds the retry path directly.
    async fn start_load(&mut self, force_proxy: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let token = session.token;

        if session.raw_url.is_empty() {
            warn!("player: station '{}' has no usable URL", session.station.name);
            self.session_trouble().await;
            return;
        }

        let src = resolve::resolve(&session.raw_url, force_proxy, &self.resolver);
        debug!("player: load token={} src={}", token, src);
        session.machine.handle(FsmInput::LoadDispatched);

        // Normalized engine events, tagged with this attempt's token.
        let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(64);
        let core_tx = self.events_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = engine_rx.recv().await {
                if core_tx
                    .send(PlayerEvent::Engine { token, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        session.engine_forwarder = Some(forwarder.abort_handle());

        let mode = self.adapter.load(&src, engine_tx);

        self.start_watchdog(token);
        self.start_poller(token, src);

        self.state.set_status(PlaybackStatus::Loading).await;
        self.notify_state();

        if mode == LoadMode::Direct {
            self.attempt_play().await;
        }
    }

    /// `play()` rejection is "needs a tap", never an error or a retry.
    async fn attempt_play(&mut self) {
        let ok = self.adapter.play().await;
        if let Some(session) = self.session.as_mut() {
            session.needs_gesture = !ok;
            if ok {
                session.paused = false;
            }
        }
        self.state.set_needs_user_gesture(!ok).await;
        self.notify_state();
        if !ok {
            info!("player: autoplay rejected, waiting for user gesture");
        }
    }

    fn start_watchdog(&mut self, token: u64) {
        let period = std::time::Duration::from_secs(self.config.watchdog_interval_secs);
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                if tx.send(PlayerEvent::WatchdogTick { token }).await.is_err() {
                    break;
                }
            }
        });
        if let Some(session) = self.session.as_mut() {
            session.watchdog_task = Some(task.abort_handle());
        }
    }

    fn start_poller(&mut self, token: u64, src: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let interval = std::time::Duration::from_secs(self.config.nowplaying_interval_secs);
        let task = spawn_poller(
            Arc::clone(&self.metadata),
            src,
            token,
            interval,
            session.poll_cancel.clone(),
            self.events_tx.clone(),
        );
        session.poller_task = Some(task.abort_handle());
    }

    // ── event handlers ────────────────────────────────────────────────────────

    async fn handle_engine(&mut self, token: u64, event: EngineEvent) {
        if !self.token_current(token) {
            debug!("player: stale engine event for token={}, ignoring", token);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let input = match &event {
            EngineEvent::CanPlay => Some(FsmInput::CanPlay),
            EngineEvent::Playing => Some(FsmInput::Playing),
            EngineEvent::Paused => None,
            EngineEvent::Stalled | EngineEvent::Waiting => Some(FsmInput::Trouble),
            EngineEvent::Error(e) => {
                warn!("player: engine error: {}", e);
                Some(FsmInput::Trouble)
            }
        };

        match event {
            EngineEvent::Paused => {
                // Pause initiated outside the loop (controls UI, OS media
                // keys).  Mirror it; never a retry trigger.
                session.paused = true;
                self.state.set_status(PlaybackStatus::Paused).await;
                self.notify_state();
                return;
            }
            EngineEvent::Playing => {
                session.paused = false;
                session.needs_gesture = false;
                session.watchdog.reset(Instant::now());
            }
            _ => {}
        }

        // While the user has us paused, stalls are expected noise.
        if session.paused && matches!(input, Some(FsmInput::Trouble)) {
            return;
        }

        if let Some(input) = input {
            let actions = self
                .session
                .as_mut()
                .map(|s| s.machine.handle(input))
                .unwrap_or_default();
            self.apply_actions(actions).await;

            if input == FsmInput::Playing {
                self.state.set_status(PlaybackStatus::Playing).await;
                self.state.set_needs_user_gesture(false).await;
                self.notify_state();
            }
        }
    }

    async fn handle_retry_fired(&mut self, token: u64) {
        if !self.token_current(token) {
            debug!("player: stale retry timer for token={}, ignoring", token);
            return;
        }
        let actions = self
            .session
            .as_mut()
            .map(|s| s.machine.handle(FsmInput::RetryFired))
            .unwrap_or_default();
        self.apply_actions(actions).await;
    }

    async fn handle_watchdog_tick(&mut self, token: u64) {
        if !self.token_current(token) {
            return;
        }
        let position = self.adapter.position();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.machine.state() != PlayState::Playing || session.paused {
            return;
        }
        if session.watchdog.observe(position, Instant::now()) {
            warn!(
                "player: watchdog: position stuck at {:?} on '{}'",
                position, session.station.name
            );
            session.watchdog.reset(Instant::now());
            self.session_trouble().await;
        }
    }

    async fn handle_now_playing(&mut self, token: u64, title: Option<String>) {
        if !self.token_current(token) {
            debug!("player: stale now-playing result for token={}, ignoring", token);
            return;
        }
        // Absent metadata keeps the last known title, matching the poller's
        // sources which frequently return nothing mid-window.
        if let Some(title) = title {
            debug!("player: now playing '{}'", title);
            self.state.set_now_playing(Some(title.clone())).await;
            let _ = self.updates.send(PlayerUpdate::NowPlaying(Some(title)));
        }
    }

    async fn handle_network_online(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!("player: network back online");
        let actions = session.machine.handle(FsmInput::NetworkOnline);
        self.apply_actions(actions).await;
    }

    async fn handle_foregrounded(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        // Foregrounding resumes a playing-intent element with a bare play();
        // a full reconnect would drop the buffer for nothing.
        if !session.paused && !session.needs_gesture {
            debug!("player: foregrounded, re-invoking play");
            self.attempt_play().await;
        }
    }

    // ── reconnect glue ────────────────────────────────────────────────────────

    /// Feed a trouble signal into the machine and apply what comes out.
    async fn session_trouble(&mut self) {
        let actions = self
            .session
            .as_mut()
            .map(|s| s.machine.handle(FsmInput::Trouble))
            .unwrap_or_default();
        self.apply_actions(actions).await;
    }

    async fn apply_actions(&mut self, actions: Vec<FsmAction>) {
        for action in actions {
            match action {
                FsmAction::AttemptPlay => self.attempt_play().await,
                FsmAction::ScheduleRetry(delay) => self.schedule_retry(delay).await,
                FsmAction::Reload { force_proxy } => Box::pin(self.reload(force_proxy)).await,
                FsmAction::RaiseAdvisory => {
                    warn!("player: {}", ADVISORY_TEXT);
                    self.state.set_advisory(Some(ADVISORY_TEXT.to_string())).await;
                    self.state.set_status(PlaybackStatus::Error).await;
                    self.notify_state();
                }
            }
        }
    }

    async fn schedule_retry(&mut self, delay: std::time::Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let token = session.token;
        debug!("player: retry in {:?} (token={})", delay, token);

        if let Some(old) = session.retry_task.take() {
            old.abort();
        }
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::RetryFired { token }).await;
        });
        session.retry_task = Some(task.abort_handle());

        self.state.set_reconnecting(true).await;
        self.notify_state();
    }

    /// Tear down the current attempt and dispatch a fresh one under a new
    /// token.  Sticky escalation state survives in the machine.
    async fn reload(&mut self, force_proxy: bool) {
        if self.session.is_none() {
            return;
        }
        let token = self.mint_token();
        if let Some(session) = self.session.as_mut() {
            session.cancel_attempt_tasks();
            session.token = token;
            info!(
                "player: reconnect attempt {} for '{}' (proxy={})",
                session.machine.retry_count(),
                session.station.name,
                force_proxy
            );
        }
        self.start_load(force_proxy).await;
    }

    // ── sleep timer ───────────────────────────────────────────────────────────

    async fn start_sleep_timer(&mut self, minutes: u64) {
        if let Some(old) = self.sleep.take() {
            old.cancel();
        }
        if minutes == 0 {
            self.state.set_sleep_remaining(None).await;
            self.notify_state();
            return;
        }

        let secs = minutes * 60;
        let deadline = Instant::now() + std::time::Duration::from_secs(secs);
        info!("player: sleep timer armed for {} min", minutes);

        let tx = self.events_tx.clone();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(PlayerEvent::SleepExpired).await;
        });

        let tx = self.events_tx.clone();
        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(PlayerEvent::SleepTick).await.is_err() {
                    break;
                }
            }
        });

        self.sleep = Some(SleepTimer {
            deadline,
            expiry_task: expiry.abort_handle(),
            ticker_task: ticker.abort_handle(),
        });
        self.state.set_sleep_remaining(Some(secs)).await;
        self.notify_state();
    }

    async fn cancel_sleep_timer(&mut self) {
        if let Some(sleep) = self.sleep.take() {
            sleep.cancel();
        }
        self.state.set_sleep_remaining(None).await;
        self.notify_state();
    }

    async fn handle_sleep_tick(&mut self) {
        let Some(sleep) = self.sleep.as_ref() else {
            return;
        };
        let remaining = sleep
            .deadline
            .saturating_duration_since(Instant::now())
            .as_secs();
        self.state.set_sleep_remaining(Some(remaining)).await;
        self.notify_state();
    }

    /// Expiry pauses playback and nothing else: the session, its engine and
    /// its pollers stay intact so a toggle resumes instantly.
    async fn handle_sleep_expired(&mut self) {
        info!("player: sleep timer expired, pausing");
        if let Some(sleep) = self.sleep.take() {
            sleep.cancel();
        }
        self.adapter.pause();
        if let Some(session) = self.session.as_mut() {
            session.paused = true;
        }
        self.state.set_status(PlaybackStatus::Paused).await;
        self.state.set_sleep_remaining(None).await;
        self.notify_state();
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn mint_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn token_current(&self, token: u64) -> bool {
        self.session
            .as_ref()
            .map(|s| s.token == token)
            .unwrap_or(false)
    }

    fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(
                "player: tearing down session for '{}' (token={})",
                session.station.name, session.token
            );
            session.cancel_attempt_tasks();
        }
    }

    fn notify_state(&self) {
        let _ = self.updates.send(PlayerUpdate::StateUpdated);
    }
}
