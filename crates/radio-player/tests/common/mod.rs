#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use radio_player::engine::{
    AdaptiveEvent, AdaptiveFactory, AdaptiveHandle, ElementEvent, EngineError, MediaElement,
};
use radio_player::nowplaying::MetadataSource;
use radio_player::session::{PlayerCore, PlayerHandle};
use radio_types::config::{PlayerConfig, ResolverConfig};
use radio_types::nowplaying::NowPlaying;
use radio_types::station::StationDescriptor;
use tokio::sync::{broadcast, mpsc};

// ── scripted media element ────────────────────────────────────────────────────

/// Playback position of the fake: healthy by default (every read advances,
/// like a live stream's clock), or pinned to a value for stuck-stream tests.
enum PositionState {
    Auto(f64),
    Fixed(f64),
}

pub struct FakeElement {
    log: Mutex<Vec<String>>,
    events: broadcast::Sender<ElementEvent>,
    pub allow_play: AtomicBool,
    position: Mutex<PositionState>,
    plays_in_flight: AtomicUsize,
    pub max_concurrent_plays: AtomicUsize,
}

impl FakeElement {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            events,
            allow_play: AtomicBool::new(true),
            position: Mutex::new(PositionState::Auto(0.0)),
            plays_in_flight: AtomicUsize::new(0),
            max_concurrent_plays: AtomicUsize::new(0),
        })
    }

    /// Fire a raw element event, as the platform would.
    pub fn emit(&self, event: ElementEvent) {
        let _ = self.events.send(event);
    }

    /// Pin the position; subsequent reads stop advancing.
    pub fn set_position(&self, position: f64) {
        *self.position.lock().unwrap() = PositionState::Fixed(position);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// The most recently assigned source, if any.
    pub fn last_source(&self) -> Option<String> {
        self.calls()
            .iter()
            .rev()
            .find_map(|c| c.strip_prefix("set_source:").map(str::to_string))
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaElement for FakeElement {
    fn set_source(&self, src: &str) {
        self.record(format!("set_source:{src}"));
    }

    fn clear_source(&self) {
        self.record("clear_source".into());
        *self.position.lock().unwrap() = PositionState::Auto(0.0);
    }

    fn load(&self) {
        self.record("load".into());
    }

    async fn play(&self) -> bool {
        let now = self.plays_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_plays.fetch_max(now, Ordering::SeqCst);
        // Yield so overlapping attempts, if the coordinator ever allowed
        // them, would actually overlap here.
        tokio::task::yield_now().await;
        self.plays_in_flight.fetch_sub(1, Ordering::SeqCst);
        let ok = self.allow_play.load(Ordering::SeqCst);
        self.record(format!("play:{}", if ok { "ok" } else { "rejected" }));
        ok
    }

    fn pause(&self) {
        self.record("pause".into());
    }

    fn set_volume(&self, volume: f32) {
        self.record(format!("set_volume:{volume:.2}"));
    }

    fn position(&self) -> Option<f64> {
        let mut position = self.position.lock().unwrap();
        match *position {
            PositionState::Auto(v) => {
                let next = v + 5.0;
                *position = PositionState::Auto(next);
                Some(next)
            }
            PositionState::Fixed(v) => Some(v),
        }
    }

    fn events(&self) -> broadcast::Receiver<ElementEvent> {
        self.events.subscribe()
    }
}

// ── scripted adaptive engine ──────────────────────────────────────────────────

/// Shared observation point between the factory and its handles.
#[derive(Default)]
pub struct AdaptiveProbe {
    log: Mutex<Vec<String>>,
    /// Event channel of the most recently created instance, for firing
    /// manifest-parsed / fatal-error from tests.
    last_events: Mutex<Option<mpsc::Sender<AdaptiveEvent>>>,
    pub live_instances: AtomicUsize,
}

impl AdaptiveProbe {
    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }
}

pub struct FakeAdaptiveFactory {
    pub supported: AtomicBool,
    probe: Arc<AdaptiveProbe>,
}

impl FakeAdaptiveFactory {
    pub fn new(supported: bool) -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(supported),
            probe: Arc::new(AdaptiveProbe::default()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.probe.log.lock().unwrap().clone()
    }

    pub fn live_instances(&self) -> usize {
        self.probe.live_instances.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: AdaptiveEvent) {
        let tx = self.probe.last_events.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

pub struct FakeAdaptiveHandle {
    probe: Arc<AdaptiveProbe>,
    destroyed: bool,
}

impl AdaptiveHandle for FakeAdaptiveHandle {
    fn load_source(&mut self, src: &str) {
        self.probe.record(format!("load_source:{src}"));
    }

    fn attach(&mut self) {
        self.probe.record("attach".into());
    }

    fn detach(&mut self) -> Result<(), EngineError> {
        self.probe.record("detach".into());
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.probe.record("destroy".into());
        if !self.destroyed {
            self.destroyed = true;
            self.probe.live_instances.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl AdaptiveFactory for FakeAdaptiveFactory {
    fn supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn create(&self, events: mpsc::Sender<AdaptiveEvent>) -> Box<dyn AdaptiveHandle> {
        self.probe.record("create".into());
        self.probe.live_instances.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_events.lock().unwrap() = Some(events);
        Box::new(FakeAdaptiveHandle {
            probe: Arc::clone(&self.probe),
            destroyed: false,
        })
    }
}

// ── scripted metadata source ──────────────────────────────────────────────────

pub struct FakeMetadata {
    pub polled: Mutex<Vec<String>>,
    pub title: Mutex<Option<String>>,
}

impl FakeMetadata {
    pub fn new(title: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            polled: Mutex::new(Vec::new()),
            title: Mutex::new(title.map(str::to_string)),
        })
    }

    pub fn polled_urls(&self) -> Vec<String> {
        self.polled.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn now_playing(&self, src: &str) -> Option<NowPlaying> {
        self.polled.lock().unwrap().push(src.to_string());
        Some(NowPlaying {
            title: self.title.lock().unwrap().clone(),
            ..NowPlaying::default()
        })
    }
}

// ── harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub handle: PlayerHandle,
    pub element: Arc<FakeElement>,
    pub adaptive: Arc<FakeAdaptiveFactory>,
    pub metadata: Arc<FakeMetadata>,
}

pub fn start_player() -> Harness {
    start_player_with(PlayerConfig::default(), ResolverConfig::default())
}

pub fn start_player_with(player: PlayerConfig, resolver: ResolverConfig) -> Harness {
    let element = FakeElement::new();
    let adaptive = FakeAdaptiveFactory::new(true);
    let metadata = FakeMetadata::new(Some("Artist - Song"));

    let (core, handle) = PlayerCore::new(
        player,
        resolver,
        Arc::clone(&element) as Arc<dyn MediaElement>,
        Arc::clone(&adaptive) as Arc<dyn AdaptiveFactory>,
        Arc::clone(&metadata) as Arc<dyn MetadataSource>,
    );
    tokio::spawn(core.run());

    Harness {
        handle,
        element,
        adaptive,
        metadata,
    }
}

pub fn station(id: &str, url: &str) -> StationDescriptor {
    StationDescriptor {
        stationuuid: id.to_string(),
        name: format!("station {id}"),
        url: url.to_string(),
        ..StationDescriptor::default()
    }
}

/// Let every ready task run without moving the (paused) clock.
pub async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}
