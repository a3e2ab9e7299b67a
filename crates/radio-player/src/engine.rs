//! Playback engine adapter.
//!
//! Wraps the platform's audio element and, for segmented streams, an
//! adaptive-streaming engine instance, behind one `load`/`play`/`pause`/
//! `stop` surface.  Engine-specific events are normalized into a single
//! [`EngineEvent`] stream so the reconnect controller only ever deals with
//! one vocabulary.
//!
//! The element and the adaptive engine are external collaborators (the
//! platform media stack); they enter through the [`MediaElement`] and
//! [`AdaptiveFactory`] traits so the controller can be driven by scripted
//! fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

// ── events ────────────────────────────────────────────────────────────────────

/// Raw events of the platform audio element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementEvent {
    CanPlay,
    Playing,
    Paused,
    Stalled,
    Waiting,
    Ended,
    Error(String),
}

/// Events of the adaptive-streaming engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptiveEvent {
    ManifestParsed,
    FatalError(String),
}

/// The normalized event set delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    CanPlay,
    Playing,
    Paused,
    Stalled,
    Waiting,
    Error(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("adaptive engine detach failed: {0}")]
    Detach(String),
    #[error("adaptive engine destroy failed: {0}")]
    Destroy(String),
}

// ── collaborator traits ───────────────────────────────────────────────────────

/// The shared playback element.  Exactly one exists; whichever load session
/// is current owns it.
#[async_trait]
pub trait MediaElement: Send + Sync {
    fn set_source(&self, src: &str);
    /// Full reset: pause, drop the source attribute, reload.
    fn clear_source(&self);
    fn load(&self);
    /// Attempt playback.  `false` means the attempt was rejected by autoplay
    /// policy and needs an explicit user gesture; it is not an error.
    async fn play(&self) -> bool;
    fn pause(&self);
    fn set_volume(&self, volume: f32);
    /// Current playback position in seconds, if a timeline exists yet.
    fn position(&self) -> Option<f64>;
    /// Subscribe to raw element events from this point on.
    fn events(&self) -> broadcast::Receiver<ElementEvent>;
}

/// One adaptive-engine instance, scoped to a single load.
pub trait AdaptiveHandle: Send + Sync {
    fn load_source(&mut self, src: &str);
    fn attach(&mut self);
    fn detach(&mut self) -> Result<(), EngineError>;
    fn destroy(&mut self) -> Result<(), EngineError>;
}

pub trait AdaptiveFactory: Send + Sync {
    /// Whether adaptive playback is available on this platform.
    fn supported(&self) -> bool;
    fn create(&self, events: mpsc::Sender<AdaptiveEvent>) -> Box<dyn AdaptiveHandle>;
}

// ── adapter ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Continuous byte stream assigned straight to the element.
    Direct,
    /// Segmented stream driven by a fresh adaptive-engine instance.
    Adaptive,
}

/// `src` denotes a segmented adaptive stream by suffix convention.
pub fn is_adaptive_source(src: &str) -> bool {
    src.to_ascii_lowercase().contains(".m3u8")
}

pub struct EngineAdapter {
    element: Arc<dyn MediaElement>,
    factory: Arc<dyn AdaptiveFactory>,
    adaptive: Option<Box<dyn AdaptiveHandle>>,
    /// Forwarder tasks for the current load; aborted before every new load
    /// so no listener from a previous load survives.
    forwarders: Vec<tokio::task::AbortHandle>,
}

impl EngineAdapter {
    pub fn new(element: Arc<dyn MediaElement>, factory: Arc<dyn AdaptiveFactory>) -> Self {
        Self {
            element,
            factory,
            adaptive: None,
            forwarders: Vec::new(),
        }
    }

    /// Load `src`, tearing down whatever the previous load left behind.
    /// Normalized events for this load flow into `events` until the next
    /// `load`/`stop`.
    pub fn load(&mut self, src: &str, events: mpsc::Sender<EngineEvent>) -> LoadMode {
        self.drop_listeners();
        self.teardown_adaptive();

        let element_rx = self.element.events();
        self.forwarders
            .push(tokio::spawn(forward_element(element_rx, events.clone())).abort_handle());

        if is_adaptive_source(src) && self.factory.supported() {
            debug!("engine: adaptive load {}", src);
            let (adaptive_tx, adaptive_rx) = mpsc::channel(8);
            self.forwarders
                .push(tokio::spawn(forward_adaptive(adaptive_rx, events)).abort_handle());
            let mut handle = self.factory.create(adaptive_tx);
            handle.load_source(src);
            handle.attach();
            self.adaptive = Some(handle);
            LoadMode::Adaptive
        } else {
            debug!("engine: direct load {}", src);
            // Stop and reset the shared element before the new source goes in.
            self.element.clear_source();
            self.element.set_source(src);
            self.element.load();
            LoadMode::Direct
        }
    }

    /// `false` = autoplay rejection; surface as "needs tap", never retry.
    pub async fn play(&self) -> bool {
        self.element.play().await
    }

    pub fn pause(&self) {
        self.element.pause();
    }

    /// Full stop: silence the element and release the adaptive engine.
    pub fn stop(&mut self) {
        self.drop_listeners();
        self.teardown_adaptive();
        self.element.clear_source();
    }

    pub fn set_volume(&self, volume: f32) {
        self.element.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn position(&self) -> Option<f64> {
        self.element.position()
    }

    fn drop_listeners(&mut self) {
        for handle in self.forwarders.drain(..) {
            handle.abort();
        }
    }

    /// Detach first, then destroy; teardown failures are logged and
    /// swallowed so a broken engine can never wedge a station switch.
    fn teardown_adaptive(&mut self) {
        if let Some(mut handle) = self.adaptive.take() {
            if let Err(e) = handle.detach() {
                warn!("engine: {}", e);
            }
            if let Err(e) = handle.destroy() {
                warn!("engine: {}", e);
            }
        }
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.drop_listeners();
        self.teardown_adaptive();
    }
}

// ── event normalization ───────────────────────────────────────────────────────

async fn forward_element(
    mut rx: broadcast::Receiver<ElementEvent>,
    tx: mpsc::Sender<EngineEvent>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(ev) => ev,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("engine: element event stream lagged by {}", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let normalized = match event {
            ElementEvent::CanPlay => EngineEvent::CanPlay,
            ElementEvent::Playing => EngineEvent::Playing,
            ElementEvent::Paused => EngineEvent::Paused,
            ElementEvent::Stalled => EngineEvent::Stalled,
            ElementEvent::Waiting => EngineEvent::Waiting,
            // A live stream has no natural end; reaching one means the
            // connection dropped.
            ElementEvent::Ended => EngineEvent::Stalled,
            ElementEvent::Error(e) => EngineEvent::Error(e),
        };
        if tx.send(normalized).await.is_err() {
            break;
        }
    }
}

async fn forward_adaptive(mut rx: mpsc::Receiver<AdaptiveEvent>, tx: mpsc::Sender<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        let normalized = match event {
            // Manifest parsed: segments are reachable, playback can start.
            AdaptiveEvent::ManifestParsed => EngineEvent::CanPlay,
            AdaptiveEvent::FatalError(e) => EngineEvent::Error(e),
        };
        if tx.send(normalized).await.is_err() {
            break;
        }
    }
}
