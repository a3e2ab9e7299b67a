//! Now-playing poller.
//!
//! Queries the metadata extractor for the source the element is currently
//! playing: immediately on session start, then on a fixed interval.  The
//! polled URL is the *playable* source, so once a session has escalated to
//! the proxy the metadata reads travel the same path as the audio bytes —
//! some streams only expose in-band metadata on one transport.
//!
//! Two layers of cancellation: the session's `CancellationToken` stops the
//! task and aborts any in-flight fetch, and every result carries the load
//! token so the coordinator drops anything from a superseded attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use radio_types::nowplaying::NowPlaying;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::PlayerEvent;

/// The metadata extractor, as seen from the player.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch now-playing info for a playable source URL.  `None` covers
    /// every failure; the poller treats absent metadata and a failed fetch
    /// the same way.
    async fn now_playing(&self, src: &str) -> Option<NowPlaying>;
}

/// Talks to the gateway's now-playing endpoint.
pub struct HttpMetadataSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetadataSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn now_playing(&self, src: &str) -> Option<NowPlaying> {
        let url = format!("{}?url={}", self.endpoint, urlencoding::encode(src));
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<NowPlaying>().await {
                Ok(np) => Some(np),
                Err(e) => {
                    debug!("nowplaying: bad payload: {}", e);
                    None
                }
            },
            Err(e) => {
                debug!("nowplaying: fetch failed: {}", e);
                None
            }
        }
    }
}

/// Spawn the poll loop for one load attempt.
pub fn spawn_poller(
    source: Arc<dyn MetadataSource>,
    src: String,
    token: u64,
    interval: Duration,
    cancel: CancellationToken,
    events: mpsc::Sender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                // First tick completes immediately; the rest are spaced by
                // `interval`.
                _ = ticker.tick() => {}
            }
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                np = source.now_playing(&src) => np,
            };
            let title = fetched.and_then(|np| np.title);
            if events
                .send(PlayerEvent::NowPlaying { token, title })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!("nowplaying: poller for token={} stopped", token);
    })
}
