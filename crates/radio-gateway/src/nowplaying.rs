//! Now-playing metadata extraction.
//!
//! Shoutcast/Icecast streams interleave metadata into the audio bytes: when
//! the response carries `icy-metaint: N`, every N audio bytes are followed
//! by one length byte (value × 16 = block length) and that many bytes of
//! `key='value';` text, `StreamTitle` among them.  A zero length byte means
//! "nothing this cycle" and the next audio window follows immediately.
//!
//! The scanner reads at most one window plus slack, so a station that never
//! sends a title costs a bounded number of bytes, not an open stream.

use std::sync::OnceLock;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use radio_types::nowplaying::NowPlaying;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::GatewayState;

/// Slack past the first metadata block before giving up.
const SCAN_SLACK_BYTES: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct NowPlayingQuery {
    pub url: Option<String>,
}

// ── in-band scanner ───────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum ScanState {
    /// Skipping this many audio bytes before the next length byte.
    Audio(usize),
    /// The next byte is the metadata length prefix.
    Length,
    /// Collecting this many metadata bytes.
    Meta(usize),
}

pub struct IcyTitleScanner {
    metaint: usize,
    state: ScanState,
    meta: Vec<u8>,
    consumed: usize,
}

impl IcyTitleScanner {
    pub fn new(metaint: usize) -> Self {
        Self {
            metaint,
            state: ScanState::Audio(metaint),
            meta: Vec::new(),
            consumed: 0,
        }
    }

    /// Feed one chunk.  `Some(title)` once a complete metadata block was
    /// decoded (the title may still be absent from it) or the byte budget
    /// ran out; `None` means keep reading.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Option<String>> {
        let mut offset = 0;
        while offset < chunk.len() {
            match self.state {
                ScanState::Audio(remaining) => {
                    let take = remaining.min(chunk.len() - offset);
                    offset += take;
                    self.state = if take == remaining {
                        ScanState::Length
                    } else {
                        ScanState::Audio(remaining - take)
                    };
                }
                ScanState::Length => {
                    let length = chunk[offset] as usize * 16;
                    offset += 1;
                    self.state = if length == 0 {
                        // Empty cycle: skip the next audio window.
                        ScanState::Audio(self.metaint)
                    } else {
                        ScanState::Meta(length)
                    };
                }
                ScanState::Meta(remaining) => {
                    let take = remaining.min(chunk.len() - offset);
                    self.meta.extend_from_slice(&chunk[offset..offset + take]);
                    offset += take;
                    if take == remaining {
                        return Some(extract_title(&self.meta));
                    }
                    self.state = ScanState::Meta(remaining - take);
                }
            }
        }

        self.consumed += chunk.len();
        if self.consumed > self.metaint + SCAN_SLACK_BYTES {
            // One window was enough; stop before buffering the whole stream.
            return Some(None);
        }
        None
    }
}

/// Decode a metadata block (one byte per character) and pull out the quoted
/// `StreamTitle` value.
fn extract_title(meta: &[u8]) -> Option<String> {
    static STREAM_TITLE: OnceLock<Regex> = OnceLock::new();
    let re = STREAM_TITLE.get_or_init(|| Regex::new(r"StreamTitle='([^']*)'").unwrap());
    let text: String = meta.iter().map(|&b| b as char).collect();
    re.captures(&text)
        .map(|caps| caps[1].to_string())
        .filter(|title| !title.trim().is_empty())
}

// ── handler ───────────────────────────────────────────────────────────────────

fn header_str(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn now_playing(
    State(state): State<GatewayState>,
    Query(query): Query<NowPlayingQuery>,
) -> Response {
    let Some(url) = query.url else {
        return (StatusCode::BAD_REQUEST, "missing url").into_response();
    };

    let timeout = std::time::Duration::from_millis(state.config.nowplaying_timeout_ms);
    let resp = match tokio::time::timeout(timeout, state.client.get(&url).send()).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            warn!("nowplaying: fetch failed for {}: {}", url, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
        Err(_) => {
            debug!("nowplaying: connect to {} timed out", url);
            return Json(NowPlaying::default()).into_response();
        }
    };

    let mut np = NowPlaying {
        title: None,
        icy_name: header_str(&resp, "icy-name"),
        icy_genre: header_str(&resp, "icy-genre"),
        content_type: header_str(&resp, "content-type"),
        icy_metaint: header_str(&resp, "icy-metaint").and_then(|v| v.parse().ok()),
    };

    // No advertised interval means no in-band metadata: headers only.
    let Some(metaint) = np.icy_metaint.filter(|m| *m > 0) else {
        return Json(np).into_response();
    };

    let mut scanner = IcyTitleScanner::new(metaint as usize);
    let mut stream = resp.bytes_stream();
    let scan = async {
        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(c) => c,
                Err(e) => {
                    debug!("nowplaying: stream read error for {}: {}", url, e);
                    return None;
                }
            };
            if let Some(title) = scanner.feed(&chunk) {
                return title;
            }
        }
        None
    };

    np.title = match tokio::time::timeout(timeout, scan).await {
        Ok(title) => title,
        Err(_) => {
            debug!("nowplaying: scan of {} timed out", url);
            None
        }
    };
    Json(np).into_response()
}
