use serde::{Deserialize, Serialize};

/// A station as returned by the directory endpoint.
///
/// Directory upstreams are duck-typed and frequently ship stations with
/// missing or broken fields, so everything except the id defaults to empty.
/// A station with no usable URL is still a valid descriptor — it fails fast
/// into the player's retry path instead of being rejected here.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StationDescriptor {
    pub stationuuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub favicon: String,
    /// Comma-separated tag string, as the directory delivers it.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub url: String,
    /// Post-redirect URL, preferred over `url` when present.
    #[serde(default)]
    pub url_resolved: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub bitrate: u32,
}

impl StationDescriptor {
    /// The URL playback should start from: `url_resolved` wins, empty fields
    /// are skipped, and a station with neither yields `None`.
    pub fn playable_url(&self) -> Option<&str> {
        if !self.url_resolved.is_empty() {
            Some(&self.url_resolved)
        } else if !self.url.is_empty() {
            Some(&self.url)
        } else {
            None
        }
    }

    /// Whether the station passes the "stable" heuristic: HTTPS transport,
    /// mp3/aac codec, and a bitrate of at most 128 kbps (unknown bitrate is
    /// allowed through).
    pub fn is_stable(&self) -> bool {
        let url = self
            .playable_url()
            .map(|u| u.to_ascii_lowercase())
            .unwrap_or_default();
        let codec = self.codec.to_ascii_lowercase();
        let is_https = url.starts_with("https://");
        let is_mp3_or_aac = codec.contains("mp3") || codec.contains("aac");
        let ok_bitrate = self.bitrate == 0 || self.bitrate <= 128;
        is_https && is_mp3_or_aac && ok_bitrate
    }
}

/// Keep only stable stations, lighter bitrates first.
pub fn stable_filter(mut stations: Vec<StationDescriptor>) -> Vec<StationDescriptor> {
    stations.retain(StationDescriptor::is_stable);
    stations.sort_by_key(|s| if s.bitrate == 0 { 999 } else { s.bitrate });
    stations
}
