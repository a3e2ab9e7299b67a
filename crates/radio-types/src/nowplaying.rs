use serde::{Deserialize, Serialize};

/// Response of the now-playing metadata endpoint.
///
/// Field names follow the ICY response headers verbatim so the payload can be
/// rendered or logged without translation.  `title` is the parsed
/// `StreamTitle` value, or `None` when the stream exposes no in-band
/// metadata (or none arrived within the read budget).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NowPlaying {
    pub title: Option<String>,
    #[serde(rename = "icy-name")]
    pub icy_name: Option<String>,
    #[serde(rename = "icy-genre")]
    pub icy_genre: Option<String>,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
    #[serde(rename = "icy-metaint")]
    pub icy_metaint: Option<u32>,
}
