//! Station directory search.
//!
//! Fans a search out to mirrored directory upstreams in order, first success
//! wins, and degrades to an empty list when every mirror fails — the UI must
//! never hang or see an upstream error.  Results are normalized into
//! [`StationDescriptor`]s with every absent field defaulted.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::Json;
use radio_types::station::{stable_filter, StationDescriptor};
use serde::Deserialize;
use tracing::{info, warn};

use crate::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct StationsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub stable: Option<String>,
}

impl StationsQuery {
    fn stable_only(&self) -> bool {
        matches!(self.stable.as_deref(), Some("1") | Some("true"))
    }
}

/// Station as the directory upstream ships it: every field unreliable.
#[derive(Debug, Deserialize, Default)]
pub struct RawStation {
    pub stationuuid: Option<String>,
    pub name: Option<String>,
    pub favicon: Option<String>,
    pub tags: Option<String>,
    pub country: Option<String>,
    pub url: Option<String>,
    pub url_resolved: Option<String>,
    pub homepage: Option<String>,
    pub codec: Option<String>,
    pub bitrate: Option<u32>,
}

pub fn normalize(raw: RawStation) -> StationDescriptor {
    let url = raw.url.unwrap_or_default();
    StationDescriptor {
        stationuuid: raw.stationuuid.unwrap_or_default(),
        name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
        favicon: raw.favicon.unwrap_or_default(),
        tags: raw.tags.unwrap_or_default(),
        country: raw.country.unwrap_or_default(),
        url_resolved: raw.url_resolved.filter(|u| !u.is_empty()).unwrap_or_else(|| url.clone()),
        url,
        homepage: raw.homepage.unwrap_or_default(),
        codec: raw.codec.unwrap_or_default(),
        bitrate: raw.bitrate.unwrap_or(0),
    }
}

fn build_query(params: &StationsQuery) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if !params.q.trim().is_empty() {
        pairs.push(("name", params.q.trim().to_string()));
    }
    if !params.country.trim().is_empty() {
        pairs.push(("country", params.country.trim().to_string()));
    }
    if !params.tag.trim().is_empty() {
        pairs.push(("tag", params.tag.trim().to_string()));
    }
    pairs.push(("hidebroken", "true".to_string()));
    pairs.push(("order", "votes".to_string()));
    pairs.push(("reverse", "true".to_string()));
    pairs.push(("limit", "200".to_string()));
    pairs
}

/// Try mirrors in order; the first that answers wins.  Total failure is an
/// empty list, not an error.
async fn first_success<F, Fut>(mirrors: &[String], mut fetch: F) -> Vec<RawStation>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<RawStation>>>,
{
    for mirror in mirrors {
        match fetch(mirror.clone()).await {
            Ok(stations) => {
                info!("directory: {} answered with {} stations", mirror, stations.len());
                return stations;
            }
            Err(e) => warn!("directory: mirror {} failed: {:#}", mirror, e),
        }
    }
    warn!("directory: all mirrors failed, degrading to empty list");
    Vec::new()
}

async fn query_mirror(
    client: &reqwest::Client,
    base: String,
    params: &[(&'static str, String)],
    timeout: Duration,
) -> anyhow::Result<Vec<RawStation>> {
    let url = format!("{base}/json/stations/search");
    tokio::time::timeout(timeout, async {
        let resp = client.get(&url).query(params).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("upstream returned {}", resp.status());
        }
        Ok(resp.json::<Vec<RawStation>>().await?)
    })
    .await
    .context("timed out")?
}

pub async fn search_stations(
    State(state): State<GatewayState>,
    Query(params): Query<StationsQuery>,
) -> Json<Vec<StationDescriptor>> {
    let query = build_query(&params);
    let timeout = Duration::from_millis(state.config.directory_timeout_ms);

    let raw = first_success(&state.config.mirrors, |mirror| {
        query_mirror(&state.client, mirror, &query, timeout)
    })
    .await;

    let mut stations: Vec<StationDescriptor> = raw.into_iter().map(normalize).collect();
    if params.stable_only() {
        stations = stable_filter(stations);
    }
    Json(stations)
}
