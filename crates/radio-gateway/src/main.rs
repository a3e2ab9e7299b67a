mod directory;
mod nowplaying;
mod relay;

use radio_types::config::{Config, GatewayConfig};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared handler state: the gateway section of the config plus one
/// persistent HTTP client (shared TLS sessions, ICY request header set once).
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub client: Client,
}

impl GatewayState {
    fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            // Follow redirects (common for HLS playlists and Icecast streams)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Ask upstreams for in-band metadata — many Icecast servers only
            // interleave it when this header is present.
            .default_headers({
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    "Icy-MetaData",
                    reqwest::header::HeaderValue::from_static("1"),
                );
                if let Ok(ua) = reqwest::header::HeaderValue::from_str(&config.user_agent) {
                    h.insert(reqwest::header::USER_AGENT, ua);
                }
                h
            })
            .build()
            .expect("failed to build reqwest client for gateway");

        Self { config, client }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,radio_gateway=debug")),
        )
        .init();

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let state = GatewayState::new(config.gateway.clone());
    let addr = format!("{}:{}", state.config.bind_address, state.config.port);

    let app = axum::Router::new()
        .route("/stations", axum::routing::get(directory::search_stations))
        .route("/proxy", axum::routing::get(relay::relay_stream))
        .route("/nowplaying", axum::routing::get(nowplaying::now_playing))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("Gateway listening on http://{}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind gateway on {}: {}", addr, e);
            return Err(e.into());
        }
    };
    axum::serve(listener, app).await?;
    Ok(())
}
