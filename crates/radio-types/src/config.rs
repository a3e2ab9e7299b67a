use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Retry / watchdog / polling tunables for the playback controller.
///
/// The proxy-escalation and advisory thresholds are parameters on purpose:
/// how aggressively to fall back to the relay is a deployment decision, not
/// a constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    /// Retry count at which every subsequent load goes through the proxy.
    #[serde(default = "default_proxy_after_failures")]
    pub proxy_after_failures: u32,
    /// Consecutive proxy-mode failures before the advisory notice appears.
    #[serde(default = "default_advisory_after_proxy_failures")]
    pub advisory_after_proxy_failures: u32,
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    /// Position must move at least this far between samples to count as
    /// progress.
    #[serde(default = "default_watchdog_min_advance_secs")]
    pub watchdog_min_advance_secs: f64,
    #[serde(default = "default_watchdog_stuck_secs")]
    pub watchdog_stuck_secs: u64,
    #[serde(default = "default_nowplaying_interval_secs")]
    pub nowplaying_interval_secs: u64,
}

/// Inputs of the pure source resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// True when the page is served over a secure transport, in which case
    /// plain-http sources would be blocked as mixed content.
    #[serde(default = "default_page_secure")]
    pub page_secure: bool,
    /// Prefix for the proxied form: `{proxy_endpoint}?url=<urlencoded>`.
    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: String,
    /// Hosts that are always routed through the proxy, reachable or not.
    #[serde(default)]
    pub force_proxy_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory upstreams, tried in order until one answers.
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,
    #[serde(default = "default_nowplaying_timeout_ms")]
    pub nowplaying_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            proxy_after_failures: default_proxy_after_failures(),
            advisory_after_proxy_failures: default_advisory_after_proxy_failures(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            watchdog_min_advance_secs: default_watchdog_min_advance_secs(),
            watchdog_stuck_secs: default_watchdog_stuck_secs(),
            nowplaying_interval_secs: default_nowplaying_interval_secs(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            page_secure: default_page_secure(),
            proxy_endpoint: default_proxy_endpoint(),
            force_proxy_hosts: Vec::new(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            mirrors: default_mirrors(),
            directory_timeout_ms: default_directory_timeout_ms(),
            nowplaying_timeout_ms: default_nowplaying_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_ceiling_ms() -> u64 {
    15_000
}

fn default_proxy_after_failures() -> u32 {
    1
}

fn default_advisory_after_proxy_failures() -> u32 {
    3
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_watchdog_min_advance_secs() -> f64 {
    0.2
}

fn default_watchdog_stuck_secs() -> u64 {
    20
}

fn default_nowplaying_interval_secs() -> u64 {
    15
}

fn default_page_secure() -> bool {
    true
}

fn default_proxy_endpoint() -> String {
    "/api/proxy".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8989
}

fn default_mirrors() -> Vec<String> {
    [
        "https://de1.api.radio-browser.info",
        "https://de2.api.radio-browser.info",
        "https://nl1.api.radio-browser.info",
        "https://at1.api.radio-browser.info",
        "https://gb1.api.radio-browser.info",
        "https://us1.api.radio-browser.info",
        "https://ca1.api.radio-browser.info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_directory_timeout_ms() -> u64 {
    12_000
}

fn default_nowplaying_timeout_ms() -> u64 {
    8_000
}

fn default_user_agent() -> String {
    "radio-gateway/0.1 (+https://github.com/radio-gateway)".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radio")
            .join("config.toml")
    }
}
