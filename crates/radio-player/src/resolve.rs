use radio_types::config::ResolverConfig;
use url::Url;

/// Decide the playable form of a raw stream URL.
///
/// Routed through the proxy when escalation is forced, when the page is on a
/// secure transport and the source is plain http (the browser would block it
/// as mixed content), or when the host is on the force-proxy list.
/// Otherwise the URL passes through unchanged.
///
/// Pure function.  Malformed URLs never error here: an unparseable URL
/// simply matches no proxy rule and is returned as-is, so it fails on load
/// and lands in the retry path like any other bad source.
pub fn resolve(raw: &str, force_proxy: bool, cfg: &ResolverConfig) -> String {
    if force_proxy || mixed_content(raw, cfg) || forced_host(raw, cfg) {
        proxied(raw, cfg)
    } else {
        raw.to_string()
    }
}

/// The proxied form: `{proxy_endpoint}?url=<urlencoded raw>`.
pub fn proxied(raw: &str, cfg: &ResolverConfig) -> String {
    format!("{}?url={}", cfg.proxy_endpoint, urlencoding::encode(raw))
}

fn mixed_content(raw: &str, cfg: &ResolverConfig) -> bool {
    cfg.page_secure && raw.starts_with("http://")
}

fn forced_host(raw: &str, cfg: &ResolverConfig) -> bool {
    if cfg.force_proxy_hosts.is_empty() {
        return false;
    }
    // Parse failure is "no match", never an error.
    match Url::parse(raw) {
        Ok(url) => url
            .host_str()
            .map(|h| cfg.force_proxy_hosts.iter().any(|f| f.eq_ignore_ascii_case(h)))
            .unwrap_or(false),
        Err(_) => false,
    }
}
