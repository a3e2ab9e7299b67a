//! Resilient stream-playback controller for the web radio player.
//!
//! The session coordinator ([`session::PlayerCore`]) owns one playback
//! element and at most one adaptive-engine instance, keeps streams alive
//! across stalls and network blips via the reconnect controller, and
//! invalidates every stale async callback with a monotonic load token.

pub mod engine;
pub mod nowplaying;
pub mod reconnect;
pub mod resolve;
pub mod session;
pub mod watchdog;
