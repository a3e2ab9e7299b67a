//! Reconnect controller.
//!
//! An explicit state machine: `Idle → Loading → Playing ⇄ Stalled →
//! Retrying → Loading`.  The machine is pure — it consumes inputs and
//! returns actions, while the session coordinator owns the actual timers,
//! the engine, and the token guard — so every transition can be exercised
//! in tests by feeding events, never by sleeping.

use std::time::Duration;

use radio_types::config::PlayerConfig;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Loading,
    Playing,
    Stalled,
    Retrying,
}

/// Inputs observed by the controller.  Token filtering happens before an
/// input reaches the machine; everything here is for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmInput {
    /// A load attempt was dispatched to the engine.
    LoadDispatched,
    /// Engine reports the source is playable.
    CanPlay,
    /// Audio is actually flowing.
    Playing,
    /// Stall, buffer underrun, engine error, or watchdog-detected stuck
    /// position — all feed the same recovery path.
    Trouble,
    /// The scheduled retry delay elapsed.
    RetryFired,
    /// Connectivity came back while the session was down.
    NetworkOnline,
}

/// What the coordinator must do in response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmAction {
    /// Invoke `play()` on the engine (autoplay outcome handled separately).
    AttemptPlay,
    /// Arm the retry timer with this delay.
    ScheduleRetry(Duration),
    /// Recompute the source (`force_proxy` already folded in) and reload.
    Reload { force_proxy: bool },
    /// Repeated proxy-mode failures: tell the user, keep retrying.
    RaiseAdvisory,
}

/// Backoff and escalation tunables, lifted from `[player]` config.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    ceiling: Duration,
    proxy_after_failures: u32,
    advisory_after_proxy_failures: u32,
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &PlayerConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.backoff_base_ms),
            ceiling: Duration::from_millis(cfg.backoff_ceiling_ms),
            proxy_after_failures: cfg.proxy_after_failures,
            advisory_after_proxy_failures: cfg.advisory_after_proxy_failures,
        }
    }

    /// `min(ceiling, base * 2^retry_count)`: 1s, 2s, 4s, 8s, 15s, 15s, …
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base
            .checked_mul(factor.min(u32::MAX as u64) as u32)
            .unwrap_or(self.ceiling)
            .min(self.ceiling)
    }
}

pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: PlayState,
    /// Incremented on every scheduled retry; persists across the session so
    /// repeatedly flaky stations back off further and further.  Reset only
    /// when a new station is selected.
    retry_count: u32,
    /// Sticky: once a retry escalates to the proxy, every later load and
    /// poll of this session stays on the proxied path.
    used_proxy: bool,
    /// Consecutive failures since the proxy was engaged.
    proxy_failures: u32,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: PlayState::Idle,
            retry_count: 0,
            used_proxy: false,
            proxy_failures: 0,
        }
    }

    /// Fresh session for a newly selected station.
    pub fn start_session(&mut self) {
        self.state = PlayState::Loading;
        self.retry_count = 0;
        self.used_proxy = false;
        self.proxy_failures = 0;
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn used_proxy(&self) -> bool {
        self.used_proxy
    }

    /// True between a trouble signal and the next successful reload —
    /// drives the "reconnecting" indicator, distinct from "stopped".
    pub fn reconnecting(&self) -> bool {
        matches!(self.state, PlayState::Stalled | PlayState::Retrying)
            || (self.state == PlayState::Loading && self.retry_count > 0)
    }

    pub fn handle(&mut self, input: FsmInput) -> Vec<FsmAction> {
        use FsmInput as In;
        use PlayState as St;

        let actions = match (self.state, input) {
            (St::Idle, _) => Vec::new(),

            (_, In::LoadDispatched) => {
                self.state = St::Loading;
                Vec::new()
            }

            (St::Loading, In::CanPlay) => vec![FsmAction::AttemptPlay],
            (St::Loading, In::Playing)
            | (St::Stalled, In::Playing)
            | (St::Retrying, In::Playing) => {
                // Retry count intentionally survives; only proxy-failure
                // streaks end here.
                self.state = St::Playing;
                self.proxy_failures = 0;
                Vec::new()
            }
            (St::Playing, In::Playing) | (St::Playing, In::CanPlay) => Vec::new(),

            (St::Loading, In::Trouble) | (St::Playing, In::Trouble) | (St::Stalled, In::Trouble) => {
                self.schedule_retry()
            }
            // A second stall while a retry is already pending changes nothing.
            (St::Retrying, In::Trouble) => Vec::new(),

            (St::Retrying, In::RetryFired) | (St::Retrying, In::NetworkOnline) => {
                // Connectivity return fires the pending retry early.
                if self.retry_count >= self.policy.proxy_after_failures {
                    self.used_proxy = true;
                }
                self.state = St::Loading;
                vec![FsmAction::Reload {
                    force_proxy: self.used_proxy,
                }]
            }
            (St::Stalled, In::RetryFired) | (St::Stalled, In::NetworkOnline) => {
                self.state = St::Retrying;
                self.handle(In::RetryFired)
            }

            (_, In::RetryFired) | (_, In::NetworkOnline) | (_, In::CanPlay) => Vec::new(),
        };

        debug!(
            "reconnect: {:?} -> {:?} (retries={}, proxy={})",
            input, self.state, self.retry_count, self.used_proxy
        );
        actions
    }

    fn schedule_retry(&mut self) -> Vec<FsmAction> {
        let delay = self.policy.backoff_delay(self.retry_count);
        self.retry_count += 1;
        if self.used_proxy {
            self.proxy_failures += 1;
        }
        self.state = PlayState::Retrying;

        let mut actions = vec![FsmAction::ScheduleRetry(delay)];
        if self.used_proxy && self.proxy_failures >= self.policy.advisory_after_proxy_failures {
            actions.push(FsmAction::RaiseAdvisory);
        }
        actions
    }
}
