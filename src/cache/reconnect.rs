// Reconnection budget for the remote cache link
//
// Tracks the link the way a circuit breaker tracks a dependency: a connected
// link stays connected until an operation fails, then each failed reconnect
// doubles the wait up to a ceiling. Once the attempt budget is used up the link
// is parked until something explicitly asks for another round.

use std::time::Duration;

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_attempts: config.reconnect_max_attempts,
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
        }
    }

    // base * 2^retries, capped
    pub fn delay(&self, retries: u32) -> Duration {
        let factor = 2u32.checked_pow(retries).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Reconnecting { retries: u32 },
    Exhausted,
}

#[derive(Debug)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    state: LinkState,
}

impl ReconnectTracker {
    // Starts disconnected: the first connect counts against the budget
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: LinkState::Reconnecting { retries: 0 },
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, LinkState::Exhausted)
    }

    pub fn success(&mut self) {
        self.state = LinkState::Connected;
    }

    // An operation on a connected link failed
    pub fn lost(&mut self) {
        if self.is_connected() {
            self.state = LinkState::Reconnecting { retries: 0 };
        }
    }

    /// Records a failed connection attempt and returns how long to wait before
    /// the next one, or `None` once the budget is spent.
    pub fn fail(&mut self) -> Option<Duration> {
        match &mut self.state {
            LinkState::Connected => {
                self.state = LinkState::Reconnecting { retries: 1 };
                Some(self.policy.delay(0))
            }
            LinkState::Reconnecting { retries } => {
                *retries += 1;
                if *retries >= self.policy.max_attempts {
                    self.state = LinkState::Exhausted;
                    None
                } else {
                    Some(self.policy.delay(*retries - 1))
                }
            }
            LinkState::Exhausted => None,
        }
    }

    // Grants a fresh budget after the link was parked
    pub fn rearm(&mut self) {
        if self.is_exhausted() {
            self.state = LinkState::Reconnecting { retries: 0 };
        }
    }
}
