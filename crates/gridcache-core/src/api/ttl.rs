use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TtlConfig;

/// Freshness class of a response. Each class maps to its own expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlPolicy {
    /// Rosters and other slowly changing reference data.
    Roster,
    /// Season and player statistics.
    Statistics,
    /// Odds and scores, which change during a game.
    Live,
    Default,
    /// An explicit expiry chosen by the caller.
    Fixed(Duration),
}

impl TtlPolicy {
    /// Picks a class from the request URL.
    pub fn classify(url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        if url.contains("roster") {
            TtlPolicy::Roster
        } else if url.contains("statistics") {
            TtlPolicy::Statistics
        } else if url.contains("odds") || url.contains("scores") || url.contains("scoreboard") {
            TtlPolicy::Live
        } else {
            TtlPolicy::Default
        }
    }

    pub fn resolve(&self, config: &TtlConfig) -> Duration {
        match self {
            TtlPolicy::Roster => Duration::from_secs(config.roster_secs),
            TtlPolicy::Statistics => Duration::from_secs(config.statistics_secs),
            TtlPolicy::Live => Duration::from_secs(config.live_secs),
            TtlPolicy::Default => Duration::from_secs(config.default_secs),
            TtlPolicy::Fixed(ttl) => *ttl,
        }
    }
}
